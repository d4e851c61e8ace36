use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::repositories::CandleRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

type WriteLocks = StdMutex<HashMap<(String, Timeframe), Arc<Mutex<()>>>>;

/// SQLite-backed candle store.
///
/// Inserts take a per-(symbol, timeframe) async lock so writers for the
/// same key are serialised while disjoint keys proceed concurrently; the
/// `INSERT OR IGNORE` makes re-insertion of an existing key a no-op.
pub struct SqliteCandleRepository {
    pool: SqlitePool,
    write_locks: WriteLocks,
}

impl SqliteCandleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_locks: StdMutex::new(HashMap::new()),
        }
    }

    fn write_lock(&self, symbol: &str, timeframe: Timeframe) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().expect("write lock registry");
        locks
            .entry((symbol.to_string(), timeframe))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Candle> {
        let timeframe_str: String = row.try_get("timeframe")?;
        Ok(Candle {
            symbol: row.try_get("symbol")?,
            timeframe: Timeframe::from_str(&timeframe_str)?,
            time: row.try_get("time")?,
            open: Decimal::from_str(row.try_get("open")?).unwrap_or_default(),
            high: Decimal::from_str(row.try_get("high")?).unwrap_or_default(),
            low: Decimal::from_str(row.try_get("low")?).unwrap_or_default(),
            close: Decimal::from_str(row.try_get("close")?).unwrap_or_default(),
            volume: row.try_get("volume")?,
        })
    }
}

#[async_trait]
impl CandleRepository for SqliteCandleRepository {
    async fn insert_batch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<u64> {
        if candles.is_empty() {
            return Ok(0);
        }
        for candle in candles {
            candle.validate().context("invalid candle in batch")?;
        }

        let lock = self.write_lock(symbol, timeframe);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await.context("failed to open insert tx")?;
        let mut inserted = 0u64;
        for candle in candles {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO candles (symbol, timeframe, time, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(symbol)
            .bind(timeframe.as_str())
            .bind(candle.time)
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume)
            .execute(&mut *tx)
            .await
            .context("Failed to save candle")?;
            inserted += result.rows_affected();
        }
        tx.commit().await.context("failed to commit insert tx")?;
        Ok(inserted)
    }

    async fn latest_time(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(time) as latest_time FROM candles WHERE symbol = ? AND timeframe = ?",
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("latest_time")?)
    }

    async fn range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM candles
            WHERE symbol = ? AND timeframe = ? AND time >= ? AND time <= ?
            ORDER BY time ASC
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn tail(&self, symbol: &str, timeframe: Timeframe, n: usize) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM candles
            WHERE symbol = ? AND timeframe = ?
            ORDER BY time DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candles: Vec<Candle> = rows.iter().map(Self::map_row).collect::<Result<_>>()?;
        candles.reverse();
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::Database;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    async fn repo() -> SqliteCandleRepository {
        let db = Database::new("sqlite::memory:").await.unwrap();
        SqliteCandleRepository::new(db.pool)
    }

    fn daily_candles(symbol: &str, n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 10, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle {
                symbol: symbol.to_string(),
                timeframe: Timeframe::OneDay,
                time: start + Duration::days(i as i64),
                open: dec!(100.0),
                high: dec!(105.0),
                low: dec!(99.0),
                close: dec!(103.5),
                volume: 10_000 + i as i64,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_insert_batch_is_idempotent() {
        let repo = repo().await;
        let candles = daily_candles("ACME.NS", 5);

        let first = repo
            .insert_batch("ACME.NS", Timeframe::OneDay, &candles)
            .await
            .unwrap();
        assert_eq!(first, 5);

        // Re-inserting the identical batch writes nothing and does not error
        let second = repo
            .insert_batch("ACME.NS", Timeframe::OneDay, &candles)
            .await
            .unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_latest_time() {
        let repo = repo().await;
        assert!(
            repo.latest_time("ACME.NS", Timeframe::OneDay)
                .await
                .unwrap()
                .is_none()
        );

        let candles = daily_candles("ACME.NS", 3);
        repo.insert_batch("ACME.NS", Timeframe::OneDay, &candles)
            .await
            .unwrap();

        let latest = repo
            .latest_time("ACME.NS", Timeframe::OneDay)
            .await
            .unwrap();
        assert_eq!(latest, Some(candles[2].time));
    }

    #[tokio::test]
    async fn test_timeframes_are_isolated() {
        let repo = repo().await;
        let daily = daily_candles("ACME.NS", 2);
        let mut weekly = daily_candles("ACME.NS", 2);
        for c in &mut weekly {
            c.timeframe = Timeframe::OneWeek;
        }

        repo.insert_batch("ACME.NS", Timeframe::OneDay, &daily)
            .await
            .unwrap();
        repo.insert_batch("ACME.NS", Timeframe::OneWeek, &weekly)
            .await
            .unwrap();

        assert_eq!(
            repo.tail("ACME.NS", Timeframe::OneDay, 10).await.unwrap().len(),
            2
        );
        assert_eq!(
            repo.tail("ACME.NS", Timeframe::OneWeek, 10)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_tail_returns_ascending_most_recent() {
        let repo = repo().await;
        let candles = daily_candles("ACME.NS", 10);
        repo.insert_batch("ACME.NS", Timeframe::OneDay, &candles)
            .await
            .unwrap();

        let tail = repo.tail("ACME.NS", Timeframe::OneDay, 4).await.unwrap();
        assert_eq!(tail.len(), 4);
        assert_eq!(tail[0].time, candles[6].time);
        assert_eq!(tail[3].time, candles[9].time);
        assert!(tail.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[tokio::test]
    async fn test_range_inclusive_bounds() {
        let repo = repo().await;
        let candles = daily_candles("ACME.NS", 10);
        repo.insert_batch("ACME.NS", Timeframe::OneDay, &candles)
            .await
            .unwrap();

        let result = repo
            .range("ACME.NS", Timeframe::OneDay, candles[2].time, candles[5].time)
            .await
            .unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result[0].time, candles[2].time);
        assert_eq!(result[3].time, candles[5].time);
    }

    #[tokio::test]
    async fn test_invalid_candle_rejected() {
        let repo = repo().await;
        let mut candles = daily_candles("ACME.NS", 1);
        candles[0].low = dec!(110.0); // low above high
        assert!(
            repo.insert_batch("ACME.NS", Timeframe::OneDay, &candles)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_round_trip_preserves_values() {
        let repo = repo().await;
        let candles = daily_candles("ACME.NS", 1);
        repo.insert_batch("ACME.NS", Timeframe::OneDay, &candles)
            .await
            .unwrap();

        let stored = repo.tail("ACME.NS", Timeframe::OneDay, 1).await.unwrap();
        assert_eq!(stored[0], candles[0]);
    }
}
