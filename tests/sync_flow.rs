//! End-to-end sync scenarios over an in-memory store and a mock vendor.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use zsignal::application::sync::scheduler::{SyncMode, SyncScheduler, SyncTask, TaskStatus};
use zsignal::domain::errors::{ErrorKind, VendorError};
use zsignal::domain::market::candle::Candle;
use zsignal::domain::market::fundamentals::Fundamentals;
use zsignal::domain::market::timeframe::{FetchPeriod, Timeframe};
use zsignal::domain::ports::MarketDataProvider;
use zsignal::domain::repositories::CandleRepository;
use zsignal::infrastructure::persistence::{Database, SqliteCandleRepository};

/// Serves a fixed series per symbol; unknown symbols are rate limited
struct MockVendor {
    series: HashMap<String, Vec<Candle>>,
    fetches: AtomicUsize,
}

impl MockVendor {
    fn new() -> Self {
        Self {
            series: HashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    fn with_series(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.series.insert(symbol.to_string(), candles);
        self
    }
}

#[async_trait]
impl MarketDataProvider for MockVendor {
    async fn fetch_candles(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        _period: FetchPeriod,
    ) -> Result<Vec<Candle>, VendorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.series
            .get(symbol)
            .cloned()
            .ok_or(VendorError::RateLimited)
    }

    async fn fetch_fundamentals(&self, _symbol: &str) -> Result<Option<Fundamentals>, VendorError> {
        Ok(None)
    }

    async fn validate(&self, symbol: &str) -> Result<bool, VendorError> {
        Ok(self.series.contains_key(symbol))
    }
}

/// Roughly five years of daily candles ending one hour ago
fn daily_series(symbol: &str, count: usize) -> Vec<Candle> {
    let end = Utc::now() - Duration::hours(1);
    (0..count)
        .map(|i| {
            let time = end - Duration::days((count - 1 - i) as i64);
            let base = 100.0 + (i % 40) as f64;
            Candle {
                symbol: symbol.to_string(),
                timeframe: Timeframe::OneDay,
                time,
                open: Decimal::from_f64(base).unwrap(),
                high: Decimal::from_f64(base + 2.0).unwrap(),
                low: Decimal::from_f64(base - 2.0).unwrap(),
                close: Decimal::from_f64(base + 1.0).unwrap(),
                volume: 500_000,
            }
        })
        .collect()
}

async fn candle_repo() -> Arc<SqliteCandleRepository> {
    let db = Database::new("sqlite::memory:").await.unwrap();
    Arc::new(SqliteCandleRepository::new(db.pool))
}

fn task(symbol: &str) -> SyncTask {
    SyncTask {
        symbol: symbol.to_string(),
        timeframe: Timeframe::OneDay,
    }
}

#[tokio::test]
async fn test_full_sync_then_incremental_is_idempotent() {
    let repo = candle_repo().await;
    let series = daily_series("ACME.NS", 1250);
    let vendor = Arc::new(MockVendor::new().with_series("ACME.NS", series.clone()));
    let scheduler = SyncScheduler::new(vendor.clone(), repo.clone(), 5);
    let cancel = CancellationToken::new();

    // Full download lands the whole history
    let report = scheduler
        .run_batch(vec![task("ACME.NS")], SyncMode::Full, &cancel)
        .await;
    assert_eq!(report.successful, 1);
    assert_eq!(report.total_rows, 1250);

    // Same evening: fresh data, incremental run inserts nothing
    let report = scheduler
        .run_batch(vec![task("ACME.NS")], SyncMode::Incremental, &cancel)
        .await;
    assert_eq!(report.successful, 1);
    assert_eq!(report.total_rows, 0);

    let latest = repo
        .latest_time("ACME.NS", Timeframe::OneDay)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest, series.last().unwrap().time);
}

#[tokio::test]
async fn test_force_refetches_but_inserts_nothing_new() {
    let repo = candle_repo().await;
    let vendor = Arc::new(MockVendor::new().with_series("ACME.NS", daily_series("ACME.NS", 100)));
    let scheduler = SyncScheduler::new(vendor.clone(), repo.clone(), 2);
    let cancel = CancellationToken::new();

    scheduler
        .run_batch(vec![task("ACME.NS")], SyncMode::Full, &cancel)
        .await;
    let fetches_after_full = vendor.fetches.load(Ordering::SeqCst);

    // Incremental skips without touching the vendor
    scheduler
        .run_batch(vec![task("ACME.NS")], SyncMode::Incremental, &cancel)
        .await;
    assert_eq!(vendor.fetches.load(Ordering::SeqCst), fetches_after_full);

    // Force bypasses the staleness skip but still inserts only newer rows
    let report = scheduler
        .run_batch(vec![task("ACME.NS")], SyncMode::Force, &cancel)
        .await;
    assert!(vendor.fetches.load(Ordering::SeqCst) > fetches_after_full);
    assert_eq!(report.total_rows, 0);
}

#[tokio::test]
async fn test_rate_limit_classification_isolated_per_task() {
    let repo = candle_repo().await;
    let vendor = Arc::new(
        MockVendor::new()
            .with_series("BBB.NS", daily_series("BBB.NS", 60))
            .with_series("CCC.NS", daily_series("CCC.NS", 60)),
    );
    let scheduler = SyncScheduler::new(vendor, repo, 3);
    let cancel = CancellationToken::new();

    let report = scheduler
        .run_batch(
            vec![task("AAA.NS"), task("BBB.NS"), task("CCC.NS")],
            SyncMode::Full,
            &cancel,
        )
        .await;

    assert_eq!(report.successful, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.error_counts_by_kind.get("RateLimited"), Some(&1));

    let failed = report
        .reports
        .iter()
        .find(|r| r.symbol == "AAA.NS")
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Error);
    assert_eq!(failed.error_kind, Some(ErrorKind::RateLimited));
    assert_eq!(failed.rows_inserted, 0);
}

#[tokio::test]
async fn test_cancellation_stops_new_dispatch() {
    let repo = candle_repo().await;
    let vendor = Arc::new(MockVendor::new().with_series("ACME.NS", daily_series("ACME.NS", 10)));
    let scheduler = SyncScheduler::new(vendor, repo, 1);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = scheduler
        .run_batch(
            vec![task("ACME.NS"), task("OTHR.NS")],
            SyncMode::Full,
            &cancel,
        )
        .await;

    assert_eq!(report.successful, 0);
    assert_eq!(report.failed, 2);
    assert_eq!(report.error_counts_by_kind.get("Cancelled"), Some(&2));
}

#[tokio::test]
async fn test_derived_75m_sync_from_15m() {
    use zsignal::application::clock::ist_offset;
    use chrono::TimeZone;

    let repo = candle_repo().await;

    // A full NSE session of 15m candles already in the store
    let open = ist_offset()
        .with_ymd_and_hms(2025, 11, 7, 9, 15, 0)
        .unwrap()
        .with_timezone(&Utc);
    let source: Vec<Candle> = (0..25)
        .map(|i| Candle {
            symbol: "ACME.NS".to_string(),
            timeframe: Timeframe::FifteenMin,
            time: open + Duration::minutes(15 * i),
            open: Decimal::from(100),
            high: Decimal::from(102),
            low: Decimal::from(99),
            close: Decimal::from(101),
            volume: 1_000,
        })
        .collect();
    repo.insert_batch("ACME.NS", Timeframe::FifteenMin, &source)
        .await
        .unwrap();

    let vendor = Arc::new(MockVendor::new());
    let scheduler = SyncScheduler::new(vendor.clone(), repo.clone(), 1);
    let cancel = CancellationToken::new();

    let report = scheduler
        .run_batch(
            vec![SyncTask {
                symbol: "ACME.NS".to_string(),
                timeframe: Timeframe::SeventyFiveMin,
            }],
            SyncMode::Full,
            &cancel,
        )
        .await;

    // Five 75m buckets, derived locally without any vendor fetch
    assert_eq!(report.successful, 1);
    assert_eq!(report.total_rows, 5);
    assert_eq!(vendor.fetches.load(Ordering::SeqCst), 0);

    let derived = repo
        .tail("ACME.NS", Timeframe::SeventyFiveMin, 10)
        .await
        .unwrap();
    assert_eq!(derived.len(), 5);
    assert_eq!(derived[0].volume, 5_000);
}

#[tokio::test]
async fn test_rerun_of_derived_sync_is_idempotent() {
    use zsignal::application::clock::ist_offset;
    use chrono::TimeZone;

    let repo = candle_repo().await;
    let open = ist_offset()
        .with_ymd_and_hms(2025, 11, 7, 9, 15, 0)
        .unwrap()
        .with_timezone(&Utc);
    let source: Vec<Candle> = (0..25)
        .map(|i| Candle {
            symbol: "ACME.NS".to_string(),
            timeframe: Timeframe::FifteenMin,
            time: open + Duration::minutes(15 * i),
            open: Decimal::from(100),
            high: Decimal::from(102),
            low: Decimal::from(99),
            close: Decimal::from(101),
            volume: 1_000,
        })
        .collect();
    repo.insert_batch("ACME.NS", Timeframe::FifteenMin, &source)
        .await
        .unwrap();

    let scheduler = SyncScheduler::new(Arc::new(MockVendor::new()), repo.clone(), 1);
    let cancel = CancellationToken::new();
    let derive = |mode| {
        scheduler.run_batch(
            vec![SyncTask {
                symbol: "ACME.NS".to_string(),
                timeframe: Timeframe::SeventyFiveMin,
            }],
            mode,
            &cancel,
        )
    };

    let first = derive(SyncMode::Full).await;
    assert_eq!(first.total_rows, 5);

    // Rebuilding over the same source writes nothing new
    let second = derive(SyncMode::Full).await;
    assert_eq!(second.total_rows, 0);
}
