use crate::domain::market::instrument::Instrument;
use crate::domain::repositories::InstrumentRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// SQLite-backed instrument registry; rows are soft-deleted via `is_active`
pub struct SqliteInstrumentRepository {
    pool: SqlitePool,
}

impl SqliteInstrumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Instrument> {
        Ok(Instrument {
            symbol: row.try_get("symbol")?,
            name: row.try_get("name")?,
            sector: row.try_get("sector")?,
            industry: row.try_get("industry")?,
            is_index_50: row.try_get("is_index_50")?,
            is_index_100: row.try_get("is_index_100")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

#[async_trait]
impl InstrumentRepository for SqliteInstrumentRepository {
    async fn upsert(&self, instrument: &Instrument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO instruments (symbol, name, sector, industry, is_index_50, is_index_100, is_active, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                name = excluded.name,
                sector = excluded.sector,
                industry = excluded.industry,
                is_index_50 = excluded.is_index_50,
                is_index_100 = excluded.is_index_100,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&instrument.symbol)
        .bind(&instrument.name)
        .bind(&instrument.sector)
        .bind(&instrument.industry)
        .bind(instrument.is_index_50)
        .bind(instrument.is_index_100)
        .bind(instrument.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to upsert instrument")?;
        Ok(())
    }

    async fn all_active(&self) -> Result<Vec<Instrument>> {
        let rows = sqlx::query("SELECT * FROM instruments WHERE is_active = 1 ORDER BY symbol")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn index_100_symbols(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT symbol FROM instruments WHERE is_index_100 = 1 AND is_active = 1 ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("symbol").map_err(Into::into))
            .collect()
    }

    async fn deactivate(&self, symbol: &str) -> Result<()> {
        sqlx::query("UPDATE instruments SET is_active = 0, updated_at = ? WHERE symbol = ?")
            .bind(Utc::now())
            .bind(symbol)
            .execute(&self.pool)
            .await
            .context("Failed to deactivate instrument")?;
        Ok(())
    }
}
