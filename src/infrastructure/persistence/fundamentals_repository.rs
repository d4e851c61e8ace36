use crate::domain::market::fundamentals::Fundamentals;
use crate::domain::repositories::FundamentalsRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

/// SQLite-backed fundamentals store; upsert replaces the whole row
pub struct SqliteFundamentalsRepository {
    pool: SqlitePool,
}

impl SqliteFundamentalsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FundamentalsRepository for SqliteFundamentalsRepository {
    async fn upsert(&self, fundamentals: &Fundamentals) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO fundamentals (
                symbol, current_price, market_cap, trailing_pe, price_to_book,
                return_on_equity, debt_to_equity, dividend_yield, profit_margins,
                revenue_growth, earnings_growth, beta, sector, industry,
                raw_data, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&fundamentals.symbol)
        .bind(fundamentals.current_price)
        .bind(fundamentals.market_cap)
        .bind(fundamentals.trailing_pe)
        .bind(fundamentals.price_to_book)
        .bind(fundamentals.return_on_equity)
        .bind(fundamentals.debt_to_equity)
        .bind(fundamentals.dividend_yield)
        .bind(fundamentals.profit_margins)
        .bind(fundamentals.revenue_growth)
        .bind(fundamentals.earnings_growth)
        .bind(fundamentals.beta)
        .bind(&fundamentals.sector)
        .bind(&fundamentals.industry)
        .bind(fundamentals.raw_data.to_string())
        .bind(fundamentals.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert fundamentals")?;
        Ok(())
    }

    async fn get(&self, symbol: &str) -> Result<Option<Fundamentals>> {
        let row = sqlx::query("SELECT * FROM fundamentals WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_text: String = row.try_get("raw_data")?;
        Ok(Some(Fundamentals {
            symbol: row.try_get("symbol")?,
            current_price: row.try_get("current_price")?,
            market_cap: row.try_get("market_cap")?,
            trailing_pe: row.try_get("trailing_pe")?,
            price_to_book: row.try_get("price_to_book")?,
            return_on_equity: row.try_get("return_on_equity")?,
            debt_to_equity: row.try_get("debt_to_equity")?,
            dividend_yield: row.try_get("dividend_yield")?,
            profit_margins: row.try_get("profit_margins")?,
            revenue_growth: row.try_get("revenue_growth")?,
            earnings_growth: row.try_get("earnings_growth")?,
            beta: row.try_get("beta")?,
            sector: row.try_get("sector")?,
            industry: row.try_get("industry")?,
            raw_data: serde_json::from_str(&raw_text).unwrap_or(serde_json::Value::Null),
            updated_at: row.try_get("updated_at")?,
        }))
    }
}
