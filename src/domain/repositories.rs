use crate::domain::market::candle::Candle;
use crate::domain::market::fundamentals::Fundamentals;
use crate::domain::market::instrument::Instrument;
use crate::domain::market::timeframe::Timeframe;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable, append-only OHLCV store keyed by (symbol, timeframe, time).
///
/// Inserts are idempotent on the composite key. Implementations serialize
/// writers per (symbol, timeframe) while leaving disjoint keys concurrent.
#[async_trait]
pub trait CandleRepository: Send + Sync {
    /// Inserts a batch, skipping rows whose key already exists.
    /// Returns the number of rows actually written.
    async fn insert_batch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<u64>;

    async fn latest_time(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Candles in [from, to], ascending in time
    async fn range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    /// The n most recent candles, ascending in time
    async fn tail(&self, symbol: &str, timeframe: Timeframe, n: usize) -> Result<Vec<Candle>>;
}

/// Upsertable per-symbol fundamentals; the whole record is replaced
#[async_trait]
pub trait FundamentalsRepository: Send + Sync {
    async fn upsert(&self, fundamentals: &Fundamentals) -> Result<()>;
    async fn get(&self, symbol: &str) -> Result<Option<Fundamentals>>;
}

/// Registry of known instruments. Soft-delete only.
#[async_trait]
pub trait InstrumentRepository: Send + Sync {
    async fn upsert(&self, instrument: &Instrument) -> Result<()>;
    async fn all_active(&self) -> Result<Vec<Instrument>>;
    async fn index_100_symbols(&self) -> Result<Vec<String>>;
    async fn deactivate(&self, symbol: &str) -> Result<()>;
}
