use crate::domain::errors::VendorError;
use crate::domain::market::candle::Candle;
use crate::domain::market::fundamentals::Fundamentals;
use crate::domain::market::timeframe::{FetchPeriod, Timeframe};
use crate::domain::signal::{BatchSummary, Signal};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Typed access to the external OHLCV/fundamentals vendor.
///
/// Implementations classify every failure into the `VendorError` taxonomy
/// and enforce a polite inter-request delay internally.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Contiguous candle block ending at "now", ascending in time.
    /// The period is clamped to the vendor's per-timeframe bound.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        period: FetchPeriod,
    ) -> Result<Vec<Candle>, VendorError>;

    /// Full fundamentals snapshot, or `None` when the vendor has nothing
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Option<Fundamentals>, VendorError>;

    /// Cheap liveness probe for a symbol
    async fn validate(&self, symbol: &str) -> Result<bool, VendorError>;
}

/// One recent news item about a company
#[derive(Debug, Clone, PartialEq)]
pub struct Headline {
    pub title: String,
    pub publisher: String,
    pub link: Option<String>,
    pub published: DateTime<Utc>,
}

/// External news-feed lookup keyed by canonical company name
#[async_trait]
pub trait NewsFeed: Send + Sync {
    /// Up to `limit` headlines published within the last `days_back` days
    async fn recent_headlines(
        &self,
        company: &str,
        days_back: i64,
        limit: usize,
    ) -> Result<Vec<Headline>>;
}

/// Single-capability LLM completion interface shared by both backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
    fn model_name(&self) -> &str;
}

/// A delivery target for broadcast signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub chat_id: i64,
    pub is_active: bool,
}

/// Read-only view over registered subscribers
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>>;
}

/// Outcome of fanning one message out to subscribers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Terminal stage of the pipeline: formats and delivers signals.
///
/// Per-subscriber failures are isolated and counted, never fatal.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn deliver(&self, signal: &Signal) -> Result<DeliveryReport>;
    async fn deliver_summary(&self, summary: &BatchSummary) -> Result<DeliveryReport>;
}
