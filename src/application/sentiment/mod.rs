//! Optional AI enrichment: news sentiment plus LLM technical commentary.

pub mod parser;
pub mod prompt;

use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{LlmClient, NewsFeed};
use crate::domain::signal::{Sentiment, Signal};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Minimum spacing between LLM calls within a batch
const LLM_CALL_GAP: Duration = Duration::from_secs(7);
/// Headlines fetched per symbol before prompt truncation
const HEADLINE_FETCH_LIMIT: usize = 10;

/// Ticker prefixes mapped to the names news search actually knows
const COMPANY_NAMES: &[(&str, &str)] = &[
    ("RELIANCE", "Reliance Industries"),
    ("TCS", "Tata Consultancy Services"),
    ("INFY", "Infosys"),
    ("HDFCBANK", "HDFC Bank"),
    ("ICICIBANK", "ICICI Bank"),
    ("SBIN", "State Bank of India"),
    ("BHARTIARTL", "Bharti Airtel"),
    ("ITC", "ITC Limited"),
    ("WIPRO", "Wipro"),
    ("AXISBANK", "Axis Bank"),
    ("LT", "Larsen Toubro"),
    ("MARUTI", "Maruti Suzuki"),
    ("TATAMOTORS", "Tata Motors"),
    ("TATASTEEL", "Tata Steel"),
    ("HCLTECH", "HCL Technologies"),
    ("TECHM", "Tech Mahindra"),
    ("SUNPHARMA", "Sun Pharma"),
    ("ASIANPAINT", "Asian Paints"),
    ("ULTRACEMCO", "UltraTech Cement"),
    ("NESTLEIND", "Nestle India"),
    ("TITAN", "Titan Company"),
    ("BAJFINANCE", "Bajaj Finance"),
    ("KOTAKBANK", "Kotak Mahindra Bank"),
    ("HINDUNILVR", "Hindustan Unilever"),
    ("ONGC", "ONGC"),
    ("NTPC", "NTPC"),
    ("POWERGRID", "Power Grid"),
    ("COALINDIA", "Coal India"),
    ("BPCL", "Bharat Petroleum"),
    ("IOC", "Indian Oil"),
    ("VEDL", "Vedanta"),
    ("HINDALCO", "Hindalco"),
    ("JSWSTEEL", "JSW Steel"),
    ("GRASIM", "Grasim Industries"),
];

/// Canonical company name for news search; unknown tickers fall back to
/// the bare symbol with the exchange suffix stripped.
pub fn company_name(symbol: &str) -> &str {
    let bare = symbol
        .trim_end_matches(".NS")
        .trim_end_matches(".BO");
    COMPANY_NAMES
        .iter()
        .find(|(ticker, _)| *ticker == bare)
        .map_or(bare, |(_, name)| name)
}

/// Headline lookback per trading timeframe: intraday positions close the
/// same day, daily swing trades look three days back.
pub fn news_lookback_days(timeframe: Timeframe) -> i64 {
    match timeframe {
        Timeframe::SeventyFiveMin => 1,
        _ => 3,
    }
}

/// Enrichment pass over a base signal: `Signal -> Signal`, never mutating
/// its input beyond the returned copy and never failing the pipeline.
pub struct SentimentEnricher {
    news: Arc<dyn NewsFeed>,
    llm: Arc<dyn LlmClient>,
    include_technical: bool,
    call_gap: Duration,
    last_llm_call: Mutex<Option<Instant>>,
}

impl SentimentEnricher {
    pub fn new(news: Arc<dyn NewsFeed>, llm: Arc<dyn LlmClient>, include_technical: bool) -> Self {
        Self {
            news,
            llm,
            include_technical,
            call_gap: LLM_CALL_GAP,
            last_llm_call: Mutex::new(None),
        }
    }

    /// Overrides the inter-call spacing (tests use zero)
    pub fn with_call_gap(mut self, gap: Duration) -> Self {
        self.call_gap = gap;
        self
    }

    /// Attaches sentiment (and optionally AI technical analysis) to the
    /// signal, adjusting confidence by the bounded sentiment impact.
    /// Failures downgrade to the base signal with a logged warning.
    pub async fn enhance(&self, mut signal: Signal, timeframe: Timeframe) -> Signal {
        let sentiment = match self.news_sentiment(&signal.symbol, timeframe).await {
            Ok(sentiment) => sentiment,
            Err(e) => {
                warn!("{}: sentiment lookup failed: {}", signal.symbol, e);
                Sentiment::neutral(format!("Sentiment unavailable: {}", e))
            }
        };

        let original = signal.confidence;
        let adjusted = (original + f64::from(sentiment.impact)).clamp(0.0, 100.0);
        info!(
            "{}: confidence {:.1}% -> {:.1}% (sentiment impact {:+})",
            signal.symbol, original, adjusted, sentiment.impact
        );

        signal.original_confidence = Some(original);
        signal.sentiment_adjusted = Some(sentiment.impact);
        signal.confidence = adjusted;
        signal.sentiment = Some(sentiment);

        if self.include_technical {
            match self.technical_analysis(&signal).await {
                Ok(analysis) => {
                    info!(
                        "{}: AI technical - {} ({}%), recommendation {}",
                        signal.symbol, analysis.prediction, analysis.confidence,
                        analysis.recommendation
                    );
                    signal.technical_analysis = Some(analysis);
                }
                Err(e) => warn!("{}: AI technical analysis failed: {}", signal.symbol, e),
            }
        }

        signal
    }

    async fn news_sentiment(&self, symbol: &str, timeframe: Timeframe) -> Result<Sentiment> {
        let company = company_name(symbol);
        let days_back = news_lookback_days(timeframe);
        let headlines = self
            .news
            .recent_headlines(company, days_back, HEADLINE_FETCH_LIMIT)
            .await?;

        if headlines.is_empty() {
            info!("{}: no recent news", symbol);
            return Ok(Sentiment::neutral("No recent news"));
        }

        let prompt = prompt::sentiment_prompt(symbol, &headlines);
        let response = self.throttled_complete(&prompt).await?;
        Ok(parser::parse_sentiment(&response))
    }

    async fn technical_analysis(
        &self,
        signal: &Signal,
    ) -> Result<crate::domain::signal::TechnicalAnalysis> {
        let prompt = prompt::technical_prompt(signal);
        let response = self.throttled_complete(&prompt).await?;
        Ok(parser::parse_technical(&response))
    }

    /// Serialises LLM calls and spaces them at least `LLM_CALL_GAP` apart
    async fn throttled_complete(&self, prompt: &str) -> Result<String> {
        let mut last = self.last_llm_call.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.call_gap {
                tokio::time::sleep(self.call_gap - elapsed).await;
            }
        }
        let result = self.llm.complete(prompt).await;
        *last = Some(Instant::now());
        result
    }
}
