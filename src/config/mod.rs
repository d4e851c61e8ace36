//! Configuration loading from environment variables.
//!
//! `.env` is loaded by main before this runs; every knob has a default so
//! a bare environment still yields a working batch configuration.

use crate::application::sync::scheduler::SyncMode;
use crate::domain::market::timeframe::Timeframe;
use crate::infrastructure::llm::LlmProviderChoice;
use anyhow::{Context, Result, anyhow};
use std::env;
use std::str::FromStr;

/// Who receives broadcast signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    /// The single configured chat
    Single,
    /// Every active subscriber in the directory
    AllActive,
}

impl FromStr for BroadcastMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "single" => Ok(BroadcastMode::Single),
            "all_active" | "all" | "broadcast" => Ok(BroadcastMode::AllActive),
            _ => Err(anyhow!(
                "Invalid broadcast mode: '{}'. Must be 'single' or 'all_active'",
                s
            )),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    // Signal generation
    pub timeframe: Timeframe,
    pub min_confidence: f64,
    pub lookback_candles: Option<usize>,
    pub min_rr: f64,

    // Sync
    pub sync_mode: SyncMode,
    pub sync_timeframes: Vec<Timeframe>,
    pub worker_cap: usize,

    // Enrichment & delivery
    pub sentiment_enabled: bool,
    pub broadcast_mode: BroadcastMode,
    pub llm_provider: LlmProviderChoice,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/zsignal.db".to_string());

        let timeframe = parse_env("TIMEFRAME", Timeframe::OneDay)?;
        let min_confidence = parse_env("MIN_CONFIDENCE", 65.0_f64)?;
        if !(0.0..=100.0).contains(&min_confidence) {
            anyhow::bail!("MIN_CONFIDENCE must be within [0, 100]");
        }
        let lookback_candles = match env::var("LOOKBACK_CANDLES") {
            Ok(value) => Some(
                value
                    .parse::<usize>()
                    .context("LOOKBACK_CANDLES must be a positive integer")?,
            ),
            Err(_) => None,
        };
        let min_rr = parse_env("MIN_RR", 1.5_f64)?;

        let sync_mode = parse_env("SYNC_MODE", SyncMode::Incremental)?;
        let sync_timeframes = match env::var("SYNC_TIMEFRAMES") {
            Ok(value) => value
                .split(',')
                .map(|s| Timeframe::from_str(s.trim()))
                .collect::<Result<Vec<_>>>()?,
            Err(_) => vec![Timeframe::OneDay, Timeframe::FifteenMin],
        };
        let worker_cap = parse_env("WORKER_CAP", 5_usize)?;
        if worker_cap == 0 {
            anyhow::bail!("WORKER_CAP must be positive");
        }

        let sentiment_enabled = parse_env("SENTIMENT_ENABLED", false)?;
        let broadcast_mode = parse_env("BROADCAST_MODE", BroadcastMode::Single)?;
        let llm_provider = parse_env("LLM_PROVIDER", LlmProviderChoice::Auto)?;

        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN").ok().filter(|v| !v.is_empty());
        let telegram_chat_id = match env::var("TELEGRAM_CHAT_ID") {
            Ok(value) => Some(
                value
                    .parse::<i64>()
                    .context("TELEGRAM_CHAT_ID must be an integer chat id")?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            timeframe,
            min_confidence,
            lookback_candles,
            min_rr,
            sync_mode,
            sync_timeframes,
            worker_cap,
            sentiment_enabled,
            broadcast_mode,
            llm_provider,
            telegram_bot_token,
            telegram_chat_id,
        })
    }

    /// Lookback in candles: explicit override or the timeframe default
    pub fn lookback_for(&self, timeframe: Timeframe) -> usize {
        self.lookback_candles
            .unwrap_or_else(|| timeframe.default_lookback())
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    match env::var(key) {
        Ok(value) if !value.is_empty() => value
            .parse::<T>()
            .map_err(|e| e.into())
            .with_context(|| format!("invalid {}", key)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_env().expect("defaults must parse");
        assert_eq!(config.timeframe, Timeframe::OneDay);
        assert_eq!(config.min_confidence, 65.0);
        assert_eq!(config.worker_cap, 5);
        assert_eq!(config.sync_mode, SyncMode::Incremental);
        assert_eq!(config.broadcast_mode, BroadcastMode::Single);
    }

    #[test]
    fn test_lookback_defaults_per_timeframe() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.lookback_for(Timeframe::OneDay), 365);
        assert_eq!(config.lookback_for(Timeframe::SeventyFiveMin), 150);
    }

    #[test]
    fn test_broadcast_mode_parsing() {
        assert_eq!(
            BroadcastMode::from_str("single").unwrap(),
            BroadcastMode::Single
        );
        assert_eq!(
            BroadcastMode::from_str("ALL_ACTIVE").unwrap(),
            BroadcastMode::AllActive
        );
        assert!(BroadcastMode::from_str("everyone").is_err());
    }
}
