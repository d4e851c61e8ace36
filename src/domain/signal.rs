use crate::domain::market::candle::Candle;
use crate::domain::market::fundamentals::Fundamentals;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Signal direction. The composite strategy only ever emits BUY; the enum
/// exists so downstream formatting stays total if that changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    Buy,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Buy => write!(f, "BUY"),
        }
    }
}

/// One boolean condition inside a category report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionCheck {
    pub name: &'static str,
    pub met: bool,
}

/// Score for one analysis category (trend, momentum or volatility)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryReport {
    /// 0-100, conditions_met / total_conditions
    pub score: f64,
    pub conditions_met: u8,
    pub total_conditions: u8,
    pub details: Vec<ConditionCheck>,
}

impl CategoryReport {
    pub fn from_conditions(details: Vec<ConditionCheck>) -> Self {
        let total = details.len() as u8;
        let met = details.iter().filter(|c| c.met).count() as u8;
        let score = if total == 0 {
            0.0
        } else {
            f64::from(met) / f64::from(total) * 100.0
        };
        Self {
            score,
            conditions_met: met,
            total_conditions: total,
            details,
        }
    }

    /// A category counts as strong when it scores at least 60
    pub fn is_strong(&self) -> bool {
        self.score >= 60.0
    }
}

/// Complete technical analysis behind a signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub trend: CategoryReport,
    pub momentum: CategoryReport,
    pub volatility: CategoryReport,
    /// Weighted composite: 0.40 trend + 0.35 momentum + 0.25 volatility
    pub technical_confidence: f64,
    pub strong_categories: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentLabel::Bullish => write!(f, "BULLISH"),
            SentimentLabel::Bearish => write!(f, "BEARISH"),
            SentimentLabel::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// News-sentiment verdict attached by the enrichment stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// 0-100
    pub confidence: u8,
    /// Additive confidence perturbation, clamped to [-20, 20]
    pub impact: i32,
    pub summary: String,
}

impl Sentiment {
    pub fn neutral(summary: impl Into<String>) -> Self {
        Self {
            label: SentimentLabel::Neutral,
            confidence: 0,
            impact: 0,
            summary: summary.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prediction {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Bullish => write!(f, "BULLISH"),
            Prediction::Bearish => write!(f, "BEARISH"),
            Prediction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Buy,
    Hold,
    Avoid,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Buy => write!(f, "BUY"),
            Recommendation::Hold => write!(f, "HOLD"),
            Recommendation::Avoid => write!(f, "AVOID"),
        }
    }
}

/// LLM technical commentary with optional alternative trade levels.
///
/// Every field has a documented default so a partially parseable response
/// still yields a usable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAnalysis {
    pub strength: String,
    pub prediction: Prediction,
    pub timeframe: String,
    /// 0-100, defaults to 50 when unparseable
    pub confidence: u8,
    pub key_factors: Vec<String>,
    pub recommendation: Recommendation,
    pub reasoning: String,
    pub ai_entry: Option<f64>,
    pub ai_stop: Option<f64>,
    pub ai_target1: Option<f64>,
    pub ai_target2: Option<f64>,
}

impl Default for TechnicalAnalysis {
    fn default() -> Self {
        Self {
            strength: "moderate".to_string(),
            prediction: Prediction::Neutral,
            timeframe: "1 week".to_string(),
            confidence: 50,
            key_factors: Vec::new(),
            recommendation: Recommendation::Hold,
            reasoning: String::new(),
            ai_entry: None,
            ai_stop: None,
            ai_target1: None,
            ai_target2: None,
        }
    }
}

/// Agreement bucket between the strategy signal and the LLM verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consensus {
    StrongConsensus,
    Moderate,
    Conflict,
}

impl fmt::Display for Consensus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consensus::StrongConsensus => write!(f, "STRONG_CONSENSUS"),
            Consensus::Moderate => write!(f, "MODERATE"),
            Consensus::Conflict => write!(f, "CONFLICT"),
        }
    }
}

/// Derives the consensus bucket from the strategy type and the AI verdict.
/// Purely a function of its inputs; no other signal state participates.
pub fn consensus(
    signal_type: SignalType,
    prediction: Prediction,
    recommendation: Recommendation,
) -> Consensus {
    match (signal_type, prediction, recommendation) {
        (SignalType::Buy, Prediction::Bullish, Recommendation::Buy) => Consensus::StrongConsensus,
        (SignalType::Buy, Prediction::Bullish, _) => Consensus::Moderate,
        (SignalType::Buy, _, _) => Consensus::Conflict,
    }
}

/// A fully-planned BUY signal.
///
/// Ephemeral: the core never persists signals, sinks may.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub symbol: String,
    pub generated_at: DateTime<Utc>,
    pub signal_type: SignalType,
    /// Final confidence after fundamental and sentiment adjustment, 0-100
    pub confidence: f64,
    /// Pre-sentiment confidence, set by the enrichment stage
    pub original_confidence: Option<f64>,
    /// Sentiment impact applied, set by the enrichment stage
    pub sentiment_adjusted: Option<i32>,
    pub technical_confidence: f64,
    pub fundamental_score: i32,
    pub fundamental_adjustment: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target1: f64,
    pub target2: Option<f64>,
    pub target3: Option<f64>,
    pub risk: f64,
    pub reward: f64,
    pub rr_ratio: f64,
    pub analysis: Analysis,
    pub sentiment: Option<Sentiment>,
    pub technical_analysis: Option<TechnicalAnalysis>,
    /// Tail candles carried along for the LLM prompt
    pub tail_candles: Vec<Candle>,
    pub fundamentals: Option<Fundamentals>,
}

impl Signal {
    /// High-confidence signals are tagged for downstream prioritisation
    pub fn is_priority(&self) -> bool {
        self.confidence > 90.0
    }
}

/// End-of-batch accounting mirrored into the final sink message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub symbols_analyzed: usize,
    pub signals_generated: usize,
    pub signals_sent: usize,
    pub error_counts_by_kind: BTreeMap<String, usize>,
}
