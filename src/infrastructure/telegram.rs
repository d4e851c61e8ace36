//! Telegram delivery sink: formats signals and fans them out.
//!
//! Two modes: a single fixed chat, or broadcast to every active subscriber
//! from a directory snapshot. Per-subscriber failures are counted and
//! logged, never fatal to the batch.

use crate::domain::ports::{DeliveryReport, SignalSink, UserDirectory};
use crate::domain::signal::{BatchSummary, Consensus, Signal, consensus};
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub enum SinkMode {
    /// One fixed recipient
    Single { chat_id: i64 },
    /// Everyone active in the directory at delivery time
    Broadcast { directory: Arc<dyn UserDirectory> },
}

pub struct TelegramSink {
    client: ClientWithMiddleware,
    base_url: String,
    bot_token: String,
    mode: SinkMode,
}

impl TelegramSink {
    pub fn new(bot_token: String, mode: SinkMode) -> Self {
        Self::with_base_url(bot_token, mode, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(bot_token: String, mode: SinkMode, base_url: String) -> Self {
        Self {
            client: HttpClientFactory::create_client(REQUEST_TIMEOUT),
            base_url,
            bot_token,
            mode,
        }
    }

    async fn recipients(&self) -> Result<Vec<i64>> {
        match &self.mode {
            SinkMode::Single { chat_id } => Ok(vec![*chat_id]),
            SinkMode::Broadcast { directory } => Ok(directory
                .active_subscribers()
                .await?
                .into_iter()
                .map(|s| s.chat_id)
                .collect()),
        }
    }

    async fn send_to_all(&self, text: &str) -> Result<DeliveryReport> {
        let recipients = self.recipients().await?;
        if recipients.is_empty() {
            warn!("no active recipients to deliver to");
            return Ok(DeliveryReport::default());
        }

        let mut report = DeliveryReport::default();
        for chat_id in recipients {
            match self.send_message(chat_id, text).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("delivery to {} failed: {}", chat_id, e);
                }
            }
        }
        info!(
            "delivered to {}/{} recipients",
            report.delivered,
            report.delivered + report.failed
        );
        Ok(report)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        #[derive(Serialize)]
        struct SendMessage<'a> {
            chat_id: i64,
            text: &'a str,
            parse_mode: &'a str,
        }

        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id,
                text,
                parse_mode: "Markdown",
            })
            .send()
            .await
            .context("sendMessage request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("sendMessage returned HTTP {}", status);
        }
        Ok(())
    }
}

#[async_trait]
impl SignalSink for TelegramSink {
    async fn deliver(&self, signal: &Signal) -> Result<DeliveryReport> {
        let mut message = format_signal_message(signal);
        if signal.is_priority() {
            message = format!("*HIGH CONFIDENCE SIGNAL*\n\n{}", message);
        }
        self.send_to_all(&message).await
    }

    async fn deliver_summary(&self, summary: &BatchSummary) -> Result<DeliveryReport> {
        self.send_to_all(&format_summary_message(summary)).await
    }
}

/// Escapes the markdown characters Telegram trips over in free text
fn escape_markdown(text: &str) -> String {
    text.replace('*', "\\*")
        .replace('_', "\\_")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

/// Renders the full signal message: sentiment, strategy levels, AI block
/// with hybrid setup, and the consensus line.
pub fn format_signal_message(signal: &Signal) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("*{} - {} SIGNAL*", signal.symbol, signal.signal_type));
    lines.push(String::new());

    if let Some(sentiment) = &signal.sentiment {
        lines.push(format!(
            "*News Sentiment:* {} ({}%)",
            sentiment.label, sentiment.confidence
        ));
        lines.push(format!(
            "*Strategy Confidence:* {:.1}%",
            signal.original_confidence.unwrap_or(signal.confidence)
        ));
        lines.push(format!(
            "*Final Confidence:* {:.1}% ({:+} from news)",
            signal.confidence,
            signal.sentiment_adjusted.unwrap_or(0)
        ));
    } else {
        lines.push(format!("*Confidence:* {:.1}%", signal.confidence));
    }

    lines.push(String::new());
    lines.push("*STRATEGY SIGNAL:*".to_string());
    lines.push(format!("Entry: {:.2}", signal.entry_price));
    lines.push(format!(
        "Stop Loss: {:.2} (Risk: {:.2})",
        signal.stop_loss, signal.risk
    ));
    lines.push(format!(
        "Target 1: {:.2} (Reward: {:.2})",
        signal.target1, signal.reward
    ));
    if let Some(target2) = signal.target2 {
        lines.push(format!("Target 2: {:.2}", target2));
    }
    if let Some(target3) = signal.target3 {
        lines.push(format!("Target 3: {:.2}", target3));
    }
    lines.push(format!("Risk:Reward: 1:{:.1}", signal.rr_ratio));

    if let Some(tech) = &signal.technical_analysis {
        lines.push(String::new());
        lines.push("*AI ANALYSIS:*".to_string());
        lines.push(format!(
            "Prediction: {} ({}%)",
            tech.prediction, tech.confidence
        ));
        lines.push(format!("Recommendation: {}", tech.recommendation));
        lines.push(format!("Timeframe: {}", tech.timeframe));
        lines.push(format!("Strength: {}", tech.strength.to_uppercase()));
        if !tech.key_factors.is_empty() {
            lines.push(format!("Key Factors: {}", tech.key_factors.join(", ")));
        }

        if let (Some(ai_entry), Some(ai_stop), Some(ai_target1)) =
            (tech.ai_entry, tech.ai_stop, tech.ai_target1)
        {
            lines.push(String::new());
            lines.push("*AI SUGGESTED LEVELS:*".to_string());
            lines.push(format!("Entry: {:.2}", ai_entry));
            lines.push(format!("Stop: {:.2}", ai_stop));
            lines.push(format!("Target 1: {:.2}", ai_target1));
            if let Some(ai_target2) = tech.ai_target2 {
                lines.push(format!("Target 2: {:.2}", ai_target2));
            }
            let ai_risk = ai_entry - ai_stop;
            if ai_risk > 0.0 {
                lines.push(format!("R:R: 1:{:.1}", (ai_target1 - ai_entry) / ai_risk));
            }

            // Hybrid setup: tighter of the strategy and AI levels
            let hybrid_entry = signal.entry_price.min(ai_entry);
            let hybrid_stop = signal.stop_loss.max(ai_stop);
            let hybrid_target = signal.target1.max(ai_target1);
            let hybrid_risk = hybrid_entry - hybrid_stop;
            if hybrid_risk > 0.0 {
                lines.push(String::new());
                lines.push("*HYBRID SETUP:*".to_string());
                lines.push(format!("Entry: {:.2}", hybrid_entry));
                lines.push(format!("Stop: {:.2}", hybrid_stop));
                lines.push(format!("Target: {:.2}", hybrid_target));
                lines.push(format!(
                    "R:R: 1:{:.1}",
                    (hybrid_target - hybrid_entry) / hybrid_risk
                ));
            }
        }

        if !tech.reasoning.is_empty() {
            lines.push(String::new());
            lines.push("*AI REASONING:*".to_string());
            lines.push(escape_markdown(&tech.reasoning));
        }

        lines.push(String::new());
        let verdict = consensus(signal.signal_type, tech.prediction, tech.recommendation);
        lines.push(match verdict {
            Consensus::StrongConsensus => {
                "*STRONG_CONSENSUS:* Strategy & AI agree - BUY".to_string()
            }
            Consensus::Moderate => format!(
                "*MODERATE:* Both bullish, AI suggests {}",
                tech.recommendation
            ),
            Consensus::Conflict => format!(
                "*CONFLICT:* Strategy BUY, AI {}",
                tech.prediction
            ),
        });
    }

    lines.push(String::new());
    lines.push(signal.generated_at.format("%Y-%m-%d %H:%M:%S").to_string());
    lines.join("\n")
}

/// End-of-batch summary mirroring the pipeline's accounting
pub fn format_summary_message(summary: &BatchSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "*Signal Batch Summary*");
    let _ = writeln!(out, "Date: {}", Utc::now().format("%Y-%m-%d"));
    let _ = writeln!(out);
    let _ = writeln!(out, "Symbols analyzed: *{}*", summary.symbols_analyzed);
    let _ = writeln!(out, "Signals generated: *{}*", summary.signals_generated);
    let _ = writeln!(out, "Signals sent: *{}*", summary.signals_sent);
    if !summary.error_counts_by_kind.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Errors by kind:");
        for (kind, count) in &summary.error_counts_by_kind {
            let _ = writeln!(out, "- {}: {}", kind, count);
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{
        Analysis, CategoryReport, Prediction, Recommendation, Sentiment, SentimentLabel,
        SignalType, TechnicalAnalysis,
    };

    fn base_signal() -> Signal {
        let report = CategoryReport::from_conditions(vec![]);
        Signal {
            symbol: "RELIANCE.NS".to_string(),
            generated_at: Utc::now(),
            signal_type: SignalType::Buy,
            confidence: 82.0,
            original_confidence: Some(70.0),
            sentiment_adjusted: Some(12),
            technical_confidence: 63.7,
            fundamental_score: 37,
            fundamental_adjustment: 18.5,
            entry_price: 2450.0,
            stop_loss: 2401.0,
            target1: 2540.0,
            target2: Some(2600.0),
            target3: Some(2680.0),
            risk: 49.0,
            reward: 90.0,
            rr_ratio: 1.84,
            analysis: Analysis {
                trend: report.clone(),
                momentum: report.clone(),
                volatility: report,
                technical_confidence: 63.7,
                strong_categories: 2,
            },
            sentiment: Some(Sentiment {
                label: SentimentLabel::Bullish,
                confidence: 85,
                impact: 12,
                summary: "Strong results".to_string(),
            }),
            technical_analysis: None,
            tail_candles: vec![],
            fundamentals: None,
        }
    }

    #[test]
    fn test_signal_message_strategy_block() {
        let message = format_signal_message(&base_signal());
        assert!(message.contains("RELIANCE.NS - BUY SIGNAL"));
        assert!(message.contains("Entry: 2450.00"));
        assert!(message.contains("Stop Loss: 2401.00 (Risk: 49.00)"));
        assert!(message.contains("Target 1: 2540.00 (Reward: 90.00)"));
        assert!(message.contains("Risk:Reward: 1:1.8"));
        assert!(message.contains("BULLISH (85%)"));
        assert!(message.contains("(+12 from news)"));
    }

    #[test]
    fn test_signal_message_consensus_lines() {
        let mut signal = base_signal();
        let mut tech = TechnicalAnalysis {
            prediction: Prediction::Bullish,
            recommendation: Recommendation::Buy,
            ..TechnicalAnalysis::default()
        };
        signal.technical_analysis = Some(tech.clone());
        assert!(format_signal_message(&signal).contains("STRONG_CONSENSUS"));

        tech.recommendation = Recommendation::Hold;
        signal.technical_analysis = Some(tech.clone());
        assert!(format_signal_message(&signal).contains("MODERATE"));

        tech.prediction = Prediction::Bearish;
        signal.technical_analysis = Some(tech);
        assert!(format_signal_message(&signal).contains("CONFLICT"));
    }

    #[test]
    fn test_signal_message_hybrid_setup() {
        let mut signal = base_signal();
        signal.technical_analysis = Some(TechnicalAnalysis {
            prediction: Prediction::Bullish,
            recommendation: Recommendation::Buy,
            ai_entry: Some(2440.0),
            ai_stop: Some(2410.0),
            ai_target1: Some(2560.0),
            ..TechnicalAnalysis::default()
        });
        let message = format_signal_message(&signal);
        assert!(message.contains("AI SUGGESTED LEVELS"));
        // Hybrid: lower entry, higher stop, higher target
        assert!(message.contains("*HYBRID SETUP:*"));
        assert!(message.contains("Entry: 2440.00"));
        assert!(message.contains("Stop: 2410.00"));
        assert!(message.contains("Target: 2560.00"));
    }

    #[test]
    fn test_reasoning_markdown_escaped() {
        let mut signal = base_signal();
        signal.technical_analysis = Some(TechnicalAnalysis {
            reasoning: "breakout *above* the 50_day line".to_string(),
            ..TechnicalAnalysis::default()
        });
        let message = format_signal_message(&signal);
        assert!(message.contains("\\*above\\*"));
        assert!(message.contains("50\\_day"));
    }

    #[test]
    fn test_summary_message() {
        let mut summary = BatchSummary {
            symbols_analyzed: 100,
            signals_generated: 7,
            signals_sent: 6,
            ..BatchSummary::default()
        };
        summary
            .error_counts_by_kind
            .insert("RateLimited".to_string(), 1);
        let message = format_summary_message(&summary);
        assert!(message.contains("Symbols analyzed: *100*"));
        assert!(message.contains("Signals generated: *7*"));
        assert!(message.contains("- RateLimited: 1"));
    }
}
