//! Prompt construction for the LLM enrichment calls.

use crate::application::indicators::{CandleWindow, patterns, trend, volume};
use crate::domain::market::candle::Candle;
use crate::domain::market::fundamentals::Fundamentals;
use crate::domain::ports::Headline;
use crate::domain::signal::{Sentiment, Signal};
use std::fmt::Write;

/// Headlines actually included in the sentiment prompt
const HEADLINES_FOR_PROMPT: usize = 5;

/// Secondary indicator readings summarised for the technical prompt
#[derive(Debug, Clone, Default)]
pub struct IndicatorSnapshot {
    pub adx: Option<f64>,
    pub supertrend_bullish: Option<bool>,
    pub obv_rising: Option<bool>,
    pub mfi: Option<f64>,
    pub vwap: Option<f64>,
    pub patterns: Vec<(&'static str, i32)>,
}

impl IndicatorSnapshot {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let window = CandleWindow::from_candles(candles);
        if window.is_empty() {
            return Self::default();
        }

        let adx = trend::adx(&window, 14).adx.last().copied().flatten();
        let supertrend_bullish = trend::supertrend(&window, 10, 3.0)
            .direction
            .last()
            .copied()
            .flatten()
            .map(|d| d == 1);
        let obv = volume::obv(&window);
        let obv_rising = (obv.len() >= 10).then(|| obv[obv.len() - 1] > obv[obv.len() - 10]);
        let mfi = volume::mfi(&window, 14).last().copied().flatten();
        let vwap = volume::vwap(&window).last().copied();

        Self {
            adx,
            supertrend_bullish,
            obv_rising,
            mfi,
            vwap,
            patterns: patterns::latest_patterns(&window),
        }
    }

    fn render(&self) -> String {
        let mut out = String::from("**INDICATOR SNAPSHOT:**\n");
        if let Some(adx) = self.adx {
            let _ = writeln!(out, "- ADX(14): {:.1}", adx);
        }
        if let Some(bullish) = self.supertrend_bullish {
            let _ = writeln!(
                out,
                "- Supertrend(10, 3): {}",
                if bullish { "bullish" } else { "bearish" }
            );
        }
        if let Some(rising) = self.obv_rising {
            let _ = writeln!(
                out,
                "- OBV: {} over last 10 bars",
                if rising { "rising" } else { "falling" }
            );
        }
        if let Some(mfi) = self.mfi {
            let _ = writeln!(out, "- MFI(14): {:.1}", mfi);
        }
        if let Some(vwap) = self.vwap {
            let _ = writeln!(out, "- VWAP: {:.2}", vwap);
        }
        if self.patterns.is_empty() {
            out.push_str("- Candlestick patterns: none on the last bar\n");
        } else {
            let names: Vec<String> = self
                .patterns
                .iter()
                .map(|(name, marker)| {
                    format!("{} ({})", name, if *marker > 0 { "bullish" } else { "bearish" })
                })
                .collect();
            let _ = writeln!(out, "- Candlestick patterns: {}", names.join(", "));
        }
        out
    }
}

/// Sentiment prompt over the freshest headlines
pub fn sentiment_prompt(symbol: &str, headlines: &[Headline]) -> String {
    let news_text: Vec<String> = headlines
        .iter()
        .take(HEADLINES_FOR_PROMPT)
        .map(|h| format!("- {} ({})", h.title, h.publisher))
        .collect();

    format!(
        "Analyze the following recent news headlines for {} stock and determine the overall sentiment:\n\n\
{}\n\n\
Provide your analysis in this exact format:\n\
SENTIMENT: [bullish/bearish/neutral]\n\
CONFIDENCE: [0-100]\n\
IMPACT: [-20 to +20] (negative for bearish, positive for bullish)\n\
SUMMARY: [2-3 sentence explanation]\n\n\
Focus on:\n\
1. Overall market sentiment (bullish/bearish/neutral)\n\
2. Confidence level (0-100)\n\
3. Expected price impact (-20 to +20 points to adjust signal confidence)\n\
4. Brief summary of key factors",
        symbol,
        news_text.join("\n")
    )
}

/// Full technical-analysis prompt: tail candles as tab-separated rows with
/// ISO dates, fundamentals, sentiment and the indicator snapshot.
pub fn technical_prompt(signal: &Signal) -> String {
    let candles = &signal.tail_candles;
    let num_candles = candles.len();

    let candle_rows: Vec<String> = candles
        .iter()
        .map(|c| {
            format!(
                "{}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{}",
                c.time.format("%Y-%m-%d"),
                c.open_f64(),
                c.high_f64(),
                c.low_f64(),
                c.close_f64(),
                c.volume
            )
        })
        .collect();

    let date_range = match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => format!(
            " from {} to {}",
            first.time.format("%Y-%m-%d"),
            last.time.format("%Y-%m-%d")
        ),
        _ => String::new(),
    };

    let fundamentals_text = signal
        .fundamentals
        .as_ref()
        .map(render_fundamentals)
        .unwrap_or_default();
    let sentiment_text = signal
        .sentiment
        .as_ref()
        .map(render_sentiment)
        .unwrap_or_default();
    let snapshot = IndicatorSnapshot::from_candles(candles).render();

    format!(
        "You are a professional technical analyst. Analyze {symbol} and provide independent trade recommendations.\n\n\
**DATA SCOPE:**\n\
You have EXACTLY {num_candles} candles{date_range}.\n\
When referencing specific events, USE THE EXACT DATES from the data (format: YYYY-MM-DD).\n\n\
**CURRENT PRICE:** {price:.2}\n\n\
**HISTORICAL PRICE DATA ({num_candles} candles, tab-separated: Date\tOpen\tHigh\tLow\tClose\tVolume):**\n\
{rows}\n\n\
{fundamentals}{sentiment}{snapshot}\n\
**Analysis Guidelines:**\n\
Analyze the {num_candles} candles above to identify:\n\
1. Support/resistance from swing highs/lows (reference exact dates)\n\
2. Optimal entry, stop-loss, and target prices\n\
3. Independent technical assessment\n\n\
**IMPORTANT:**\n\
- When mentioning price levels or patterns, cite the EXACT DATE from the data\n\
- Set stop-loss below recent support (specify the date of that swing low)\n\
- Set targets at resistance levels (specify dates of swing highs)\n\
- Consider risk:reward ratio (minimum 1:1.5)\n\
- KEEP REASONING CONCISE: maximum 1200-1500 characters\n\
- USE EXACT DATES (YYYY-MM-DD format) when referencing specific candles or events\n\n\
Provide analysis in this EXACT format:\n\
STRENGTH: [weak/moderate/strong]\n\
PREDICTION: [bullish/bearish/neutral]\n\
TIMEFRAME: [1-3 days/1 week/2 weeks]\n\
CONFIDENCE: [0-100]\n\
KEY_FACTORS: [2-3 key technical factors]\n\
RECOMMENDATION: [buy/hold/avoid]\n\
AI_ENTRY: [price OR 'N/A']\n\
AI_STOP: [price OR 'N/A']\n\
AI_TARGET1: [price OR 'N/A']\n\
AI_TARGET2: [price OR 'None' OR 'N/A']\n\
REASONING: [1) Trend analysis citing specific dates, 2) Support/resistance levels with dates, 3) Volume patterns, 4) Why these entry/stop/target levels, 5) Risk factors]",
        symbol = signal.symbol,
        num_candles = num_candles,
        date_range = date_range,
        price = signal.entry_price,
        rows = candle_rows.join("\n"),
        fundamentals = fundamentals_text,
        sentiment = sentiment_text,
        snapshot = snapshot,
    )
}

fn render_fundamentals(f: &Fundamentals) -> String {
    let fmt_opt = |v: Option<f64>| v.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}", v));
    let roe = f
        .return_on_equity
        .map_or_else(|| "N/A".to_string(), |v| format!("{:.1}%", v * 100.0));
    let mcap = f
        .market_cap_crores()
        .map_or_else(|| "N/A".to_string(), |v| format!("{:.0} Cr", v));
    format!(
        "**FUNDAMENTAL METRICS:**\n\
- P/E Ratio: {}\n\
- P/B Ratio: {}\n\
- ROE: {}\n\
- Debt/Equity: {}\n\
- Market Cap: {}\n\n",
        fmt_opt(f.trailing_pe),
        fmt_opt(f.price_to_book),
        roe,
        fmt_opt(f.debt_to_equity),
        mcap
    )
}

fn render_sentiment(s: &Sentiment) -> String {
    format!(
        "**NEWS SENTIMENT:**\n\
- Sentiment: {} ({}% confidence)\n\
- Summary: {}\n\n",
        s.label, s.confidence, s.summary
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::signal::{Analysis, CategoryReport, SignalType};
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    fn headline(title: &str) -> Headline {
        Headline {
            title: title.to_string(),
            publisher: "Mint".to_string(),
            link: None,
            published: Utc::now(),
        }
    }

    fn tail_candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 10, 1, 10, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                Candle {
                    symbol: "ACME.NS".to_string(),
                    timeframe: Timeframe::OneDay,
                    time: start + Duration::days(i as i64),
                    open: Decimal::from_f64(base).unwrap(),
                    high: Decimal::from_f64(base + 2.0).unwrap(),
                    low: Decimal::from_f64(base - 1.0).unwrap(),
                    close: Decimal::from_f64(base + 1.0).unwrap(),
                    volume: 50_000,
                }
            })
            .collect()
    }

    fn signal() -> Signal {
        let report = CategoryReport::from_conditions(vec![]);
        Signal {
            symbol: "ACME.NS".to_string(),
            generated_at: Utc::now(),
            signal_type: SignalType::Buy,
            confidence: 72.0,
            original_confidence: None,
            sentiment_adjusted: None,
            technical_confidence: 70.0,
            fundamental_score: 4,
            fundamental_adjustment: 2.0,
            entry_price: 130.0,
            stop_loss: 127.4,
            target1: 134.0,
            target2: Some(136.0),
            target3: Some(138.0),
            risk: 2.6,
            reward: 4.0,
            rr_ratio: 1.54,
            analysis: Analysis {
                trend: report.clone(),
                momentum: report.clone(),
                volatility: report,
                technical_confidence: 70.0,
                strong_categories: 2,
            },
            sentiment: None,
            technical_analysis: None,
            tail_candles: tail_candles(30),
            fundamentals: None,
        }
    }

    #[test]
    fn test_sentiment_prompt_limits_headlines() {
        let headlines: Vec<Headline> =
            (0..8).map(|i| headline(&format!("Headline {}", i))).collect();
        let prompt = sentiment_prompt("ACME.NS", &headlines);
        assert!(prompt.contains("Headline 4"));
        assert!(!prompt.contains("Headline 5"));
        assert!(prompt.contains("SENTIMENT:"));
        assert!(prompt.contains("IMPACT:"));
    }

    #[test]
    fn test_technical_prompt_contains_candle_rows() {
        let prompt = technical_prompt(&signal());
        assert!(prompt.contains("EXACTLY 30 candles"));
        // ISO dates with tab-separated OHLCV
        assert!(prompt.contains("2025-10-01\t100.00\t102.00\t99.00\t101.00\t50000"));
        assert!(prompt.contains("from 2025-10-01 to 2025-10-30"));
        assert!(prompt.contains("AI_TARGET2:"));
        assert!(prompt.contains("REASONING:"));
    }

    #[test]
    fn test_technical_prompt_renders_fundamentals_when_present() {
        let mut s = signal();
        let mut f = Fundamentals::empty("ACME.NS");
        f.trailing_pe = Some(18.5);
        f.return_on_equity = Some(0.21);
        s.fundamentals = Some(f);
        let prompt = technical_prompt(&s);
        assert!(prompt.contains("P/E Ratio: 18.50"));
        assert!(prompt.contains("ROE: 21.0%"));
    }

    #[test]
    fn test_technical_prompt_includes_indicator_snapshot() {
        let prompt = technical_prompt(&signal());
        assert!(prompt.contains("INDICATOR SNAPSHOT"));
        assert!(prompt.contains("Supertrend"));
    }

    #[test]
    fn test_snapshot_on_rising_series() {
        let snapshot = IndicatorSnapshot::from_candles(&tail_candles(30));
        assert_eq!(snapshot.supertrend_bullish, Some(true));
        assert_eq!(snapshot.obv_rising, Some(true));
        assert!(snapshot.mfi.is_some());
        assert!(snapshot.adx.is_some());
    }
}
