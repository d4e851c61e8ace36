//! Tolerant line-oriented parsers for LLM responses.
//!
//! The response schema is a set of `FIELD: value` lines. Parsing accepts
//! any field order, multi-line REASONING before or after other fields, and
//! currency/comma noise in prices. Fields that fail to parse keep their
//! documented defaults instead of failing the whole response.

use crate::domain::signal::{
    Prediction, Recommendation, Sentiment, SentimentLabel, TechnicalAnalysis,
};

/// Parses the sentiment response: SENTIMENT / CONFIDENCE / IMPACT / SUMMARY
pub fn parse_sentiment(text: &str) -> Sentiment {
    let mut result = Sentiment::neutral("");

    for line in text.lines() {
        let line = line.trim();
        if let Some(value) = field(line, "SENTIMENT:") {
            result.label = match value.to_lowercase().as_str() {
                "bullish" => SentimentLabel::Bullish,
                "bearish" => SentimentLabel::Bearish,
                _ => SentimentLabel::Neutral,
            };
        } else if let Some(value) = field(line, "CONFIDENCE:") {
            if let Ok(confidence) = strip_noise(value).parse::<i64>() {
                result.confidence = confidence.clamp(0, 100) as u8;
            }
        } else if let Some(value) = field(line, "IMPACT:") {
            if let Ok(impact) = strip_noise(value).parse::<i64>() {
                result.impact = impact.clamp(-20, 20) as i32;
            }
        } else if let Some(value) = field(line, "SUMMARY:") {
            result.summary = value.to_string();
        }
    }
    result
}

/// Parses the technical-analysis response. REASONING captures every
/// following line until another known field starts.
pub fn parse_technical(text: &str) -> TechnicalAnalysis {
    const FIELDS: [&str; 10] = [
        "STRENGTH:",
        "PREDICTION:",
        "TIMEFRAME:",
        "CONFIDENCE:",
        "KEY_FACTORS:",
        "RECOMMENDATION:",
        "AI_ENTRY:",
        "AI_STOP:",
        "AI_TARGET1:",
        "AI_TARGET2:",
    ];

    let mut result = TechnicalAnalysis::default();
    let mut in_reasoning = false;
    let mut reasoning_lines: Vec<String> = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            if in_reasoning {
                reasoning_lines.push(String::new());
            }
            continue;
        }

        let upper = line.to_uppercase();
        if in_reasoning && FIELDS.iter().any(|f| upper.starts_with(f)) {
            in_reasoning = false;
        }

        if let Some(value) = field(line, "STRENGTH:") {
            result.strength = value.to_lowercase();
        } else if let Some(value) = field(line, "PREDICTION:") {
            result.prediction = match value.to_lowercase().as_str() {
                "bullish" => Prediction::Bullish,
                "bearish" => Prediction::Bearish,
                _ => Prediction::Neutral,
            };
        } else if let Some(value) = field(line, "TIMEFRAME:") {
            result.timeframe = value.to_string();
        } else if let Some(value) = field(line, "CONFIDENCE:") {
            if let Ok(confidence) = strip_noise(value).parse::<i64>() {
                result.confidence = confidence.clamp(0, 100) as u8;
            }
        } else if let Some(value) = field(line, "KEY_FACTORS:") {
            result.key_factors = value
                .split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
        } else if let Some(value) = field(line, "RECOMMENDATION:") {
            result.recommendation = match value.to_lowercase().as_str() {
                "buy" => Recommendation::Buy,
                "avoid" => Recommendation::Avoid,
                _ => Recommendation::Hold,
            };
        } else if let Some(value) = field(line, "AI_ENTRY:") {
            result.ai_entry = parse_price(value);
        } else if let Some(value) = field(line, "AI_STOP:") {
            result.ai_stop = parse_price(value);
        } else if let Some(value) = field(line, "AI_TARGET1:") {
            result.ai_target1 = parse_price(value);
        } else if let Some(value) = field(line, "AI_TARGET2:") {
            result.ai_target2 = parse_price(value);
        } else if let Some(value) = field(line, "REASONING:") {
            in_reasoning = true;
            if !value.is_empty() {
                reasoning_lines.push(value.to_string());
            }
        } else if in_reasoning {
            reasoning_lines.push(line.to_string());
        }
    }

    result.reasoning = reasoning_lines.join("\n").trim().to_string();
    result
}

/// Case-insensitive `PREFIX: value` match
fn field<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let upper = line.to_uppercase();
    upper
        .starts_with(prefix)
        .then(|| line[prefix.len()..].trim())
}

/// Prices arrive with currency signs and separators; `N/A` and `None`
/// deliberately yield no level.
fn parse_price(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let lowered = value.to_lowercase();
    if lowered.contains("n/a") || lowered.contains("none") {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn strip_noise(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '+')
        .collect::<String>()
        .trim_start_matches('+')
        .to_string()
}
