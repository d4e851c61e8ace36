use crate::domain::market::timeframe::Timeframe;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single OHLCV bar keyed by (symbol, timeframe, time).
///
/// Candles are immutable once written; the store treats re-insertion of the
/// same key as a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

#[derive(Debug, Error, PartialEq)]
pub enum CandleError {
    #[error("{symbol} {time}: low {low} above high {high}")]
    InvertedRange {
        symbol: String,
        time: DateTime<Utc>,
        low: Decimal,
        high: Decimal,
    },
    #[error("{symbol} {time}: {field} {value} outside [{low}, {high}]")]
    OutOfRange {
        symbol: String,
        time: DateTime<Utc>,
        field: &'static str,
        value: Decimal,
        low: Decimal,
        high: Decimal,
    },
    #[error("{symbol} {time}: negative {field}")]
    Negative {
        symbol: String,
        time: DateTime<Utc>,
        field: &'static str,
    },
}

impl Candle {
    /// Checks the OHLC ordering invariants: low <= open <= high,
    /// low <= close <= high, and non-negative prices/volume.
    pub fn validate(&self) -> Result<(), CandleError> {
        if self.low > self.high {
            return Err(CandleError::InvertedRange {
                symbol: self.symbol.clone(),
                time: self.time,
                low: self.low,
                high: self.high,
            });
        }
        for (field, value) in [("open", self.open), ("close", self.close)] {
            if value < self.low || value > self.high {
                return Err(CandleError::OutOfRange {
                    symbol: self.symbol.clone(),
                    time: self.time,
                    field,
                    value,
                    low: self.low,
                    high: self.high,
                });
            }
        }
        if self.low < Decimal::ZERO {
            return Err(CandleError::Negative {
                symbol: self.symbol.clone(),
                time: self.time,
                field: "low",
            });
        }
        if self.volume < 0 {
            return Err(CandleError::Negative {
                symbol: self.symbol.clone(),
                time: self.time,
                field: "volume",
            });
        }
        Ok(())
    }

    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(0.0)
    }

    pub fn open_f64(&self) -> f64 {
        self.open.to_f64().unwrap_or(0.0)
    }

    pub fn high_f64(&self) -> f64 {
        self.high.to_f64().unwrap_or(0.0)
    }

    pub fn low_f64(&self) -> f64 {
        self.low.to_f64().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            symbol: "RELIANCE.NS".to_string(),
            timeframe: Timeframe::OneDay,
            time: Utc.with_ymd_and_hms(2025, 11, 7, 10, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn test_valid_candle() {
        let c = candle(dec!(100), dec!(105), dec!(99), dec!(103));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let c = candle(dec!(100), dec!(98), dec!(99), dec!(98.5));
        assert!(matches!(
            c.validate(),
            Err(CandleError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_open_outside_range_rejected() {
        let c = candle(dec!(110), dec!(105), dec!(99), dec!(103));
        assert!(matches!(c.validate(), Err(CandleError::OutOfRange { .. })));
    }

    #[test]
    fn test_close_outside_range_rejected() {
        let c = candle(dec!(100), dec!(105), dec!(99), dec!(98));
        assert!(matches!(c.validate(), Err(CandleError::OutOfRange { .. })));
    }

    #[test]
    fn test_negative_volume_rejected() {
        let mut c = candle(dec!(100), dec!(105), dec!(99), dec!(103));
        c.volume = -1;
        assert!(matches!(c.validate(), Err(CandleError::Negative { .. })));
    }
}
