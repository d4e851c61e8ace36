//! Stateless indicator functions over a candle window.
//!
//! Every function returns a vector aligned with its input; positions where
//! the window is still too short hold `None` instead of an extrapolated
//! value. Numeric conventions follow TA-Lib: EMAs seed with the SMA of the
//! first period, RSI/ATR/ADX use Wilder smoothing.

pub mod momentum;
pub mod patterns;
pub mod trend;
pub mod volatility;
pub mod volume;

use crate::domain::market::candle::Candle;

/// Candle fields unpacked into f64 columns for indicator math
#[derive(Debug, Clone)]
pub struct CandleWindow {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl CandleWindow {
    pub fn from_candles(candles: &[Candle]) -> Self {
        Self {
            open: candles.iter().map(Candle::open_f64).collect(),
            high: candles.iter().map(Candle::high_f64).collect(),
            low: candles.iter().map(Candle::low_f64).collect(),
            close: candles.iter().map(Candle::close_f64).collect(),
            volume: candles.iter().map(|c| c.volume as f64).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

/// Simple moving average, defined from index `period - 1`
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut window_sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(window_sum / period as f64);
    for i in period..values.len() {
        window_sum += values[i] - values[i - period];
        out[i] = Some(window_sum / period as f64);
    }
    out
}

/// SMA over an `Option` series, treating the leading undefined prefix as
/// absent; defined once `period` consecutive values are available.
pub(crate) fn sma_opt(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let Some(start) = values.iter().position(Option::is_some) else {
        return out;
    };
    let defined: Vec<f64> = values[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
    for (i, v) in sma(&defined, period).into_iter().enumerate() {
        out[start + i] = v;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_basic() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&values, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[3], Some(3.0));
        assert_eq!(out[4], Some(4.0));
    }

    #[test]
    fn test_sma_short_window() {
        let values = [1.0, 2.0];
        assert!(sma(&values, 3).iter().all(Option::is_none));
    }

    #[test]
    fn test_sma_opt_skips_undefined_prefix() {
        let values = [None, None, Some(1.0), Some(2.0), Some(3.0)];
        let out = sma_opt(&values, 2);
        assert_eq!(out[2], None);
        assert_eq!(out[3], Some(1.5));
        assert_eq!(out[4], Some(2.5));
    }
}
