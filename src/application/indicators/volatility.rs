//! Volatility indicators: ATR and Bollinger Bands.

use super::{CandleWindow, sma};
use crate::application::indicators::trend::true_range;

/// Average True Range with Wilder smoothing, seeded with the mean of the
/// first `period` true ranges; defined from index `period`.
pub fn atr(window: &CandleWindow, period: usize) -> Vec<Option<f64>> {
    let n = window.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let tr: Vec<f64> = (0..n).map(|i| true_range(window, i)).collect();
    let mut prev = tr[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = Some(prev);
    for i in period + 1..n {
        prev = (prev * (period as f64 - 1.0) + tr[i]) / period as f64;
        out[i] = Some(prev);
    }
    out
}

#[derive(Debug, Clone)]
pub struct BollingerOutput {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
    pub width: Vec<Option<f64>>,
    /// Position of the close inside the band, 0 at the lower band and 100
    /// at the upper
    pub percent_b: Vec<Option<f64>>,
}

/// Bollinger Bands over an SMA with population standard deviation
pub fn bollinger(close: &[f64], period: usize, std_mult: f64) -> BollingerOutput {
    let n = close.len();
    let middle = sma(close, period);
    let mut out = BollingerOutput {
        upper: vec![None; n],
        middle: middle.clone(),
        lower: vec![None; n],
        width: vec![None; n],
        percent_b: vec![None; n],
    };

    for i in 0..n {
        let Some(mid) = middle[i] else { continue };
        let slice = &close[i + 1 - period..=i];
        let variance = slice.iter().map(|v| (v - mid).powi(2)).sum::<f64>() / period as f64;
        let dev = variance.sqrt() * std_mult;
        let upper = mid + dev;
        let lower = mid - dev;
        out.upper[i] = Some(upper);
        out.lower[i] = Some(lower);
        out.width[i] = Some(upper - lower);
        if upper > lower {
            out.percent_b[i] = Some((close[i] - lower) / (upper - lower) * 100.0);
        }
    }
    out
}
