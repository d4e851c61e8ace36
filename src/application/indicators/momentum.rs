//! Momentum oscillators: RSI and the slow stochastic.

use super::{CandleWindow, sma_opt};

/// Relative Strength Index with Wilder smoothing, defined from index
/// `period` (so RSI(14) needs at least 15 candles).
pub fn rsi(close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = close.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = close[i] - close[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in period + 1..n {
        let change = close[i] - close[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

#[derive(Debug, Clone)]
pub struct StochasticOutput {
    pub k: Vec<Option<f64>>,
    pub d: Vec<Option<f64>>,
}

/// Slow stochastic: raw %K over `k_period`, smoothed by `slowing`, with %D
/// a further SMA over `d_period`.
pub fn stochastic(
    window: &CandleWindow,
    k_period: usize,
    d_period: usize,
    slowing: usize,
) -> StochasticOutput {
    let n = window.len();
    let mut fast_k = vec![None; n];
    if k_period == 0 || n < k_period {
        return StochasticOutput {
            k: fast_k.clone(),
            d: fast_k,
        };
    }

    for i in k_period - 1..n {
        let lo = window.low[i + 1 - k_period..=i]
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        let hi = window.high[i + 1 - k_period..=i]
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        // Flat range gives no directional information
        fast_k[i] = if hi > lo {
            Some((window.close[i] - lo) / (hi - lo) * 100.0)
        } else {
            Some(50.0)
        };
    }

    let k = sma_opt(&fast_k, slowing);
    let d = sma_opt(&k, d_period);
    StochasticOutput { k, d }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_all_gains_is_100() {
        let close: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&close, 14);
        assert!(out[13].is_none());
        assert_eq!(out[14], Some(100.0));
        assert_eq!(out[19], Some(100.0));
    }

    #[test]
    fn test_rsi_alternating_is_balanced() {
        // +1 / -1 alternation keeps gains and losses equal, RSI near 50
        let close: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let out = rsi(&close, 14);
        let last = out.last().unwrap().unwrap();
        assert!((last - 50.0).abs() < 5.0, "got {}", last);
    }

    #[test]
    fn test_rsi_reference_series() {
        // Wilder's worked example, RSI(14) over his closing series
        let close = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ];
        let out = rsi(&close, 14);
        assert!((out[14].unwrap() - 70.46).abs() < 0.1);
        assert!((out[19].unwrap() - 58.18).abs() < 0.5);
    }

    #[test]
    fn test_stochastic_bounds_and_offsets() {
        let n = 40;
        let window = CandleWindow {
            open: (0..n).map(|i| 100.0 + (i % 7) as f64).collect(),
            high: (0..n).map(|i| 102.0 + (i % 7) as f64).collect(),
            low: (0..n).map(|i| 98.0 + (i % 7) as f64).collect(),
            close: (0..n).map(|i| 100.0 + (i % 7) as f64).collect(),
            volume: vec![1.0; n],
        };
        let out = stochastic(&window, 14, 3, 3);
        // slow %K defined from 13 + 2, %D from 13 + 2 + 2
        assert!(out.k[14].is_none());
        assert!(out.k[15].is_some());
        assert!(out.d[16].is_none());
        assert!(out.d[17].is_some());
        for v in out.k.iter().flatten() {
            assert!((0.0..=100.0).contains(v));
        }
    }

    #[test]
    fn test_stochastic_top_of_range() {
        // Close pinned to the high of a rising range ends near 100
        let n = 30;
        let window = CandleWindow {
            open: (0..n).map(|i| 100.0 + i as f64).collect(),
            high: (0..n).map(|i| 101.0 + i as f64).collect(),
            low: (0..n).map(|i| 99.0 + i as f64).collect(),
            close: (0..n).map(|i| 101.0 + i as f64).collect(),
            volume: vec![1.0; n],
        };
        let out = stochastic(&window, 14, 3, 3);
        assert!(out.k.last().unwrap().unwrap() > 90.0);
    }
}
