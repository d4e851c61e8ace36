//! Trend indicators: moving averages, MACD, ADX, supertrend.

use super::CandleWindow;

/// Exponential moving average seeded with the SMA of the first `period`
/// values, defined from index `period - 1`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = seed;
    out[period - 1] = Some(seed);
    for i in period..values.len() {
        prev = (values[i] - prev).mul_add(k, prev);
        out[i] = Some(prev);
    }
    out
}

#[derive(Debug, Clone)]
pub struct MacdOutput {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// MACD(fast, slow, signal). With the standard (12, 26, 9) the macd line is
/// defined from index 25 and the signal/histogram from index 33, so a
/// two-bar histogram comparison needs at least 35 candles.
pub fn macd(close: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdOutput {
    let n = close.len();
    let ema_fast = ema(close, fast);
    let ema_slow = ema(close, slow);

    let mut macd_line = vec![None; n];
    for i in 0..n {
        if let (Some(f), Some(s)) = (ema_fast[i], ema_slow[i]) {
            macd_line[i] = Some(f - s);
        }
    }

    // Signal = EMA of the defined macd segment, seeded with its SMA
    let mut signal = vec![None; n];
    if let Some(start) = macd_line.iter().position(Option::is_some) {
        let defined: Vec<f64> = macd_line[start..]
            .iter()
            .map(|v| v.unwrap_or(0.0))
            .collect();
        for (i, v) in ema(&defined, signal_period).into_iter().enumerate() {
            signal[start + i] = v;
        }
    }

    let mut histogram = vec![None; n];
    for i in 0..n {
        if let (Some(m), Some(s)) = (macd_line[i], signal[i]) {
            histogram[i] = Some(m - s);
        }
    }

    MacdOutput {
        macd: macd_line,
        signal,
        histogram,
    }
}

#[derive(Debug, Clone)]
pub struct AdxOutput {
    pub adx: Vec<Option<f64>>,
    pub plus_di: Vec<Option<f64>>,
    pub minus_di: Vec<Option<f64>>,
}

/// Average Directional Index with Wilder-smoothed directional movement.
/// DI lines are defined from index `period`, ADX from `2 * period - 1`.
pub fn adx(window: &CandleWindow, period: usize) -> AdxOutput {
    let n = window.len();
    let mut out = AdxOutput {
        adx: vec![None; n],
        plus_di: vec![None; n],
        minus_di: vec![None; n],
    };
    if period == 0 || n < 2 * period {
        return out;
    }

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    let mut tr = vec![0.0; n];
    for i in 1..n {
        let up = window.high[i] - window.high[i - 1];
        let down = window.low[i - 1] - window.low[i];
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        tr[i] = true_range(window, i);
    }

    // Wilder-smoothed running sums
    let mut sm_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut sm_minus: f64 = minus_dm[1..=period].iter().sum();
    let mut sm_tr: f64 = tr[1..=period].iter().sum();

    let mut dx = vec![None; n];
    for i in period..n {
        if i > period {
            sm_plus = sm_plus - sm_plus / period as f64 + plus_dm[i];
            sm_minus = sm_minus - sm_minus / period as f64 + minus_dm[i];
            sm_tr = sm_tr - sm_tr / period as f64 + tr[i];
        }
        if sm_tr > 0.0 {
            let pdi = 100.0 * sm_plus / sm_tr;
            let mdi = 100.0 * sm_minus / sm_tr;
            out.plus_di[i] = Some(pdi);
            out.minus_di[i] = Some(mdi);
            if pdi + mdi > 0.0 {
                dx[i] = Some(100.0 * (pdi - mdi).abs() / (pdi + mdi));
            }
        }
    }

    // ADX seeds with the mean of the first `period` DX values
    let seed_end = 2 * period - 1;
    let seed_values: Vec<f64> = (period..=seed_end).filter_map(|i| dx[i]).collect();
    if seed_values.len() == period {
        let mut prev = seed_values.iter().sum::<f64>() / period as f64;
        out.adx[seed_end] = Some(prev);
        for i in seed_end + 1..n {
            if let Some(d) = dx[i] {
                prev = (prev * (period as f64 - 1.0) + d) / period as f64;
                out.adx[i] = Some(prev);
            }
        }
    }

    out
}

#[derive(Debug, Clone)]
pub struct SupertrendOutput {
    pub line: Vec<Option<f64>>,
    /// +1 while price rides above the trend line, -1 below
    pub direction: Vec<Option<i8>>,
}

/// ATR-banded supertrend with the usual band carry-forward rules
pub fn supertrend(window: &CandleWindow, period: usize, multiplier: f64) -> SupertrendOutput {
    let n = window.len();
    let mut out = SupertrendOutput {
        line: vec![None; n],
        direction: vec![None; n],
    };
    let atr = super::volatility::atr(window, period);
    let Some(start) = atr.iter().position(Option::is_some) else {
        return out;
    };

    let mut final_upper = f64::NAN;
    let mut final_lower = f64::NAN;
    let mut dir: i8 = 1;
    for i in start..n {
        let mid = (window.high[i] + window.low[i]) / 2.0;
        let a = atr[i].unwrap_or(0.0);
        let basic_upper = multiplier.mul_add(a, mid);
        let basic_lower = mid - multiplier * a;

        if i == start {
            final_upper = basic_upper;
            final_lower = basic_lower;
        } else {
            final_upper = if basic_upper < final_upper || window.close[i - 1] > final_upper {
                basic_upper
            } else {
                final_upper
            };
            final_lower = if basic_lower > final_lower || window.close[i - 1] < final_lower {
                basic_lower
            } else {
                final_lower
            };
            dir = if window.close[i] > final_upper {
                1
            } else if window.close[i] < final_lower {
                -1
            } else {
                dir
            };
        }

        out.direction[i] = Some(dir);
        out.line[i] = Some(if dir == 1 { final_lower } else { final_upper });
    }
    out
}

pub(crate) fn true_range(window: &CandleWindow, i: usize) -> f64 {
    if i == 0 {
        return window.high[0] - window.low[0];
    }
    let hl = window.high[i] - window.low[i];
    let hc = (window.high[i] - window.close[i - 1]).abs();
    let lc = (window.low[i] - window.close[i - 1]).abs();
    hl.max(hc).max(lc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(close: &[f64]) -> CandleWindow {
        CandleWindow {
            open: close.to_vec(),
            high: close.iter().map(|c| c + 1.0).collect(),
            low: close.iter().map(|c| c - 1.0).collect(),
            close: close.to_vec(),
            volume: vec![1000.0; close.len()],
        }
    }

    #[test]
    fn test_ema_seeds_with_sma() {
        let values = [2.0, 4.0, 6.0, 8.0, 10.0];
        let out = ema(&values, 3);
        assert_eq!(out[1], None);
        // Seed = SMA(2, 4, 6) = 4
        assert_eq!(out[2], Some(4.0));
        // k = 0.5: 4 + (8 - 4) * 0.5 = 6
        assert_eq!(out[3], Some(6.0));
        assert_eq!(out[4], Some(8.0));
    }

    #[test]
    fn test_ema_matches_reference() {
        // Closing prices with EMA(5) reference values computed by TA-Lib
        let values = [22.27, 22.19, 22.08, 22.17, 22.18, 22.13, 22.23, 22.43, 22.24, 22.29];
        let out = ema(&values, 5);
        assert!((out[4].unwrap() - 22.178).abs() < 1e-6);
        assert!((out[9].unwrap() - 22.2684198).abs() < 1e-4);
    }

    #[test]
    fn test_macd_defined_offsets() {
        let values: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let out = macd(&values, 12, 26, 9);
        assert!(out.macd[24].is_none());
        assert!(out.macd[25].is_some());
        assert!(out.signal[32].is_none());
        assert!(out.signal[33].is_some());
        assert!(out.histogram[33].is_some());
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let values: Vec<f64> = (0..60).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let out = macd(&values, 12, 26, 9);
        let last = out.macd.last().unwrap().unwrap();
        assert!(last > 0.0, "steady uptrend should have positive MACD");
    }

    #[test]
    fn test_adx_strong_trend() {
        let close: Vec<f64> = (0..60).map(|i| 100.0 + 2.0 * i as f64).collect();
        let out = adx(&window(&close), 14);
        assert!(out.adx[26].is_none());
        assert!(out.adx[27].is_some());
        let last = out.adx.last().unwrap().unwrap();
        assert!(last > 25.0, "monotone rise must register as a strong trend");
    }

    #[test]
    fn test_supertrend_direction_follows_trend() {
        let up: Vec<f64> = (0..40).map(|i| 100.0 + 3.0 * i as f64).collect();
        let out = supertrend(&window(&up), 10, 3.0);
        assert_eq!(*out.direction.last().unwrap(), Some(1));

        let down: Vec<f64> = (0..40).map(|i| 220.0 - 3.0 * i as f64).collect();
        let out = supertrend(&window(&down), 10, 3.0);
        assert_eq!(*out.direction.last().unwrap(), Some(-1));
    }
}
