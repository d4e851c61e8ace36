//! Volume indicators: OBV, MFI and VWAP.

use super::CandleWindow;

/// On-Balance Volume. Defined for the whole window; the first value is the
/// first bar's volume, matching the usual reference implementation.
pub fn obv(window: &CandleWindow) -> Vec<f64> {
    let n = window.len();
    let mut out = vec![0.0; n];
    if n == 0 {
        return out;
    }
    out[0] = window.volume[0];
    for i in 1..n {
        out[i] = if window.close[i] > window.close[i - 1] {
            out[i - 1] + window.volume[i]
        } else if window.close[i] < window.close[i - 1] {
            out[i - 1] - window.volume[i]
        } else {
            out[i - 1]
        };
    }
    out
}

/// Money Flow Index over typical price, defined from index `period`
pub fn mfi(window: &CandleWindow, period: usize) -> Vec<Option<f64>> {
    let n = window.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let typical: Vec<f64> = (0..n)
        .map(|i| (window.high[i] + window.low[i] + window.close[i]) / 3.0)
        .collect();
    let mut pos_flow = vec![0.0; n];
    let mut neg_flow = vec![0.0; n];
    for i in 1..n {
        let raw = typical[i] * window.volume[i];
        if typical[i] > typical[i - 1] {
            pos_flow[i] = raw;
        } else if typical[i] < typical[i - 1] {
            neg_flow[i] = raw;
        }
    }

    for i in period..n {
        let pos: f64 = pos_flow[i + 1 - period..=i].iter().sum();
        let neg: f64 = neg_flow[i + 1 - period..=i].iter().sum();
        out[i] = Some(if neg == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + pos / neg)
        });
    }
    out
}

/// Volume-weighted average price accumulated across the window
pub fn vwap(window: &CandleWindow) -> Vec<f64> {
    let n = window.len();
    let mut out = vec![0.0; n];
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;
    for i in 0..n {
        let typical = (window.high[i] + window.low[i] + window.close[i]) / 3.0;
        cum_pv += typical * window.volume[i];
        cum_vol += window.volume[i];
        out[i] = if cum_vol > 0.0 { cum_pv / cum_vol } else { typical };
    }
    out
}
