//! Candlestick pattern recognition.
//!
//! Each detector returns a vector aligned with the window holding a signed
//! marker per bar: +100 for the bullish form, -100 for the bearish form,
//! 0 when the pattern is absent. Multi-bar patterns are reported on their
//! final bar.

use super::CandleWindow;

fn body(w: &CandleWindow, i: usize) -> f64 {
    (w.close[i] - w.open[i]).abs()
}

fn range(w: &CandleWindow, i: usize) -> f64 {
    w.high[i] - w.low[i]
}

fn upper_shadow(w: &CandleWindow, i: usize) -> f64 {
    w.high[i] - w.open[i].max(w.close[i])
}

fn lower_shadow(w: &CandleWindow, i: usize) -> f64 {
    w.open[i].min(w.close[i]) - w.low[i]
}

fn is_bullish(w: &CandleWindow, i: usize) -> bool {
    w.close[i] > w.open[i]
}

fn is_bearish(w: &CandleWindow, i: usize) -> bool {
    w.close[i] < w.open[i]
}

/// Small body, long lower shadow, little to no upper shadow
pub fn hammer(w: &CandleWindow) -> Vec<i32> {
    (0..w.len())
        .map(|i| {
            let b = body(w, i);
            let r = range(w, i);
            if r > 0.0 && b > 0.0 && lower_shadow(w, i) >= 2.0 * b && upper_shadow(w, i) <= 0.1 * r
            {
                100
            } else {
                0
            }
        })
        .collect()
}

/// Mirror of the hammer: long upper shadow, body near the low
pub fn inverted_hammer(w: &CandleWindow) -> Vec<i32> {
    (0..w.len())
        .map(|i| {
            let b = body(w, i);
            let r = range(w, i);
            if r > 0.0 && b > 0.0 && upper_shadow(w, i) >= 2.0 * b && lower_shadow(w, i) <= 0.1 * r
            {
                100
            } else {
                0
            }
        })
        .collect()
}

/// Body no larger than a tenth of the bar's range
pub fn doji(w: &CandleWindow) -> Vec<i32> {
    (0..w.len())
        .map(|i| {
            let r = range(w, i);
            if r > 0.0 && body(w, i) <= 0.1 * r {
                100
            } else {
                0
            }
        })
        .collect()
}

/// Current body fully engulfs the prior body in the opposite direction
pub fn engulfing(w: &CandleWindow) -> Vec<i32> {
    let mut out = vec![0; w.len()];
    for i in 1..w.len() {
        if is_bearish(w, i - 1)
            && is_bullish(w, i)
            && w.open[i] <= w.close[i - 1]
            && w.close[i] >= w.open[i - 1]
        {
            out[i] = 100;
        } else if is_bullish(w, i - 1)
            && is_bearish(w, i)
            && w.open[i] >= w.close[i - 1]
            && w.close[i] <= w.open[i - 1]
        {
            out[i] = -100;
        }
    }
    out
}

/// Long bearish bar, small-bodied pause below it, bullish close back above
/// the midpoint of the first bar
pub fn morning_star(w: &CandleWindow) -> Vec<i32> {
    let mut out = vec![0; w.len()];
    for i in 2..w.len() {
        let first_long_bearish = is_bearish(w, i - 2) && body(w, i - 2) >= 0.6 * range(w, i - 2);
        let star_small = body(w, i - 1) <= 0.3 * body(w, i - 2)
            && w.open[i - 1].max(w.close[i - 1]) <= w.close[i - 2];
        let third_recovers = is_bullish(w, i)
            && w.close[i] > (w.open[i - 2] + w.close[i - 2]) / 2.0;
        if first_long_bearish && star_small && third_recovers {
            out[i] = 100;
        }
    }
    out
}

/// Bearish mirror of the morning star
pub fn evening_star(w: &CandleWindow) -> Vec<i32> {
    let mut out = vec![0; w.len()];
    for i in 2..w.len() {
        let first_long_bullish = is_bullish(w, i - 2) && body(w, i - 2) >= 0.6 * range(w, i - 2);
        let star_small = body(w, i - 1) <= 0.3 * body(w, i - 2)
            && w.open[i - 1].min(w.close[i - 1]) >= w.close[i - 2];
        let third_breaks = is_bearish(w, i)
            && w.close[i] < (w.open[i - 2] + w.close[i - 2]) / 2.0;
        if first_long_bullish && star_small && third_breaks {
            out[i] = -100;
        }
    }
    out
}

/// Three consecutive full-bodied bullish bars, each opening inside the
/// prior body and closing at a new high
pub fn three_white_soldiers(w: &CandleWindow) -> Vec<i32> {
    let mut out = vec![0; w.len()];
    for i in 2..w.len() {
        let all_bullish = (0..3).all(|k| {
            let j = i - k;
            is_bullish(w, j) && body(w, j) >= 0.5 * range(w, j).max(f64::MIN_POSITIVE)
        });
        let stacked = w.close[i] > w.close[i - 1]
            && w.close[i - 1] > w.close[i - 2]
            && w.open[i] > w.open[i - 1]
            && w.open[i] < w.close[i - 1]
            && w.open[i - 1] > w.open[i - 2]
            && w.open[i - 1] < w.close[i - 2];
        if all_bullish && stacked {
            out[i] = 100;
        }
    }
    out
}

/// Bearish mirror of three white soldiers
pub fn three_black_crows(w: &CandleWindow) -> Vec<i32> {
    let mut out = vec![0; w.len()];
    for i in 2..w.len() {
        let all_bearish = (0..3).all(|k| {
            let j = i - k;
            is_bearish(w, j) && body(w, j) >= 0.5 * range(w, j).max(f64::MIN_POSITIVE)
        });
        let stacked = w.close[i] < w.close[i - 1]
            && w.close[i - 1] < w.close[i - 2]
            && w.open[i] < w.open[i - 1]
            && w.open[i] > w.close[i - 1]
            && w.open[i - 1] < w.open[i - 2]
            && w.open[i - 1] > w.close[i - 2];
        if all_bearish && stacked {
            out[i] = -100;
        }
    }
    out
}

/// Non-zero pattern markers on the window's final bar, by name
pub fn latest_patterns(w: &CandleWindow) -> Vec<(&'static str, i32)> {
    if w.is_empty() {
        return Vec::new();
    }
    let last = w.len() - 1;
    let detectors: [(&'static str, fn(&CandleWindow) -> Vec<i32>); 8] = [
        ("hammer", hammer),
        ("inverted_hammer", inverted_hammer),
        ("doji", doji),
        ("engulfing", engulfing),
        ("morning_star", morning_star),
        ("evening_star", evening_star),
        ("three_white_soldiers", three_white_soldiers),
        ("three_black_crows", three_black_crows),
    ];
    detectors
        .iter()
        .filter_map(|(name, f)| {
            let marker = f(w)[last];
            (marker != 0).then_some((*name, marker))
        })
        .collect()
}
