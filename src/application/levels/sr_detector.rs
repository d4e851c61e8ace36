//! Swing-high/low and pivot-point level detection.

use super::LevelBook;
use crate::application::indicators::CandleWindow;
use crate::domain::levels::{LevelKind, SrLevel};
use std::collections::HashSet;

const SWING_WINDOW: usize = 10;
const TOUCH_TOLERANCE: f64 = 0.01;
/// Pivot-derived levels carry a strength floor even with a single touch
const PIVOT_STRENGTH: u32 = 2;

/// Classic floor-trader pivot levels from one reference candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotLevels {
    pub pp: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Detects support and resistance from recent candles.
///
/// Swing levels come from a centered rolling max/min over the last
/// `lookback` candles; pivot levels from the most recent candle. Touches
/// are counted across the whole window the detector was built with.
pub struct SrDetector {
    window: CandleWindow,
    lookback: usize,
}

impl SrDetector {
    pub fn new(window: CandleWindow, lookback: usize) -> Self {
        Self { window, lookback }
    }

    pub fn pivot_levels(&self) -> Option<PivotLevels> {
        let n = self.window.len();
        if n == 0 {
            return None;
        }
        let high = self.window.high[n - 1];
        let low = self.window.low[n - 1];
        let close = self.window.close[n - 1];
        let pp = (high + low + close) / 3.0;
        Some(PivotLevels {
            pp,
            r1: 2.0 * pp - low,
            r2: pp + (high - low),
            r3: high + 2.0 * (pp - low),
            s1: 2.0 * pp - high,
            s2: pp - (high - low),
            s3: low - 2.0 * (high - pp),
        })
    }

    /// Builds the queryable level book: swing levels plus pivots, deduped
    /// by 2-decimal rounding, supports descending and resistances ascending.
    pub fn level_book(&self) -> LevelBook {
        let mut book = LevelBook {
            supports: self.swing_levels(false),
            resistances: self.swing_levels(true),
        };

        if let Some(pivots) = self.pivot_levels() {
            let mut seen_r: HashSet<i64> =
                book.resistances.iter().map(|l| round_key(l.price)).collect();
            for price in [pivots.r1, pivots.r2, pivots.r3] {
                if seen_r.insert(round_key(price)) {
                    book.resistances.push(pivot_level(price));
                }
            }
            let mut seen_s: HashSet<i64> =
                book.supports.iter().map(|l| round_key(l.price)).collect();
            for price in [pivots.s1, pivots.s2, pivots.s3] {
                if seen_s.insert(round_key(price)) {
                    book.supports.push(pivot_level(price));
                }
            }
        }

        book.resistances.sort_by(|a, b| {
            a.price
                .total_cmp(&b.price)
                .then(b.touches.cmp(&a.touches))
        });
        book.supports.sort_by(|a, b| {
            b.price
                .total_cmp(&a.price)
                .then(b.touches.cmp(&a.touches))
        });
        book
    }

    /// Local extrema of the last `lookback` candles via a centered rolling
    /// window; only positions with a full window on both sides qualify.
    fn swing_levels(&self, highs: bool) -> Vec<SrLevel> {
        let n = self.window.len();
        let start = n.saturating_sub(self.lookback);
        let series = if highs {
            &self.window.high
        } else {
            &self.window.low
        };

        let half_before = SWING_WINDOW / 2;
        let half_after = SWING_WINDOW - half_before - 1;

        let mut seen = HashSet::new();
        let mut levels = Vec::new();
        for i in start..n {
            if i < start + half_before || i + half_after >= n {
                continue;
            }
            let window = &series[i - half_before..=i + half_after];
            let extreme = if highs {
                window.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            } else {
                window.iter().cloned().fold(f64::INFINITY, f64::min)
            };
            if series[i] != extreme {
                continue;
            }
            let price = series[i];
            if !seen.insert(round_key(price)) {
                continue;
            }
            let touches = self.count_touches(price);
            levels.push(SrLevel {
                price,
                kind: if highs {
                    LevelKind::Resistance
                } else {
                    LevelKind::Support
                },
                touches,
                strength: touches,
            });
        }
        levels
    }

    /// Candles whose high or low falls within the tolerance band of `price`
    fn count_touches(&self, price: f64) -> u32 {
        let lower = price * (1.0 - TOUCH_TOLERANCE);
        let upper = price * (1.0 + TOUCH_TOLERANCE);
        let mut touches = 0;
        for i in 0..self.window.len() {
            let high = self.window.high[i];
            let low = self.window.low[i];
            if (lower..=upper).contains(&high) || (lower..=upper).contains(&low) {
                touches += 1;
            }
        }
        touches
    }
}

fn pivot_level(price: f64) -> SrLevel {
    SrLevel {
        price,
        kind: LevelKind::Pivot,
        touches: 1,
        strength: PIVOT_STRENGTH,
    }
}

fn round_key(price: f64) -> i64 {
    (price * 100.0).round() as i64
}
