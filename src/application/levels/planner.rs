//! Stop-loss and take-profit planning anchored on detected S/R levels.

use super::LevelBook;
use crate::domain::errors::PipelineError;
use crate::domain::levels::TargetLevel;
use tracing::{debug, warn};

/// Stop placed 1% under the anchoring support
const SUPPORT_STOP_DISCOUNT: f64 = 0.99;
/// Supports closer than this fraction of entry are ignored for stops
const STOP_MIN_DISTANCE: f64 = 0.005;
/// Acceptable risk band for a support-anchored stop
const RISK_PCT_RANGE: (f64, f64) = (0.005, 0.05);
/// Risk multiples used when resistance anchors run out
const FALLBACK_MULTIPLIERS: [f64; 5] = [1.5, 2.0, 2.5, 3.0, 3.5];
/// An anchored target within this R:R distance covers a fallback multiplier
const MULTIPLIER_COVER_TOLERANCE: f64 = 0.25;

pub const DEFAULT_MIN_RR: f64 = 1.5;

/// Planned trade levels: a stop below entry and three ascending targets
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLevels {
    pub stop_loss: f64,
    pub targets: Vec<TargetLevel>,
}

/// Derives stop-loss and targets for a long entry.
///
/// Stop selection tries the nearest support first and falls back to the
/// tightest of three protective levels (EMA8 discount, one ATR, 2% fixed).
/// Targets prefer resistance anchors with R:R >= `min_rr`, padded with risk
/// multiples when fewer than three anchors qualify.
pub struct LevelPlanner {
    min_rr: f64,
}

impl Default for LevelPlanner {
    fn default() -> Self {
        Self {
            min_rr: DEFAULT_MIN_RR,
        }
    }
}

impl LevelPlanner {
    pub fn new(min_rr: f64) -> Self {
        Self { min_rr }
    }

    pub fn plan(
        &self,
        book: &LevelBook,
        symbol: &str,
        entry: f64,
        ema8: f64,
        atr: f64,
    ) -> Result<TradeLevels, PipelineError> {
        let stop_loss = round2(self.select_stop(book, symbol, entry, ema8, atr));
        if stop_loss >= entry {
            return Err(PipelineError::InvariantViolation(format!(
                "{}: stop {:.2} not below entry {:.2}",
                symbol, stop_loss, entry
            )));
        }

        let risk = entry - stop_loss;
        let mut targets = book.resistance_targets(entry, stop_loss, self.min_rr, 3);

        if targets.len() < 3 {
            if !targets.is_empty() {
                debug!(
                    "{}: only {} anchored targets, padding with risk multiples",
                    symbol,
                    targets.len()
                );
            }
            for mult in FALLBACK_MULTIPLIERS {
                if targets.len() >= 3 {
                    break;
                }
                let covered = targets
                    .iter()
                    .any(|t| (t.rr_ratio - mult).abs() < MULTIPLIER_COVER_TOLERANCE);
                if covered {
                    continue;
                }
                targets.push(TargetLevel {
                    price: mult.mul_add(risk, entry),
                    reward: mult * risk,
                    rr_ratio: mult,
                    touches: 0,
                    anchored: false,
                });
            }
            targets.sort_by(|a, b| a.price.total_cmp(&b.price));
            targets.truncate(3);
        }

        for target in &mut targets {
            target.price = round2(target.price);
            target.reward = round2(target.price - entry);
        }

        let levels = TradeLevels { stop_loss, targets };
        self.check_invariants(symbol, entry, &levels)?;
        Ok(levels)
    }

    fn select_stop(&self, book: &LevelBook, symbol: &str, entry: f64, ema8: f64, atr: f64) -> f64 {
        if let Some(support) = book.nearest_support(entry, STOP_MIN_DISTANCE) {
            let candidate = support.price * SUPPORT_STOP_DISCOUNT;
            let risk_pct = (entry - candidate) / entry;
            if (RISK_PCT_RANGE.0..=RISK_PCT_RANGE.1).contains(&risk_pct) {
                debug!(
                    "{}: S/R stop {:.2} below support {:.2} ({:.1}% risk)",
                    symbol,
                    candidate,
                    support.price,
                    risk_pct * 100.0
                );
                return candidate;
            }
            warn!(
                "{}: S/R stop risk {:.1}% outside bounds, using fallback",
                symbol,
                risk_pct * 100.0
            );
        }

        // Tightest of the three protective levels
        let sl_ema = ema8 * 0.997;
        let sl_atr = entry - atr;
        let sl_fixed = entry * 0.98;
        sl_ema.max(sl_atr).max(sl_fixed)
    }

    fn check_invariants(
        &self,
        symbol: &str,
        entry: f64,
        levels: &TradeLevels,
    ) -> Result<(), PipelineError> {
        let Some(first) = levels.targets.first() else {
            return Err(PipelineError::InvariantViolation(format!(
                "{}: planner produced no targets",
                symbol
            )));
        };
        if first.price <= entry {
            return Err(PipelineError::InvariantViolation(format!(
                "{}: target1 {:.2} not above entry {:.2}",
                symbol, first.price, entry
            )));
        }
        for pair in levels.targets.windows(2) {
            if pair[1].price <= pair[0].price {
                return Err(PipelineError::InvariantViolation(format!(
                    "{}: targets not strictly ascending ({:.2} -> {:.2})",
                    symbol, pair[0].price, pair[1].price
                )));
            }
        }
        Ok(())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
