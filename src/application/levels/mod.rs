//! Support/resistance detection and trade-level planning.

pub mod planner;
pub mod sr_detector;

use crate::domain::levels::{SrLevel, TargetLevel};

/// Detected levels for one symbol, ready for querying.
///
/// Supports are held descending by price (nearest-below first), resistances
/// ascending (nearest-above first).
#[derive(Debug, Clone, Default)]
pub struct LevelBook {
    pub supports: Vec<SrLevel>,
    pub resistances: Vec<SrLevel>,
}

impl LevelBook {
    /// Nearest support strictly below `price`, at least `min_distance`
    /// (fractional) away
    pub fn nearest_support(&self, price: f64, min_distance: f64) -> Option<&SrLevel> {
        self.supports
            .iter()
            .find(|s| s.price < price * (1.0 - min_distance))
    }

    /// Nearest resistance strictly above `price`, at least `min_distance`
    /// (fractional) away
    pub fn nearest_resistance(&self, price: f64, min_distance: f64) -> Option<&SrLevel> {
        self.resistances
            .iter()
            .find(|r| r.price > price * (1.0 + min_distance))
    }

    /// Resistance levels above `entry` whose reward clears `min_rr` against
    /// the given stop, ascending in price, at most `count`
    pub fn resistance_targets(
        &self,
        entry: f64,
        stop: f64,
        min_rr: f64,
        count: usize,
    ) -> Vec<TargetLevel> {
        let risk = entry - stop;
        if risk <= 0.0 {
            return Vec::new();
        }
        self.resistances
            .iter()
            .filter(|r| r.price > entry)
            .filter_map(|r| {
                let reward = r.price - entry;
                let rr_ratio = reward / risk;
                (rr_ratio >= min_rr).then(|| TargetLevel {
                    price: r.price,
                    reward,
                    rr_ratio,
                    touches: r.touches,
                    anchored: true,
                })
            })
            .take(count)
            .collect()
    }

    /// All levels combined, ascending by price
    pub fn all_levels(&self) -> Vec<SrLevel> {
        let mut all: Vec<SrLevel> = self
            .supports
            .iter()
            .chain(self.resistances.iter())
            .cloned()
            .collect();
        all.sort_by(|a, b| a.price.total_cmp(&b.price));
        all
    }
}
