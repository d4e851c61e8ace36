use serde::{Deserialize, Serialize};

/// Where a detected level came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    Support,
    Resistance,
    Pivot,
}

/// A support/resistance price level derived from recent candles.
///
/// Ephemeral: levels are recomputed per request and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrLevel {
    pub price: f64,
    pub kind: LevelKind,
    /// Number of candles whose high or low came within 1% of this price
    pub touches: u32,
    /// Touch count for swing levels; pivot levels get a floor of 2
    pub strength: u32,
}

/// A resistance level validated as a take-profit target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetLevel {
    pub price: f64,
    pub reward: f64,
    pub rr_ratio: f64,
    pub touches: u32,
    /// True when anchored to a detected resistance, false for
    /// risk-multiple fallback targets
    pub anchored: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_round_trips_through_json() {
        let level = SrLevel {
            price: 103.0,
            kind: LevelKind::Resistance,
            touches: 4,
            strength: 4,
        };
        let json = serde_json::to_string(&level).unwrap();
        let back: SrLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(level, back);
    }
}
