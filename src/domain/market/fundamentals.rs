use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-symbol company fundamentals.
///
/// A typed subset of the vendor snapshot plus the opaque raw payload.
/// Typed fields stay `None` when the vendor omits them; `None` is distinct
/// from zero everywhere these values are scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub symbol: String,
    pub current_price: Option<f64>,
    /// Market capitalisation in rupees as reported by the vendor
    pub market_cap: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub profit_margins: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub beta: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    /// Full vendor payload, stored untouched
    pub raw_data: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl Fundamentals {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            current_price: None,
            market_cap: None,
            trailing_pe: None,
            price_to_book: None,
            return_on_equity: None,
            debt_to_equity: None,
            dividend_yield: None,
            profit_margins: None,
            revenue_growth: None,
            earnings_growth: None,
            beta: None,
            sector: None,
            industry: None,
            raw_data: serde_json::Value::Null,
            updated_at: Utc::now(),
        }
    }

    /// Market capitalisation converted to crores (1 Cr = 1e7 rupees)
    pub fn market_cap_crores(&self) -> Option<f64> {
        self.market_cap.map(|v| v / 1e7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_cap_crores() {
        let mut f = Fundamentals::empty("RELIANCE.NS");
        f.market_cap = Some(80_000.0 * 1e7);
        assert_eq!(f.market_cap_crores(), Some(80_000.0));
    }

    #[test]
    fn test_empty_has_no_typed_fields() {
        let f = Fundamentals::empty("TCS.NS");
        assert!(f.trailing_pe.is_none());
        assert!(f.market_cap_crores().is_none());
    }
}
