use serde::{Deserialize, Serialize};

/// A tradable NSE instrument known to the pipeline.
///
/// Instruments are created by bootstrap tooling and never deleted; retiring
/// a symbol clears `is_active` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub is_index_50: bool,
    pub is_index_100: bool,
    pub is_active: bool,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            sector: None,
            industry: None,
            is_index_50: false,
            is_index_100: true,
            is_active: true,
        }
    }
}
