use thiserror::Error;

/// Classification tags shared by every component boundary.
///
/// Per-task and per-symbol results carry one of these so callers can
/// pattern-match on the kind without string inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    RateLimited,
    NotFound,
    Timeout,
    Network,
    Malformed,
    InsufficientData,
    NoSignal,
    Cancelled,
    InvariantViolation,
    DeliveryFailed,
    Store,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Network => "Network",
            ErrorKind::Malformed => "Malformed",
            ErrorKind::InsufficientData => "InsufficientData",
            ErrorKind::NoSignal => "NoSignal",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::InvariantViolation => "InvariantViolation",
            ErrorKind::DeliveryFailed => "DeliveryFailed",
            ErrorKind::Store => "Store",
            ErrorKind::Other => "Other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced by the market-data vendor and other external services.
///
/// Raw vendor text never escapes this type; callers branch on the variant.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("rate limited by vendor; rerun with fewer workers")]
    RateLimited,

    #[error("symbol not known to vendor: {symbol}")]
    NotFound { symbol: String },

    #[error("vendor request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("network failure talking to vendor: {reason}")]
    Network { reason: String },

    #[error("malformed vendor response: {reason}")]
    Malformed { reason: String },

    #[error("vendor error: {0}")]
    Other(String),
}

impl VendorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VendorError::RateLimited => ErrorKind::RateLimited,
            VendorError::NotFound { .. } => ErrorKind::NotFound,
            VendorError::Timeout { .. } => ErrorKind::Timeout,
            VendorError::Network { .. } => ErrorKind::Network,
            VendorError::Malformed { .. } => ErrorKind::Malformed,
            VendorError::Other(_) => ErrorKind::Other,
        }
    }
}

/// Errors produced while building a signal for one symbol.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("insufficient data: {have} candles (need >= {need})")]
    InsufficientData { have: usize, need: usize },

    #[error("batch cancelled")]
    Cancelled,

    #[error("another build is already in flight for {symbol}")]
    Busy { symbol: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error("store failure: {0}")]
    Store(#[source] anyhow::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InsufficientData { .. } => ErrorKind::InsufficientData,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::Busy { .. } => ErrorKind::Other,
            PipelineError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            PipelineError::Vendor(e) => e.kind(),
            PipelineError::Store(_) => ErrorKind::Store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_error_kinds() {
        assert_eq!(VendorError::RateLimited.kind(), ErrorKind::RateLimited);
        assert_eq!(
            VendorError::NotFound {
                symbol: "BOGUS.NS".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            VendorError::Timeout { duration_ms: 15000 }.kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn test_vendor_error_formatting_has_no_raw_payload() {
        let msg = VendorError::RateLimited.to_string();
        assert!(msg.contains("fewer workers"));
    }

    #[test]
    fn test_pipeline_error_kind_passthrough() {
        let err = PipelineError::Vendor(VendorError::RateLimited);
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let err = PipelineError::InsufficientData { have: 12, need: 50 };
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert!(err.to_string().contains("12"));
    }
}
