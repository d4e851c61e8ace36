//! Signal-generation strategies.
//!
//! The composite scored strategy is the only generator: it weighs trend,
//! momentum and volatility conditions and adjusts the result with a bounded
//! fundamental score instead of filtering symbols out.

pub mod scored;

pub use scored::ScoredStrategy;
