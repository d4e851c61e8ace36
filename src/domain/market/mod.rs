pub mod candle;
pub mod fundamentals;
pub mod instrument;
pub mod timeframe;

pub use candle::Candle;
pub use fundamentals::Fundamentals;
pub use instrument::Instrument;
pub use timeframe::{FetchPeriod, Timeframe};
