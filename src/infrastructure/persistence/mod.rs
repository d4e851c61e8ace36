pub mod candle_repository;
pub mod database;
pub mod fundamentals_repository;
pub mod instrument_repository;
pub mod subscriber_directory;

pub use candle_repository::SqliteCandleRepository;
pub use database::Database;
pub use fundamentals_repository::SqliteFundamentalsRepository;
pub use instrument_repository::SqliteInstrumentRepository;
pub use subscriber_directory::SqliteSubscriberDirectory;
