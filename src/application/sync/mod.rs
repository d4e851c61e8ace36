//! Candle and fundamentals synchronisation against the market-data vendor.

pub mod fundamentals;
pub mod scheduler;

pub use scheduler::{SyncBatchReport, SyncMode, SyncScheduler, SyncTask, TaskReport, TaskStatus};
