pub mod check;
pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod error;
mod persist;
pub mod report;

pub use check::{CheckOptions, CheckOutcome, CheckProgressCallback, execute_check};
pub use checkpoint::{CheckpointState, CheckpointStore};
pub use classify::{ClassificationPolicy, classify};
pub use config::CheckConfig;
pub use error::{CheckError, ConfigError, PersistenceError};
pub use report::{CategoryCounts, CorpusSummary, ReportFormat};
