mod connection;
pub mod helpers;
mod migrations;
pub mod models;
pub mod repositories;

pub use connection::Database;
pub use models::{AggregateReport, AppUsage, EmbeddingRecord, Snapshot, UNKNOWN_APP};
pub use repositories::{EmbeddingRow, RemovedSnapshot};
