pub mod embedding_record;
pub mod report;
pub mod snapshot;

pub use embedding_record::EmbeddingRecord;
pub use report::{AggregateReport, AppUsage};
pub use snapshot::{Snapshot, UNKNOWN_APP};
