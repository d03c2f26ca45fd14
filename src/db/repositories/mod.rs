pub mod embeddings;
pub mod reports;
pub mod snapshots;

pub use embeddings::EmbeddingRow;
pub use snapshots::RemovedSnapshot;
