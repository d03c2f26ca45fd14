use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored embedding, keyed by the owning snapshot's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRecord {
    pub snapshot_id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub inserted_at: DateTime<Utc>,
    /// Monotonic insertion sequence; breaks score ties.
    pub seq: i64,
}
