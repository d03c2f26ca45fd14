//! Persistent nearest-neighbour index over snapshot text embeddings.
//!
//! Search is a brute-force cosine scan over the most recent `scan_window`
//! records. Older records stay stored but are invisible to search until the
//! window is widened.

mod similarity;

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::db::Database;

pub use similarity::cosine_similarity;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const DEFAULT_SCAN_WINDOW: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub snapshot_id: String,
    pub text: String,
    pub score: f32,
}

/// Cloneable handle; clones share the database worker and the init state.
#[derive(Clone)]
pub struct VectorStore {
    db: Database,
    init: Arc<OnceCell<()>>,
    scan_window: usize,
}

impl VectorStore {
    pub fn new(db: Database, scan_window: usize) -> Self {
        Self {
            db,
            init: Arc::new(OnceCell::new()),
            scan_window: scan_window.max(1),
        }
    }

    /// Create the backing table. Runs once however many callers race on it;
    /// a failed attempt is retried by the next caller.
    pub async fn initialize(&self) -> Result<()> {
        self.init
            .get_or_try_init(|| async { self.db.ensure_embedding_schema().await })
            .await?;
        Ok(())
    }

    /// Replace-by-id: afterwards exactly one record exists for `snapshot_id`.
    pub async fn upsert(&self, snapshot_id: &str, text: &str, vector: &[f32]) -> Result<()> {
        self.initialize().await?;
        self.db.upsert_embedding(snapshot_id, text, vector).await
    }

    /// Up to `k` records by descending cosine similarity to `query`; equal
    /// scores keep insertion order. Records that fail to decode or whose
    /// dimensionality differs from the query are skipped.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.initialize().await?;
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self.db.recent_embeddings(self.scan_window).await?;
        let mut skipped = 0usize;
        let mut hits: Vec<SearchHit> = Vec::with_capacity(rows.len());

        for row in rows {
            let record = match row.decode() {
                Ok(record) => record,
                Err(err) => {
                    log_warn!("skipping undecodable embedding record: {err:#}");
                    skipped += 1;
                    continue;
                }
            };

            if record.vector.len() != query.len() {
                skipped += 1;
                continue;
            }

            let score = cosine_similarity(query, &record.vector);
            if !score.is_finite() {
                skipped += 1;
                continue;
            }

            hits.push(SearchHit {
                snapshot_id: record.snapshot_id,
                text: record.text,
                score,
            });
        }

        if skipped > 0 {
            log_warn!("{skipped} embedding record(s) excluded from search");
        }

        // Rows arrive in insertion order and the sort is stable.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    pub async fn count(&self) -> Result<u64> {
        self.initialize().await?;
        self.db.count_embeddings().await
    }

    pub async fn contains(&self, snapshot_id: &str) -> Result<bool> {
        self.initialize().await?;
        self.db.has_embedding(snapshot_id).await
    }

    pub async fn delete(&self, snapshot_ids: &[String]) -> Result<usize> {
        if snapshot_ids.is_empty() {
            return Ok(0);
        }
        self.initialize().await?;
        self.db.delete_embeddings(snapshot_ids).await
    }

    pub async fn clear(&self) -> Result<usize> {
        self.initialize().await?;
        self.db.delete_all_embeddings().await
    }
}
