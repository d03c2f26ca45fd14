//! Age-based cleanup of snapshot images and, optionally, rows.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::pipeline::remove_files;
use crate::settings::RetentionSettings;
use crate::vector_store::VectorStore;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub cleared_paths: usize,
    pub deleted_rows: usize,
    pub deleted_embeddings: usize,
    pub removed_files: usize,
}

pub struct RetentionSweeper {
    db: Database,
    store: VectorStore,
    settings: RetentionSettings,
}

impl RetentionSweeper {
    pub fn new(db: Database, store: VectorStore, settings: RetentionSettings) -> Self {
        Self { db, store, settings }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.settings.retention_days))
    }

    /// Remove image files of snapshots older than the retention window and
    /// clear their paths. With `delete_rows`, the rows and their embedding
    /// records go too; embedding cleanup is best-effort.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let cutoff = self.cutoff(now);
        let mut summary = SweepSummary::default();

        let cleared = self.db.clear_image_paths_before(cutoff).await?;
        summary.cleared_paths = cleared.len();
        let mut paths: Vec<String> = cleared.into_iter().filter_map(|r| r.image_path).collect();

        if self.settings.delete_rows {
            let removed = self.db.delete_snapshots_before(cutoff).await?;
            summary.deleted_rows = removed.len();

            let ids: Vec<String> = removed.iter().map(|r| r.id.clone()).collect();
            paths.extend(removed.into_iter().filter_map(|r| r.image_path));

            match self.store.delete(&ids).await {
                Ok(deleted) => summary.deleted_embeddings = deleted,
                Err(err) => log_warn!("failed to delete embeddings of expired snapshots: {err:#}"),
            }
        }

        summary.removed_files = remove_files(paths).await;

        if summary != SweepSummary::default() {
            log_info!("retention sweep before {cutoff}: {summary:?}");
        }
        Ok(summary)
    }
}
