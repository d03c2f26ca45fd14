//! Kept-frame processing: detect → redact → persist → extract → store →
//! index.
//!
//! Only the window lookup and the change decision run on the capture loop's
//! task, so metadata describes the moment of capture. Everything after
//! it runs on tracked tasks so a slow extractor or embedder never delays the
//! next capture.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::db::{Database, Snapshot};
use crate::embedding::Embedder;
use crate::extraction::{extract_if_scheduled, ExtractionOutcome, TextExtractor};
use crate::metrics::{CaptureMetrics, PipelineMetrics};
use crate::privacy::PrivacyRedactor;
use crate::sensing::{ChangeDetector, Decision, Frame, WindowMetadata, WindowMetadataProvider};
use crate::vector_store::VectorStore;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Everything a pipeline needs, constructed by the caller.
pub struct PipelineComponents {
    pub db: Database,
    pub store: VectorStore,
    pub detector: Arc<ChangeDetector>,
    pub redactor: Arc<PrivacyRedactor>,
    pub extractor: Arc<dyn TextExtractor>,
    pub metadata: Arc<dyn WindowMetadataProvider>,
    /// `None` disables indexing; snapshots are still stored.
    pub embedder: Option<Arc<dyn Embedder>>,
    /// Redacted PNGs are written under this directory; `None` keeps no images.
    pub image_dir: Option<PathBuf>,
    pub metrics: PipelineMetrics,
}

#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub decision: Decision,
    pub snapshot: Option<Snapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeSummary {
    pub snapshots: usize,
    pub embeddings: usize,
    pub reports: usize,
    pub image_files: usize,
}

struct CapturedWindow {
    window: WindowMetadata,
    lookup_ms: u64,
}

pub struct Pipeline {
    db: Database,
    store: VectorStore,
    detector: Arc<ChangeDetector>,
    redactor: Arc<PrivacyRedactor>,
    extractor: Arc<dyn TextExtractor>,
    metadata: Arc<dyn WindowMetadataProvider>,
    embedder: Option<Arc<dyn Embedder>>,
    image_dir: Option<PathBuf>,
    metrics: PipelineMetrics,
    tasks: TaskTracker,
}

impl Pipeline {
    pub fn new(components: PipelineComponents) -> Self {
        Self {
            db: components.db,
            store: components.store,
            detector: components.detector,
            redactor: components.redactor,
            extractor: components.extractor,
            metadata: components.metadata,
            embedder: components.embedder,
            image_dir: components.image_dir,
            metrics: components.metrics,
            tasks: TaskTracker::new(),
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Read the frontmost window, run the change decision in capture order,
    /// and hand kept frames to a background task.
    pub async fn submit(self: &Arc<Self>, frame: Frame) -> Result<Decision> {
        let window = self.window_metadata(frame.display_id).await;
        let (decision, frame) = self.observe(frame).await?;
        if decision.keep {
            let pipeline = Arc::clone(self);
            self.tasks.spawn(async move {
                if let Err(err) = pipeline.store_kept(frame, window, decision).await {
                    log_warn!("failed to store kept frame: {err:#}");
                }
            });
        }
        Ok(decision)
    }

    /// Decide, and for kept frames store the snapshot before returning.
    /// Indexing still happens in the background; see [`Pipeline::flush`].
    pub async fn process_frame(self: &Arc<Self>, frame: Frame) -> Result<FrameOutcome> {
        let window = self.window_metadata(frame.display_id).await;
        let (decision, frame) = self.observe(frame).await?;
        let snapshot = if decision.keep {
            Some(self.store_kept(frame, window, decision).await?)
        } else {
            None
        };
        Ok(FrameOutcome { decision, snapshot })
    }

    /// Wait for every background task started so far.
    pub async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    async fn observe(&self, frame: Frame) -> Result<(Decision, Frame)> {
        let detector = Arc::clone(&self.detector);
        let (decision, frame) = tokio::task::spawn_blocking(move || {
            let decision = detector.observe(&frame);
            (decision, frame)
        })
        .await
        .context("change detection worker join failed")?;

        self.metrics.record_decision(decision.reason, decision.keep).await;
        Ok((decision, frame))
    }

    async fn store_kept(
        self: &Arc<Self>,
        frame: Frame,
        captured: CapturedWindow,
        decision: Decision,
    ) -> Result<Snapshot> {
        let total_start = Instant::now();
        let Frame {
            display_id,
            captured_at,
            image,
        } = frame;
        let CapturedWindow {
            window,
            lookup_ms: metadata_ms,
        } = captured;

        let redact_start = Instant::now();
        let redactor = Arc::clone(&self.redactor);
        let (outcome, image) = tokio::task::spawn_blocking(move || {
            let outcome = redactor.redact(&image);
            (outcome, image)
        })
        .await
        .context("redaction worker join failed")?;
        let redact_ms = redact_start.elapsed().as_millis() as u64;

        if outcome.is_degraded() {
            self.metrics.record_redaction_degraded().await;
        }
        let redacted_regions = outcome.region_count() as u32;
        let image = Arc::new(outcome.into_image(image));

        let id = Uuid::new_v4().to_string();

        let save_start = Instant::now();
        let (image_path, image_bytes) = match self.image_dir.as_deref() {
            Some(dir) => {
                let path = image_path_for(dir, captured_at, &id);
                match save_png(Arc::clone(&image), path.clone()).await {
                    Ok(bytes) => (Some(path.to_string_lossy().into_owned()), Some(bytes)),
                    Err(err) => {
                        log_warn!("failed to write snapshot image {}: {err:#}", path.display());
                        (None, None)
                    }
                }
            }
            None => (None, None),
        };
        let image_save_ms = save_start.elapsed().as_millis() as u64;

        let extract_start = Instant::now();
        let extractor = Arc::clone(&self.extractor);
        let scheduled = decision.force_extract;
        let extraction = tokio::task::spawn_blocking({
            let image = Arc::clone(&image);
            move || extract_if_scheduled(extractor.as_ref(), &image, scheduled)
        })
        .await
        .context("extraction worker join failed")?;
        let extract_ms = extraction
            .ran()
            .then(|| extract_start.elapsed().as_millis() as u64);

        let extract_skipped_reason = match &extraction {
            ExtractionOutcome::NotScheduled => Some("not scheduled".to_string()),
            ExtractionOutcome::Failed { reason } => {
                log_warn!("text extraction failed: {reason}");
                self.metrics.record_extraction_failed().await;
                Some(reason.clone())
            }
            _ => None,
        };

        let snapshot = Snapshot {
            id,
            captured_at,
            display_id,
            image_path,
            extracted_text: extraction.text().to_string(),
            app_name: window.app_name,
            window_title: window.window_title,
            category: window.category,
            ai_note: None,
            redacted_regions,
        };

        let db_start = Instant::now();
        self.db
            .insert_snapshot(&snapshot)
            .await
            .context("failed to persist snapshot")?;
        let db_write_ms = db_start.elapsed().as_millis() as u64;

        if snapshot.has_text() && self.embedder.is_some() {
            let pipeline = Arc::clone(self);
            let snapshot = snapshot.clone();
            self.tasks.spawn(async move {
                pipeline.index_snapshot(&snapshot).await;
            });
        }

        let (cpu_percent, memory_mb) = self.metrics.sample_system_metrics().await;
        let total_ms = total_start.elapsed().as_millis() as u64;
        self.metrics
            .record_capture(CaptureMetrics {
                timestamp: captured_at,
                display_id,
                metadata_ms,
                redact_ms,
                redacted_regions,
                image_save_ms,
                image_bytes,
                extract_ms,
                extract_skipped_reason,
                db_write_ms,
                total_ms,
                cpu_percent,
                memory_mb,
            })
            .await;

        log_debug!(
            "snapshot {} stored in {}ms ({:?}, {} redacted region(s), extract: {:?}ms)",
            snapshot.id,
            total_ms,
            decision.reason,
            redacted_regions,
            extract_ms
        );

        Ok(snapshot)
    }

    /// Frontmost window at the moment the frame is handed over. A failing
    /// provider yields "Unknown" and never fails the capture.
    async fn window_metadata(&self, display_id: u32) -> CapturedWindow {
        let start = Instant::now();
        let provider = Arc::clone(&self.metadata);
        let lookup = tokio::task::spawn_blocking(move || provider.active_window(display_id));
        let window = match lookup.await {
            Ok(Ok(window)) => window,
            Ok(Err(err)) => {
                log_debug!("window metadata unavailable: {err:#}");
                WindowMetadata::unknown()
            }
            Err(err) => {
                log_warn!("window metadata worker join failed: {err}");
                WindowMetadata::unknown()
            }
        };
        CapturedWindow {
            window,
            lookup_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Embed and upsert one snapshot. Failures are logged and counted only;
    /// the snapshot stays stored and [`Pipeline::reindex_missing`] can retry.
    pub async fn index_snapshot(&self, snapshot: &Snapshot) -> bool {
        let Some(embedder) = self.embedder.as_ref() else {
            return false;
        };

        let text = snapshot.embedding_text();
        let result = match embedder.embed(&text).await {
            Ok(vector) => self
                .store
                .upsert(&snapshot.id, &text, &vector)
                .await
                .with_context(|| format!("failed to index snapshot {}", snapshot.id)),
            Err(err) => Err(anyhow::Error::new(err).context("embedding failed")),
        };

        let ok = match result {
            Ok(()) => true,
            Err(err) => {
                log_warn!("snapshot {} not indexed: {err:#}", snapshot.id);
                false
            }
        };
        self.metrics.record_indexing(ok).await;
        ok
    }

    /// Index recent snapshots with text that have no embedding record yet.
    pub async fn reindex_missing(&self, limit: usize) -> Result<usize> {
        if self.embedder.is_none() {
            return Ok(0);
        }

        let candidates = self.db.get_recent_snapshots_with_text(limit).await?;
        let mut indexed = 0;
        for snapshot in candidates {
            if self.store.contains(&snapshot.id).await? {
                continue;
            }
            if self.index_snapshot(&snapshot).await {
                indexed += 1;
            }
        }

        if indexed > 0 {
            log_info!("re-indexed {indexed} snapshot(s)");
        }
        Ok(indexed)
    }

    /// Delete every snapshot, embedding, cached report and image file.
    pub async fn purge_all(&self) -> Result<PurgeSummary> {
        self.flush().await;

        let removed = self.db.delete_all_snapshots().await?;
        let embeddings = self.store.clear().await?;
        let reports = self.db.delete_all_reports().await?;
        let paths: Vec<String> = removed.iter().filter_map(|r| r.image_path.clone()).collect();
        let image_files = remove_files(paths).await;

        let summary = PurgeSummary {
            snapshots: removed.len(),
            embeddings,
            reports,
            image_files,
        };
        log_info!("purged {summary:?}");
        Ok(summary)
    }
}

fn image_path_for(dir: &Path, captured_at: chrono::DateTime<chrono::Utc>, id: &str) -> PathBuf {
    dir.join(captured_at.format("%Y-%m-%d").to_string())
        .join(format!("{id}.png"))
}

async fn save_png(image: Arc<DynamicImage>, path: PathBuf) -> Result<u64> {
    tokio::task::spawn_blocking(move || -> Result<u64> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        image
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("failed to encode {}", path.display()))?;
        let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Ok(bytes)
    })
    .await
    .context("image writer join failed")?
}

/// Best-effort removal; returns how many files were deleted.
pub(crate) async fn remove_files(paths: Vec<String>) -> usize {
    if paths.is_empty() {
        return 0;
    }

    tokio::task::spawn_blocking(move || {
        let mut removed = 0;
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => log_warn!("failed to remove {path}: {err}"),
            }
        }
        removed
    })
    .await
    .unwrap_or(0)
}
