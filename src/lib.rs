pub mod db;
pub mod embedding;
pub mod extraction;
pub mod metrics;
pub mod pipeline;
pub mod privacy;
pub mod rag;
pub mod retention;
pub mod sensing;
pub mod settings;
pub mod stats;
pub mod utils;
pub mod vector_store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::Mutex;

use db::{AggregateReport, Database};
use embedding::{create_embedder, Embedder};
use extraction::DetectorTextExtractor;
use metrics::{MetricsSnapshot, PipelineMetrics};
use pipeline::{Pipeline, PipelineComponents, PurgeSummary};
use privacy::{PrivacyRedactor, TextDetector};
use rag::{AnswerError, OllamaGenerator, RetrievalOrchestrator, TextGenerator};
use retention::{RetentionSweeper, SweepSummary};
use sensing::{
    CaptureController, ChangeDetector, DetectorConfig, FrameSource, WindowMetadataProvider,
};
use settings::{Settings, SettingsStore};
use stats::{AppClassifier, StatsAggregator};
use vector_store::VectorStore;

pub use utils::init_logging;

const DB_FILE: &str = "glimpse.sqlite3";
const SETTINGS_FILE: &str = "settings.json";
const SNAPSHOT_DIR: &str = "snapshots";

/// Platform capabilities supplied by the host application.
pub struct Platform {
    pub text_detector: Arc<dyn TextDetector>,
    pub window_metadata: Arc<dyn WindowMetadataProvider>,
    /// Overrides the Ollama generator built from settings.
    pub generator: Option<Arc<dyn TextGenerator>>,
    /// Overrides the embedder built from settings.
    pub embedder: Option<Arc<dyn Embedder>>,
}

/// Application state: every component, wired once and shared by handle.
pub struct Glimpse {
    data_dir: PathBuf,
    settings: SettingsStore,
    db: Database,
    store: VectorStore,
    pipeline: Arc<Pipeline>,
    stats: StatsAggregator,
    rag: RetrievalOrchestrator,
    retention: RetentionSweeper,
    capture: Mutex<CaptureController>,
}

impl Glimpse {
    pub async fn open(data_dir: impl AsRef<Path>, platform: Platform) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
        let current: Settings = settings.current();

        let db = Database::new(data_dir.join(DB_FILE))?;
        let store = VectorStore::new(db.clone(), current.retrieval.scan_window);
        store
            .initialize()
            .await
            .context("failed to initialize vector store")?;

        let embedder = match platform.embedder {
            Some(embedder) => Some(embedder),
            None => match create_embedder(&current.embedding) {
                Ok(embedder) => Some(embedder),
                Err(err) => {
                    warn!("embedder unavailable, semantic recall disabled: {err}");
                    None
                }
            },
        };

        let generator = platform.generator.or_else(|| {
            let model = current.retrieval.generation_model.trim();
            (!model.is_empty()).then(|| {
                Arc::new(OllamaGenerator::new(&current.embedding.endpoint, model))
                    as Arc<dyn TextGenerator>
            })
        });

        let redactor = if current.privacy.enabled {
            PrivacyRedactor::new(Arc::clone(&platform.text_detector), current.privacy.margin_px)
        } else {
            warn!("privacy redaction is disabled; snapshots are stored unredacted");
            PrivacyRedactor::disabled(Arc::clone(&platform.text_detector))
        };

        let pipeline = Arc::new(Pipeline::new(PipelineComponents {
            db: db.clone(),
            store: store.clone(),
            detector: Arc::new(ChangeDetector::new(DetectorConfig::from(&current.capture))),
            redactor: Arc::new(redactor),
            extractor: Arc::new(DetectorTextExtractor::new(platform.text_detector)),
            metadata: platform.window_metadata,
            embedder: embedder.clone(),
            image_dir: Some(data_dir.join(SNAPSHOT_DIR)),
            metrics: PipelineMetrics::new(),
        }));

        let stats = StatsAggregator::new(
            db.clone(),
            current.stats.clone(),
            Arc::new(AppClassifier::new()),
        );
        let rag = RetrievalOrchestrator::new(
            db.clone(),
            stats.clone(),
            store.clone(),
            embedder,
            generator,
            current.retrieval.clone(),
        );
        let retention = RetentionSweeper::new(db.clone(), store.clone(), current.retention.clone());

        info!("Glimpse ready at {}", data_dir.display());

        Ok(Self {
            data_dir,
            settings,
            db,
            store,
            pipeline,
            stats,
            rag,
            retention,
            capture: Mutex::new(CaptureController::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn vector_store(&self) -> &VectorStore {
        &self.store
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Start one capture loop per source. Capture settings, including the
    /// change detector's thresholds, are re-read on every start.
    pub async fn start_capture(&self, sources: Vec<Arc<dyn FrameSource>>) -> Result<()> {
        let settings = self.settings.current();
        let mut capture = self.capture.lock().await;
        if !capture.is_running() {
            self.pipeline
                .detector()
                .reconfigure(DetectorConfig::from(&settings.capture));
        }
        capture.start(sources, Arc::clone(&self.pipeline), &settings.capture)
    }

    pub async fn drain_capture(&self) {
        self.capture.lock().await.drain();
    }

    pub async fn stop_capture(&self) -> Result<()> {
        self.capture.lock().await.stop().await
    }

    pub async fn answer(&self, query: &str) -> Result<String, AnswerError> {
        self.rag.answer(query, Utc::now()).await
    }

    pub async fn report(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<AggregateReport> {
        self.stats.report_and_cache(period_start, period_end).await
    }

    pub async fn reindex_missing(&self) -> Result<usize> {
        let window = self.settings.current().retrieval.scan_window;
        self.pipeline.reindex_missing(window).await
    }

    pub async fn sweep_retention(&self) -> Result<SweepSummary> {
        self.retention.sweep(Utc::now()).await
    }

    pub async fn purge_all(&self) -> Result<PurgeSummary> {
        self.pipeline.purge_all().await
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.pipeline.metrics().get_snapshot().await
    }
}
