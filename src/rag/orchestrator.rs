use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::db::Database;
use crate::embedding::Embedder;
use crate::settings::RetrievalSettings;
use crate::stats::{day_range, trailing_days, StatsAggregator};
use crate::vector_store::VectorStore;

use super::context::{build_prompt, MatchEntry, PeriodOverview, SemanticMatches};
use super::generator::TextGenerator;
use super::AnswerError;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Answers free-text questions from reports plus nearest-neighbour snapshots.
pub struct RetrievalOrchestrator {
    db: Database,
    stats: StatsAggregator,
    store: VectorStore,
    embedder: Option<Arc<dyn Embedder>>,
    generator: Option<Arc<dyn TextGenerator>>,
    settings: RetrievalSettings,
}

impl RetrievalOrchestrator {
    pub fn new(
        db: Database,
        stats: StatsAggregator,
        store: VectorStore,
        embedder: Option<Arc<dyn Embedder>>,
        generator: Option<Arc<dyn TextGenerator>>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            db,
            stats,
            store,
            embedder,
            generator,
            settings,
        }
    }

    /// The generator's output is returned verbatim.
    pub async fn answer(&self, query: &str, as_of: DateTime<Utc>) -> Result<String, AnswerError> {
        if query.trim().is_empty() {
            return Err(AnswerError::EmptyQuery);
        }
        let Some(generator) = self.generator.as_ref() else {
            return Err(AnswerError::Configuration(
                "set a generation model in settings and make sure Ollama is running".into(),
            ));
        };

        let prompt = self.build_context(query, as_of).await;
        log_debug!("answer prompt is {} chars", prompt.len());

        let limit = self.settings.generate_timeout();
        match tokio::time::timeout(limit, generator.generate(&prompt)).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(err)) => {
                log_warn!("generation failed: {err:#}");
                Err(AnswerError::Generation(format!("{err:#}")))
            }
            Err(_) => Err(AnswerError::GenerationTimeout {
                secs: limit.as_secs(),
            }),
        }
    }

    /// Overview and semantic matches assembled into the generator prompt.
    pub async fn build_context(&self, query: &str, as_of: DateTime<Utc>) -> String {
        let overview = self.overview(as_of).await;
        let matches = self.semantic_matches(query).await;
        build_prompt(&overview, &matches, query, self.settings.max_match_chars)
    }

    async fn overview(&self, as_of: DateTime<Utc>) -> Vec<PeriodOverview> {
        let today = as_of.date_naive();
        let periods = [
            ("Today", day_range(today)),
            ("Yesterday", day_range(today - Duration::days(1))),
            ("Last 7 days", trailing_days(as_of, 7)),
        ];

        let mut overview = Vec::with_capacity(periods.len());
        for (label, (start, end)) in periods {
            let report = match self.stats.report(start, end).await {
                Ok(report) => Some(report),
                Err(err) => {
                    log_warn!("{label} report unavailable: {err:#}");
                    None
                }
            };
            overview.push(PeriodOverview {
                label: label.to_string(),
                report,
            });
        }
        overview
    }

    async fn semantic_matches(&self, query: &str) -> SemanticMatches {
        let Some(embedder) = self.embedder.as_ref() else {
            return SemanticMatches::Unavailable {
                reason: "no embedding model configured".into(),
            };
        };

        let limit = self.settings.embed_timeout();
        let vector = match tokio::time::timeout(limit, embedder.embed(query)).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(err)) => {
                log_warn!("query embedding failed, answering from statistics: {err}");
                return SemanticMatches::Unavailable {
                    reason: format!("embedding failed: {err}"),
                };
            }
            Err(_) => {
                log_info!(
                    "query embedding timed out after {}ms, answering from statistics",
                    limit.as_millis()
                );
                return SemanticMatches::Unavailable {
                    reason: "embedding timed out".into(),
                };
            }
        };

        let hits = match self.store.search(&vector, self.settings.top_k).await {
            Ok(hits) => hits,
            Err(err) => {
                log_warn!("vector search failed: {err:#}");
                return SemanticMatches::Unavailable {
                    reason: "search failed".into(),
                };
            }
        };

        if hits.is_empty() {
            return SemanticMatches::Empty;
        }

        let mut entries = Vec::with_capacity(hits.len());
        for hit in hits {
            let captured_at = match self.db.get_snapshot(&hit.snapshot_id).await {
                Ok(snapshot) => snapshot.map(|s| s.captured_at),
                Err(err) => {
                    log_debug!("no capture time for {}: {err:#}", hit.snapshot_id);
                    None
                }
            };
            entries.push(MatchEntry {
                score: hit.score,
                captured_at,
                text: hit.text,
            });
        }
        SemanticMatches::Found(entries)
    }
}
