//! Question answering over captured history: statistics for "how much",
//! semantic matches for "what specifically".

mod context;
mod generator;
mod orchestrator;

use thiserror::Error;

pub use context::{build_prompt, MatchEntry, PeriodOverview, SemanticMatches};
pub use generator::{OllamaGenerator, TextGenerator};
pub use orchestrator::RetrievalOrchestrator;

/// Failures the user sees. Embedding problems never surface here; they only
/// drop the semantic matches from the answer.
#[derive(Error, Debug)]
pub enum AnswerError {
    #[error("Ask a question to search your history")]
    EmptyQuery,

    #[error("No answer model is configured: {0}")]
    Configuration(String),

    #[error("The answer model did not respond within {secs}s; try again or pick a smaller model")]
    GenerationTimeout { secs: u64 },

    #[error("The answer model failed: {0}")]
    Generation(String),
}
