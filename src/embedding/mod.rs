//! Text-to-vector embedding.
//!
//! Provides the [`Embedder`] trait, a deterministic in-process
//! [`HashingEmbedder`] and an HTTP [`OllamaEmbedder`]. Every vector in one
//! store must come from the same model: switching models invalidates
//! similarity against older records.

pub mod hashing;
pub mod ollama;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::settings::EmbeddingSettings;

pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;

/// Model id that selects [`HashingEmbedder`].
pub const LOCAL_HASH_MODEL: &str = "local-hash";

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing embedding in response")]
    MissingEmbedding,

    #[error("Nothing to embed: input text is empty")]
    EmptyInput,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Vector length this embedder produces; 0 when not known until the first call.
    fn dimensions(&self) -> usize;

    /// Model identifier, for logs and for detecting a model switch.
    fn model_id(&self) -> &str;
}

/// Build the embedder named by the settings.
pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    if settings.model == LOCAL_HASH_MODEL {
        return Ok(Arc::new(HashingEmbedder::new(settings.dimensions)));
    }

    Ok(Arc::new(OllamaEmbedder::new(
        settings.endpoint.clone(),
        settings.model.clone(),
    )?))
}
