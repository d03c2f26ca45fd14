use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Embedder, EmbeddingError};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

/// Embeddings from a local Ollama server (`POST /api/embeddings`).
///
/// The dimensionality is whatever the model returns; after the first
/// response every later vector must match it.
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    observed_dim: AtomicUsize,
}

impl OllamaEmbedder {
    pub fn new(base_url: String, model: String) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            observed_dim: AtomicUsize::new(0),
        })
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), EmbeddingError> {
        match self
            .observed_dim
            .compare_exchange(0, actual, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Ok(()),
            Err(expected) if expected == actual => Ok(()),
            Err(expected) => Err(EmbeddingError::InvalidDimensions { expected, actual }),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .unwrap_or(body);
            log::error!("Ollama embedding error ({}): {}", status.as_u16(), message);
            return Err(EmbeddingError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let vector = parsed
            .embedding
            .filter(|v| !v.is_empty())
            .ok_or(EmbeddingError::MissingEmbedding)?;

        self.check_dimensions(vector.len())?;
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.observed_dim.load(Ordering::SeqCst)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_response_fixes_dimensionality() {
        let embedder =
            OllamaEmbedder::new("http://localhost:11434/".into(), "nomic-embed-text".into())
                .unwrap();
        assert_eq!(embedder.base_url, "http://localhost:11434");
        assert_eq!(embedder.dimensions(), 0);

        embedder.check_dimensions(768).unwrap();
        embedder.check_dimensions(768).unwrap();
        assert_eq!(embedder.dimensions(), 768);
        assert!(matches!(
            embedder.check_dimensions(384),
            Err(EmbeddingError::InvalidDimensions { expected: 768, actual: 384 })
        ));
    }
}
