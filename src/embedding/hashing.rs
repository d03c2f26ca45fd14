use async_trait::async_trait;

use super::{Embedder, EmbeddingError, LOCAL_HASH_MODEL};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Local embedder using signed feature hashing of word unigrams and character
/// trigrams, L2-normalized.
///
/// Features are hashed with FNV-1a, not `std::hash`: stored vectors must stay
/// comparable across toolchain upgrades.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut vector, word.as_bytes(), 2.0);

            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, trigram.as_bytes(), 1.0);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let idx = (hash % self.dim as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[idx] += sign * weight;
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        LOCAL_HASH_MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::cosine_similarity;

    #[test]
    fn same_text_same_vector() {
        let embedder = HashingEmbedder::new(64);
        assert_eq!(embedder.embed_sync("Rust borrow checker"), embedder.embed_sync("rust BORROW checker"));
    }

    #[test]
    fn vectors_are_unit_length() {
        let vector = HashingEmbedder::default().embed_sync("release notes for version two");
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn overlapping_text_ranks_above_unrelated_text() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_sync("quarterly budget spreadsheet");
        let related = embedder.embed_sync("editing the quarterly budget in a spreadsheet");
        let unrelated = embedder.embed_sync("watching cat videos");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn empty_input_is_an_error() {
        let err = HashingEmbedder::default().embed("   ").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::EmptyInput));
    }
}
