//! Embedding Providers
//!
//! Turns text chunks into fixed-dimension vectors for the similarity memory.
//! `FastEmbedder` runs all-MiniLM-L6-v2 locally through fastembed-rs;
//! `HashingEmbedder` is a deterministic, offline fallback based on hashed
//! character trigrams.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use thiserror::Error;

/// Errors from embedding operations
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    Init(String),

    #[error("Embedding failed: {0}")]
    Embed(String),

    #[error("Embedder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimension(&self) -> usize;
}

/// Local sentence embeddings via fastembed
///
/// Note: the model is downloaded on first use (~90MB)
pub struct FastEmbedder {
    model: TextEmbedding,
}

impl FastEmbedder {
    const DIMENSION: usize = 384;

    pub fn new() -> Result<Self, EmbeddingError> {
        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false);

        let model = TextEmbedding::try_new(options).map_err(|e| EmbeddingError::Init(e.to_string()))?;

        tracing::info!("[Embedder] Loaded all-MiniLM-L6-v2");
        Ok(Self { model })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Embed(e.to_string()))?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: vectors.len(),
            });
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }
}

/// Character-trigram feature hashing
///
/// Text is lowercased and whitespace-collapsed, each word is padded with
/// spaces, and every trigram is hashed (FNV-1a) into a bucket. The result is
/// L2-normalized so cosine similarity reduces to a dot product.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let normalized: String = text
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if normalized.is_empty() {
            return vector;
        }

        let padded: Vec<char> = format!(" {} ", normalized).chars().collect();
        for window in padded.windows(3) {
            let idx = (fnv1a(window) % self.dimension as u64) as usize;
            vector[idx] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(512)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(chars: &[char]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    for c in chars {
        let mut buf = [0u8; 4];
        for byte in c.encode_utf8(&mut buf).bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::default();
        let texts = vec!["Quarterly budget review".to_string()];

        let a = embedder.embed(&texts).await.unwrap();
        let b = embedder.embed(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 512);

        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_hashing_embedder_similarity_ordering() {
        let embedder = HashingEmbedder::default();
        let vectors = embedder
            .embed(&[
                "Project Alpha kickoff notes".to_string(),
                "Project Alpha kick-off notes".to_string(),
                "Weekly grocery list: milk, eggs".to_string(),
            ])
            .await
            .unwrap();

        let near = cosine_similarity(&vectors[0], &vectors[1]);
        let far = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(near > far);
        assert!(near > 0.7);
    }

    #[tokio::test]
    async fn test_hashing_embedder_empty_text() {
        let embedder = HashingEmbedder::new(16);
        let vectors = embedder.embed(&["   ".to_string()]).await.unwrap();
        assert!(vectors[0].iter().all(|x| *x == 0.0));
    }
}
