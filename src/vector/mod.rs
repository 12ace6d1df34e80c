//! Similarity Memory
//!
//! Remembers where previously sorted content went and suggests destinations
//! for new content that looks similar. Content is chunked, embedded locally
//! (fastembed-rs or the hashing fallback), and matched by cosine similarity
//! against every stored record.
//!
//! Memory is advisory: failures never propagate. A failed query yields
//! [`MemoryHint::Unavailable`] and a failed learn is logged and dropped.

pub mod chunker;
pub mod embedder;
pub mod store;

pub use chunker::TextChunker;
pub use embedder::{Embedder, EmbeddingError, FastEmbedder, HashingEmbedder};
pub use store::{InMemoryRecordStore, MemoryRecord, MemoryStoreError, RecordStore, SqliteRecordStore};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Configuration for the similarity memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Minimum cosine similarity for a match to count (0.0 to 1.0)
    pub min_confidence: f32,
    /// Number of nearest records considered per query
    pub max_results: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.70,
            max_results: 5,
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

/// A destination suggested by memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationMatch {
    pub destination: String,
    pub confidence: f32,
}

/// Result of a memory query, as shown to the reasoner
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryHint {
    /// Confident matches, best first
    Matches(Vec<DestinationMatch>),
    NoConfidentMatch,
    Unavailable,
}

impl MemoryHint {
    pub fn top(&self) -> Option<&DestinationMatch> {
        match self {
            Self::Matches(matches) => matches.first(),
            _ => None,
        }
    }

    /// Prompt text for the hint
    pub fn render(&self) -> String {
        match self {
            Self::Matches(matches) => matches
                .iter()
                .map(|m| format!("Previously sorted to '{}' (confidence {:.2})", m.destination, m.confidence))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::NoConfidentMatch => "No high-confidence matches in memory.".to_string(),
            Self::Unavailable => "Memory unavailable.".to_string(),
        }
    }
}

/// Cosine similarity of two vectors; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Process-wide memory handle, shared as `Arc<SimilarityMemory>`
pub struct SimilarityMemory {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn RecordStore>,
    chunker: TextChunker,
    config: MemoryConfig,
}

impl SimilarityMemory {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn RecordStore>, config: MemoryConfig) -> Self {
        Self {
            embedder,
            store,
            chunker: TextChunker::new(config.chunk_size, config.chunk_overlap),
            config,
        }
    }

    /// Hashing embedder over an in-memory store, for tests and dry runs
    pub fn in_memory(config: MemoryConfig) -> Self {
        Self::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(InMemoryRecordStore::new()),
            config,
        )
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Number of stored records (0 when the store cannot be read)
    pub fn len(&self) -> usize {
        self.store.len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Suggest destinations for `content`
    pub async fn query(&self, content: &str) -> MemoryHint {
        match self.try_query(content).await {
            Ok(hint) => hint,
            Err(e) => {
                tracing::warn!("[Memory] Query failed: {}", e);
                MemoryHint::Unavailable
            }
        }
    }

    async fn try_query(&self, content: &str) -> Result<MemoryHint, String> {
        if self.store.is_empty().map_err(|e| e.to_string())? {
            return Ok(MemoryHint::NoConfidentMatch);
        }

        let chunks = self.chunker.split(content);
        if chunks.is_empty() {
            return Ok(MemoryHint::NoConfidentMatch);
        }

        let query_vectors = self.embedder.embed(&chunks).await.map_err(|e| e.to_string())?;
        let nearest = self
            .store
            .nearest(&query_vectors, self.config.max_results)
            .map_err(|e| e.to_string())?;

        // Aggregate per destination, maximum confidence wins
        let mut matches: Vec<DestinationMatch> = Vec::new();
        for hit in nearest {
            if hit.score < self.config.min_confidence {
                continue;
            }
            match matches.iter_mut().find(|m| m.destination == hit.record.destination) {
                Some(existing) => existing.confidence = existing.confidence.max(hit.score),
                None => matches.push(DestinationMatch {
                    destination: hit.record.destination,
                    confidence: hit.score,
                }),
            }
        }

        if matches.is_empty() {
            return Ok(MemoryHint::NoConfidentMatch);
        }

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        tracing::debug!(
            "[Memory] {} confident destination(s), top '{}' at {:.2}",
            matches.len(),
            matches[0].destination,
            matches[0].confidence
        );
        Ok(MemoryHint::Matches(matches))
    }

    /// Remember that `content` was sorted into `destination`
    ///
    /// Best-effort: errors are logged, never returned.
    pub async fn learn(&self, content: &str, destination: &str) {
        match self.try_learn(content, destination).await {
            Ok(0) => tracing::debug!("[Memory] Nothing to learn for '{}'", destination),
            Ok(count) => tracing::info!("[Memory] Learned {} chunk(s) -> '{}'", count, destination),
            Err(e) => tracing::warn!("[Memory] Failed to learn '{}': {}", destination, e),
        }
    }

    async fn try_learn(&self, content: &str, destination: &str) -> Result<usize, String> {
        let destination = destination.trim_matches('/');
        if destination.is_empty() {
            return Ok(0);
        }

        // Identical chunks within one document are stored once
        let mut seen = HashSet::new();
        let chunks: Vec<String> = self
            .chunker
            .split(content)
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();
        if chunks.is_empty() {
            return Ok(0);
        }

        let vectors = self.embedder.embed(&chunks).await.map_err(|e| e.to_string())?;
        if vectors.len() != chunks.len() {
            return Err(format!("expected {} embeddings, got {}", chunks.len(), vectors.len()));
        }

        let records: Vec<MemoryRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| MemoryRecord::new(chunk, destination.to_string(), vector))
            .collect();
        let count = records.len();

        self.store.append(records).map_err(|e| e.to_string())?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Embed("model offline".to_string()))
        }

        fn dimension(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_cold_memory_has_no_confident_match() {
        let memory = SimilarityMemory::in_memory(MemoryConfig::default());
        assert_eq!(memory.query("anything").await, MemoryHint::NoConfidentMatch);
    }

    #[tokio::test]
    async fn test_near_duplicate_recalls_destination() {
        let memory = SimilarityMemory::in_memory(MemoryConfig::default());
        memory
            .learn("Project Alpha kickoff notes. Attendees: Dana, Lee. Next milestone in March.", "Projects/Alpha")
            .await;

        let hint = memory
            .query("Project Alpha kick-off notes. Attendees: Dana, Lee. Next milestone in March!")
            .await;
        let top = hint.top().expect("expected a confident match");
        assert_eq!(top.destination, "Projects/Alpha");
        assert!(top.confidence >= 0.70);
        assert!(hint.render().contains("Previously sorted to 'Projects/Alpha'"));
    }

    #[tokio::test]
    async fn test_unrelated_content_is_gated() {
        let memory = SimilarityMemory::in_memory(MemoryConfig::default());
        memory
            .learn("INVOICE #1024\nVendor: AWS\nTotal: $150.00", "Finance/Invoices/AWS")
            .await;

        let hint = memory.query("Weekly grocery list: milk, eggs, bread, spinach").await;
        assert_eq!(hint, MemoryHint::NoConfidentMatch);
        assert_eq!(hint.render(), "No high-confidence matches in memory.");
    }

    #[tokio::test]
    async fn test_learning_twice_is_no_weaker() {
        let memory = SimilarityMemory::in_memory(MemoryConfig::default());
        let content = "Stripe payout statement for October";

        memory.learn(content, "Finance/Payouts").await;
        let once = memory.query(content).await.top().cloned().unwrap();

        memory.learn(content, "Finance/Payouts").await;
        let twice = memory.query(content).await.top().cloned().unwrap();

        assert_eq!(twice.destination, "Finance/Payouts");
        assert!(twice.confidence >= once.confidence);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_unavailable() {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .append(vec![MemoryRecord::new("x".into(), "X".into(), vec![1.0])])
            .unwrap();
        let memory = SimilarityMemory::new(Arc::new(FailingEmbedder), store, MemoryConfig::default());

        assert_eq!(memory.query("x").await, MemoryHint::Unavailable);
        assert_eq!(MemoryHint::Unavailable.render(), "Memory unavailable.");

        // Learn swallows the error
        memory.learn("y", "Y").await;
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_is_configurable() {
        let strict = MemoryConfig {
            min_confidence: 1.01,
            ..MemoryConfig::default()
        };
        let memory = SimilarityMemory::in_memory(strict);
        memory.learn("exact text", "Somewhere").await;
        assert_eq!(memory.query("exact text").await, MemoryHint::NoConfidentMatch);
    }
}
