//! In-memory vector index over corpus chunks.
//!
//! Built once per (corpus snapshot, chunking parameters, embedding
//! model) and immutable afterward; queries share the built index freely.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::corpus::{self, Chunk};
use crate::embedding::Embedder;
use crate::errors::ApiError;
use crate::vector_math::cosine_similarity;

struct IndexEntry {
    embedding: Vec<f32>,
    text: String,
    source: String,
}

/// One retrieval hit: chunk text, source label, similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub score: f32,
}

pub struct VectorIndex {
    model: String,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embed every chunk in one batch call and store the entries.
    /// An embedding failure here is fatal; the index cannot exist
    /// without its vectors.
    pub async fn build(embedder: &dyn Embedder, chunks: &[Chunk]) -> Result<Self, ApiError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(ApiError::Upstream(format!(
                "embedding backend returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let entries = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry {
                embedding,
                text: chunk.text.clone(),
                source: chunk.source.clone(),
            })
            .collect();

        Ok(Self {
            model: embedder.model().to_string(),
            entries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-`k` entries by descending cosine similarity. `k` beyond the
    /// entry count returns everything; an empty index returns nothing.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<RetrievedChunk> {
        let mut scored: Vec<RetrievedChunk> = self
            .entries
            .iter()
            .map(|entry| RetrievedChunk {
                text: entry.text.clone(),
                source: entry.source.clone(),
                score: cosine_similarity(query_embedding, &entry.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// Cache key for a built index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    pub corpus_fingerprint: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub chunks: usize,
    pub embedding_model: String,
    pub corpus_fingerprint: String,
}

struct CachedIndex {
    key: IndexKey,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

/// Memoized index builder. Rebuilds only when the key changes (at
/// bootstrap or on an explicit reindex), never implicitly mid-query.
#[derive(Default)]
pub struct IndexService {
    cached: RwLock<Option<CachedIndex>>,
}

impl IndexService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index and the embedder it was built with, so queries are
    /// embedded in the same space as the entries.
    pub async fn current(&self) -> Option<(Arc<dyn Embedder>, Arc<VectorIndex>)> {
        self.cached
            .read()
            .await
            .as_ref()
            .map(|cached| (cached.embedder.clone(), cached.index.clone()))
    }

    pub async fn status(&self) -> Option<IndexStatus> {
        self.cached.read().await.as_ref().map(|cached| IndexStatus {
            chunks: cached.index.len(),
            embedding_model: cached.key.embedding_model.clone(),
            corpus_fingerprint: cached.key.corpus_fingerprint.clone(),
        })
    }

    /// Return the held index when the key still matches, otherwise load
    /// the corpus, embed it, and swap the cache.
    pub async fn get_or_build(
        &self,
        embedder: Arc<dyn Embedder>,
        documents_dir: &Path,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Arc<VectorIndex>, ApiError> {
        let documents = corpus::load_documents(documents_dir)?;
        let key = IndexKey {
            corpus_fingerprint: corpus::fingerprint(&documents),
            chunk_size,
            chunk_overlap,
            embedding_model: embedder.model().to_string(),
        };

        {
            let cached = self.cached.read().await;
            if let Some(existing) = cached.as_ref() {
                if existing.key == key {
                    return Ok(existing.index.clone());
                }
            }
        }

        let chunks = corpus::chunk_documents(&documents, chunk_size, chunk_overlap)?;
        tracing::info!(
            "Building vector index: {} chunks, model {}",
            chunks.len(),
            embedder.model()
        );
        let index = Arc::new(VectorIndex::build(embedder.as_ref(), &chunks).await?);

        let mut cached = self.cached.write().await;
        *cached = Some(CachedIndex {
            key,
            embedder,
            index: index.clone(),
        });
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;

    /// Maps exact texts to fixed vectors; anything unknown gets a unit
    /// vector on the first axis.
    struct StaticEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl StaticEmbedder {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(text, vector)| (text.to_string(), vector.clone()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl Embedder for StaticEmbedder {
        fn model(&self) -> &str {
            "static-test-embedder"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    self.vectors
                        .get(text)
                        .cloned()
                        .unwrap_or_else(|| vec![1.0, 0.0, 0.0])
                })
                .collect())
        }
    }

    fn chunk(text: &str, source: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn entry_count_equals_chunk_count() {
        let embedder = StaticEmbedder::new(&[]);
        let chunks = vec![chunk("one", "a.txt"), chunk("two", "b.txt")];
        let index = VectorIndex::build(&embedder, &chunks).await.unwrap();
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn search_returns_descending_similarity() {
        let embedder = StaticEmbedder::new(&[
            ("close", vec![0.9, 0.1, 0.0]),
            ("middle", vec![0.5, 0.5, 0.0]),
            ("far", vec![0.0, 0.1, 0.9]),
        ]);
        let chunks = vec![
            chunk("far", "far.txt"),
            chunk("close", "close.txt"),
            chunk("middle", "middle.txt"),
        ];
        let index = VectorIndex::build(&embedder, &chunks).await.unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 3);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].source, "close.txt");
        assert_eq!(results[2].source, "far.txt");
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
    }

    #[tokio::test]
    async fn k_beyond_entry_count_returns_all_with_metadata() {
        let embedder = StaticEmbedder::new(&[]);
        let chunks = vec![chunk("one", "a.txt"), chunk("two", "b.txt")];
        let index = VectorIndex::build(&embedder, &chunks).await.unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 10);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.source.is_empty()));
    }

    #[tokio::test]
    async fn empty_index_returns_empty_result_set() {
        let embedder = StaticEmbedder::new(&[]);
        let index = VectorIndex::build(&embedder, &[]).await.unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 5).is_empty());
    }

    /// Embedder that reports a wrong vector count.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model(&self) -> &str {
            "short"
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn build_rejects_vector_count_mismatch() {
        let chunks = vec![chunk("one", "a.txt")];
        let result = VectorIndex::build(&ShortEmbedder, &chunks).await;
        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }

    #[tokio::test]
    async fn index_service_memoizes_until_corpus_changes() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, contents: &str| {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(contents.as_bytes()).unwrap();
        };
        write("a.txt", "alpha text");

        let service = IndexService::new();
        let embedder: Arc<dyn Embedder> = Arc::new(StaticEmbedder::new(&[]));

        let first = service
            .get_or_build(embedder.clone(), dir.path(), 500, 50)
            .await
            .unwrap();
        let second = service
            .get_or_build(embedder.clone(), dir.path(), 500, 50)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        write("b.txt", "beta text");
        let third = service
            .get_or_build(embedder, dir.path(), 500, 50)
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 2);
    }
}
