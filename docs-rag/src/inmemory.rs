//! In-memory similarity store using cosine similarity.
//!
//! This module provides [`InMemoryStore`], a zero-dependency store backed by
//! a `HashMap` protected by a `tokio::sync::RwLock`. It follows the same
//! ordering, threshold, and filter rules as the PostgreSQL backend and is
//! suitable for tests and small corpora loaded from a JSON export.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::corpus::Corpus;
use crate::document::{Chunk, CorpusStats, ParentContext, SearchResult, StoredChunk};
use crate::error::{RagError, Result};
use crate::store::{RankRequest, SimilarityStore};

const BACKEND: &str = "in-memory";

/// A [`SimilarityStore`] holding every corpus in memory.
///
/// # Example
///
/// ```rust,ignore
/// use docs_rag::{Corpus, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.load_json(Corpus::Hierarchical, "corpus.json").await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    corpora: RwLock<HashMap<Corpus, HashMap<String, StoredChunk>>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace chunks in a corpus.
    pub async fn upsert(&self, corpus: Corpus, chunks: impl IntoIterator<Item = StoredChunk>) {
        let mut corpora = self.corpora.write().await;
        let store = corpora.entry(corpus).or_default();
        for chunk in chunks {
            store.insert(chunk.id.clone(), chunk);
        }
    }

    /// Load a JSON array of [`StoredChunk`] records into a corpus.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StorageFailure`] if the file cannot be read and
    /// [`RagError::DecodeFailure`] if it is not a valid chunk array.
    pub async fn load_json(&self, corpus: Corpus, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            RagError::storage(BACKEND, format!("failed to read {}: {e}", path.display()))
        })?;
        let chunks: Vec<StoredChunk> = serde_json::from_str(&raw).map_err(|e| {
            RagError::DecodeFailure(format!("invalid corpus file {}: {e}", path.display()))
        })?;
        let count = chunks.len();
        self.upsert(corpus, chunks).await;
        debug!(%corpus, count, path = %path.display(), "loaded corpus export");
        Ok(count)
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns `None` when the lengths differ, and 0.0 if either vector has zero
/// magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some(dot / (norm_a * norm_b))
}

/// Total order over chunk ids: integer ids first, in numeric order, then all
/// other ids in lexicographic order. Integers that compare equal ("02", "2")
/// fall back to their text.
pub(crate) fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[async_trait]
impl SimilarityStore for InMemoryStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn rank_by_similarity(
        &self,
        corpus: Corpus,
        embedding: &[f32],
        request: &RankRequest,
    ) -> Result<Vec<SearchResult>> {
        let corpora = self.corpora.read().await;
        let Some(store) = corpora.get(&corpus) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, &StoredChunk)> = store
            .values()
            .filter(|chunk| request.component.as_ref().is_none_or(|c| &chunk.component == c))
            .filter_map(|chunk| cosine_similarity(&chunk.embedding, embedding).map(|s| (s, chunk)))
            .filter(|(similarity, _)| request.threshold.is_none_or(|t| *similarity > t))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| compare_ids(&a.1.id, &b.1.id)));
        scored.truncate(request.limit);

        Ok(scored
            .into_iter()
            .map(|(similarity, chunk)| SearchResult::new(chunk.to_chunk(), similarity))
            .collect())
    }

    async fn get_by_id(&self, corpus: Corpus, id: &str) -> Result<Option<Chunk>> {
        let corpora = self.corpora.read().await;
        Ok(corpora.get(&corpus).and_then(|store| store.get(id)).map(StoredChunk::to_chunk))
    }

    async fn get_parent_context(&self, corpus: Corpus, id: &str) -> Result<Option<ParentContext>> {
        let corpora = self.corpora.read().await;
        Ok(corpora.get(&corpus).and_then(|store| store.get(id)).map(|parent| ParentContext {
            section_path: parent.section_path.clone(),
            content: parent.content.clone(),
        }))
    }

    async fn get_by_component(&self, corpus: Corpus, component: &str) -> Result<Vec<Chunk>> {
        let corpora = self.corpora.read().await;
        let Some(store) = corpora.get(&corpus) else {
            return Ok(Vec::new());
        };
        let mut chunks: Vec<&StoredChunk> =
            store.values().filter(|chunk| chunk.component == component).collect();
        chunks.sort_by(|a, b| compare_ids(&a.id, &b.id));
        Ok(chunks.into_iter().map(StoredChunk::to_chunk).collect())
    }

    async fn list_distinct_components(&self, corpus: Corpus) -> Result<Vec<String>> {
        let corpora = self.corpora.read().await;
        let components: BTreeSet<&str> = corpora
            .get(&corpus)
            .map(|store| store.values().map(|chunk| chunk.component.as_str()).collect())
            .unwrap_or_default();
        Ok(components.into_iter().map(str::to_string).collect())
    }

    async fn stats(&self, corpus: Corpus) -> Result<CorpusStats> {
        let corpora = self.corpora.read().await;
        let Some(store) = corpora.get(&corpus).filter(|store| !store.is_empty()) else {
            return Ok(CorpusStats::new(0, 0, None));
        };
        let total = store.len() as u64;
        let unique: BTreeSet<&str> = store.values().map(|c| c.component.as_str()).collect();
        let tokens: i64 = store.values().map(|c| c.token_count).sum();
        Ok(CorpusStats::new(total, unique.len() as u64, Some(tokens as f64 / total as f64)))
    }
}
