//! Similarity store trait: the read-only facade over a chunk corpus.

use async_trait::async_trait;

use crate::corpus::Corpus;
use crate::document::{Chunk, CorpusStats, ParentContext, SearchResult};
use crate::error::Result;

/// Parameters of one ranking call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankRequest {
    /// Maximum number of rows returned.
    pub limit: usize,
    /// Rows whose similarity is at or below this value are excluded.
    pub threshold: Option<f32>,
    /// Only chunks whose component equals this value participate.
    pub component: Option<String>,
}

impl RankRequest {
    /// A request bounded by `limit` with no threshold or filter.
    pub fn new(limit: usize) -> Self {
        Self { limit, ..Default::default() }
    }

    /// Exclude rows at or below `threshold`.
    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
        self.threshold = threshold;
        self
    }

    /// Restrict ranking to one component.
    pub fn with_component(mut self, component: Option<String>) -> Self {
        self.component = component;
        self
    }
}

/// Read-only access to the chunks of each [`Corpus`].
///
/// Implementations must apply the threshold and the component filter before
/// truncating to `limit`, return rows in non-increasing similarity order, and
/// break ties by ascending chunk id. Every method reports backend problems as
/// [`RagError::StorageFailure`](crate::RagError::StorageFailure); degrading
/// those to empty results is the caller's decision.
///
/// # Example
///
/// ```rust,ignore
/// use docs_rag::{Corpus, InMemoryStore, RankRequest, SimilarityStore};
///
/// let store = InMemoryStore::new();
/// let ranked = store
///     .rank_by_similarity(Corpus::Hierarchical, &query_embedding, &RankRequest::new(5))
///     .await?;
/// ```
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Rank chunks by similarity to `embedding`.
    async fn rank_by_similarity(
        &self,
        corpus: Corpus,
        embedding: &[f32],
        request: &RankRequest,
    ) -> Result<Vec<SearchResult>>;

    /// Fetch one chunk by id.
    async fn get_by_id(&self, corpus: Corpus, id: &str) -> Result<Option<Chunk>>;

    /// Fetch only the section path and content of one chunk.
    async fn get_parent_context(&self, corpus: Corpus, id: &str) -> Result<Option<ParentContext>>;

    /// All chunks of one component, ordered by id.
    async fn get_by_component(&self, corpus: Corpus, component: &str) -> Result<Vec<Chunk>>;

    /// Distinct component names in lexicographic order.
    async fn list_distinct_components(&self, corpus: Corpus) -> Result<Vec<String>>;

    /// Aggregate snapshot of the corpus.
    async fn stats(&self, corpus: Corpus) -> Result<CorpusStats>;
}
