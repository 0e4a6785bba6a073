//! Retrieval orchestrator.
//!
//! The [`RetrievalEngine`] answers a query end to end by composing an
//! [`EmbeddingProvider`], a [`SimilarityStore`] and a per-corpus
//! [`ComponentVocabulary`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docs_rag::{Corpus, EngineConfig, InMemoryStore, RetrievalEngine, SearchOptions};
//!
//! let engine = RetrievalEngine::builder()
//!     .config(EngineConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .store(Arc::new(InMemoryStore::new()))
//!     .build()?;
//!
//! let text = engine
//!     .search(Corpus::Hierarchical, "How do I style a button?", SearchOptions::new(5))
//!     .await?;
//! ```

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::context::resolve_parent_contexts;
use crate::corpus::Corpus;
use crate::document::{Chunk, ComponentList, CorpusStats, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::format::{FormatOptions, format_results};
use crate::store::{RankRequest, SimilarityStore};
use crate::vocabulary::{ComponentVocabulary, extract_component_filter};

/// Per-request search parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of results.
    pub limit: usize,
    /// Minimum similarity; results at or below it are dropped. Falls back to
    /// the engine's configured threshold when `None`.
    pub threshold: Option<f32>,
}

impl SearchOptions {
    /// Options with the given limit and no explicit threshold.
    pub fn new(limit: usize) -> Self {
        Self { limit, threshold: None }
    }

    /// Set an explicit threshold.
    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
        self.threshold = threshold;
        self
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::new(5)
    }
}

/// The retrieval orchestrator.
///
/// Runs filter inference, query embedding, similarity ranking and parent
/// resolution for one request. Safe to share across concurrent requests.
/// Construct one via [`RetrievalEngine::builder()`].
pub struct RetrievalEngine {
    config: EngineConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn SimilarityStore>,
    vocabulary: ComponentVocabulary,
}

impl RetrievalEngine {
    /// Create a new [`RetrievalEngineBuilder`].
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the similarity store.
    pub fn store(&self) -> &Arc<dyn SimilarityStore> {
        &self.store
    }

    /// Search `corpus` and render the results as one document.
    ///
    /// Parent context is rendered for the hierarchical corpus only. Zero
    /// results render as [`NO_RESULTS`](crate::format::NO_RESULTS).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidRequest`] for a blank query and
    /// [`RagError::EmbeddingFailure`] if the query cannot be embedded.
    pub async fn search(
        &self,
        corpus: Corpus,
        query: &str,
        options: SearchOptions,
    ) -> Result<String> {
        let results = self.retrieve(corpus, query, options).await?;
        Ok(format_results(&results, FormatOptions { include_parent: corpus.is_hierarchical() }))
    }

    /// Search `corpus` and return the structured, context-enriched results.
    ///
    /// Steps: infer component filter → embed → rank → resolve parents.
    /// Storage errors while loading the vocabulary or ranking are logged and
    /// degrade to "no filter" and "no results" respectively.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidRequest`] for a blank query and
    /// [`RagError::EmbeddingFailure`] if the query cannot be embedded. No
    /// partial result is returned on embedding failure.
    pub async fn retrieve(
        &self,
        corpus: Corpus,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidRequest("query must not be blank".to_string()));
        }
        if options.limit == 0 {
            return Ok(Vec::new());
        }

        // 1. Infer a component filter
        let component = self.infer_component(corpus, query).await;

        // 2. Embed the query
        let embedding = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(%corpus, provider = self.embedding_provider.name(), error = %e, "query embedding failed");
            e
        })?;

        // 3. Rank
        let request = RankRequest::new(options.limit)
            .with_threshold(options.threshold.or(self.config.similarity_threshold))
            .with_component(component.clone());
        let ranked = match self.store.rank_by_similarity(corpus, &embedding, &request).await {
            Ok(ranked) => ranked,
            Err(e) => {
                error!(%corpus, backend = self.store.backend(), error = %e, "similarity ranking failed");
                Vec::new()
            }
        };

        // 4. Resolve parent context
        let results = resolve_parent_contexts(self.store.as_ref(), corpus, ranked).await;

        info!(
            %corpus,
            component = component.as_deref(),
            limit = options.limit,
            threshold = request.threshold,
            result_count = results.len(),
            "search completed"
        );
        Ok(results)
    }

    /// The component filter `query` implies for `corpus`, if any.
    pub async fn infer_component(&self, corpus: Corpus, query: &str) -> Option<String> {
        let vocabulary = self
            .vocabulary
            .get_or_load(corpus, || self.store.list_distinct_components(corpus))
            .await;
        match vocabulary {
            Ok(names) => {
                let component = extract_component_filter(query, &names);
                debug!(%corpus, component = component.as_deref(), "inferred component filter");
                component
            }
            Err(e) => {
                error!(%corpus, backend = self.store.backend(), error = %e, "component vocabulary unavailable");
                None
            }
        }
    }

    /// Fetch one chunk by id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if no chunk has this id. Storage errors
    /// are logged and also reported as not found.
    pub async fn get_chunk(&self, corpus: Corpus, id: &str) -> Result<Chunk> {
        let chunk = self.store.get_by_id(corpus, id).await.unwrap_or_else(|e| {
            error!(%corpus, id, backend = self.store.backend(), error = %e, "chunk lookup failed");
            None
        });
        chunk.ok_or_else(|| RagError::NotFound(format!("chunk '{id}' in {corpus} corpus")))
    }

    /// Fetch every chunk of one component, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if the component has no chunks. Storage
    /// errors are logged and also reported as not found.
    pub async fn get_chunks_by_component(
        &self,
        corpus: Corpus,
        component: &str,
    ) -> Result<Vec<Chunk>> {
        let chunks = self.store.get_by_component(corpus, component).await.unwrap_or_else(|e| {
            error!(%corpus, component, backend = self.store.backend(), error = %e, "component lookup failed");
            Vec::new()
        });
        if chunks.is_empty() {
            return Err(RagError::NotFound(format!(
                "no chunks for component '{component}' in {corpus} corpus"
            )));
        }
        Ok(chunks)
    }

    /// Distinct component names of `corpus`, read fresh from the store.
    ///
    /// Storage errors are logged and degrade to an empty list.
    pub async fn list_components(&self, corpus: Corpus) -> ComponentList {
        let components = self.store.list_distinct_components(corpus).await.unwrap_or_else(|e| {
            error!(%corpus, backend = self.store.backend(), error = %e, "component listing failed");
            Vec::new()
        });
        ComponentList::from(components)
    }

    /// Aggregate statistics of `corpus`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StorageFailure`] if the aggregate query fails; an
    /// all-zero snapshot would be indistinguishable from an empty corpus.
    pub async fn stats(&self, corpus: Corpus) -> Result<CorpusStats> {
        self.store.stats(corpus).await.map_err(|e| {
            error!(%corpus, backend = self.store.backend(), error = %e, "statistics query failed");
            e
        })
    }
}

/// Builder for constructing a [`RetrievalEngine`].
///
/// The embedding provider and store are required; the configuration
/// defaults to [`EngineConfig::default()`].
#[derive(Default)]
pub struct RetrievalEngineBuilder {
    config: Option<EngineConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn SimilarityStore>>,
}

impl RetrievalEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the similarity store backend.
    pub fn store(mut self, store: Arc<dyn SimilarityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the [`RetrievalEngine`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing.
    pub fn build(self) -> Result<RetrievalEngine> {
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let store =
            self.store.ok_or_else(|| RagError::ConfigError("store is required".to_string()))?;

        Ok(RetrievalEngine {
            config: self.config.unwrap_or_default(),
            embedding_provider,
            store,
            vocabulary: ComponentVocabulary::new(),
        })
    }
}
