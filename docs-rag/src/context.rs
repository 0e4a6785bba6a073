//! Parent-context resolution.
//!
//! Each ranked chunk that names a parent gets exactly one point lookup for
//! the parent's section path and content. Resolution never ascends further,
//! so self-referencing or cyclic parent pointers cost one lookup and nothing
//! more.

use futures::future::join_all;
use tracing::{debug, error};

use crate::corpus::Corpus;
use crate::document::{ParentContext, SearchResult};
use crate::store::SimilarityStore;

/// Attach parent context to every result that has a resolvable parent.
///
/// Lookups run concurrently but results keep their ranked order. A missing
/// parent row or a storage error leaves `parent_context` empty for that
/// result only.
pub async fn resolve_parent_contexts(
    store: &dyn SimilarityStore,
    corpus: Corpus,
    results: Vec<SearchResult>,
) -> Vec<SearchResult> {
    let lookups = results.iter().map(|result| async move {
        match result.chunk.parent_id.as_deref() {
            Some(parent_id) => resolve_one(store, corpus, &result.chunk.id, parent_id).await,
            None => None,
        }
    });
    let contexts = join_all(lookups).await;

    results
        .into_iter()
        .zip(contexts)
        .map(|(mut result, parent_context)| {
            result.parent_context = parent_context;
            result
        })
        .collect()
}

async fn resolve_one(
    store: &dyn SimilarityStore,
    corpus: Corpus,
    chunk_id: &str,
    parent_id: &str,
) -> Option<ParentContext> {
    match store.get_parent_context(corpus, parent_id).await {
        Ok(Some(context)) => Some(context),
        Ok(None) => {
            debug!(chunk.id = chunk_id, parent.id = parent_id, "dangling parent reference");
            None
        }
        Err(e) => {
            error!(
                chunk.id = chunk_id,
                parent.id = parent_id,
                backend = store.backend(),
                error = %e,
                "parent lookup failed"
            );
            None
        }
    }
}
