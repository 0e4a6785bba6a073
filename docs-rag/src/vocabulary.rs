//! Component vocabulary cache and component-filter inference.
//!
//! The vocabulary of a corpus is loaded lazily on first use and kept for the
//! lifetime of the registry. Chunks ingested later are not seen until the
//! process restarts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::corpus::Corpus;
use crate::error::Result;

type Vocabulary = Arc<[String]>;

/// Lazily populated, per-corpus cache of distinct component names.
///
/// Each corpus gets one [`OnceCell`]; concurrent first uses wait on the same
/// initialization. A failed load leaves the cell empty so the next request
/// retries.
#[derive(Debug, Default)]
pub struct ComponentVocabulary {
    cells: Mutex<HashMap<Corpus, Arc<OnceCell<Vocabulary>>>>,
}

impl ComponentVocabulary {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, corpus: Corpus) -> Arc<OnceCell<Vocabulary>> {
        // The map only ever gains entries, so a poisoned lock still holds valid data.
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(corpus).or_default())
    }

    /// Return the cached vocabulary for `corpus`, loading it with `load` on
    /// first use.
    ///
    /// Loaded names are sorted and deduplicated so inference never depends on
    /// backend ordering.
    pub async fn get_or_load<F, Fut>(&self, corpus: Corpus, load: F) -> Result<Vocabulary>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        let cell = self.cell(corpus);
        let vocabulary = cell
            .get_or_try_init(|| async {
                let mut names = load().await?;
                names.sort();
                names.dedup();
                debug!(%corpus, components = names.len(), "cached component vocabulary");
                Ok::<_, crate::RagError>(Vocabulary::from(names))
            })
            .await?;
        Ok(Arc::clone(vocabulary))
    }

    /// The cached vocabulary, if it has been loaded.
    pub fn cached(&self, corpus: Corpus) -> Option<Vocabulary> {
        self.cell(corpus).get().cloned()
    }
}

/// Infer a component filter from raw query text.
///
/// Returns the first vocabulary entry, in the slice's order, whose lowercase
/// form occurs in the lowercase query. Callers pass a lexicographically
/// sorted vocabulary, so when several names match the lexicographically
/// smallest wins. Blank names never match.
pub fn extract_component_filter(query: &str, vocabulary: &[String]) -> Option<String> {
    let query = query.to_lowercase();
    vocabulary
        .iter()
        .filter(|name| !name.trim().is_empty())
        .find(|name| query.contains(&name.to_lowercase()))
        .cloned()
}
