//! Tool-facing adapter over [`RetrievalEngine`].
//!
//! [`DocsToolset`] turns each retrieval operation into a text payload that a
//! tool-invocation transport can hand back to a caller. Failures are rendered
//! as error text rather than propagated, so no request ever surfaces as a
//! crash.
//!
//! # Example
//!
//! ```rust,ignore
//! use docs_rag::{DocsToolset, LookupArgs};
//!
//! let tools = DocsToolset::new(Arc::new(engine));
//! let output = tools
//!     .hierarchical_documentation_lookup(LookupArgs { query: "button styling".into(), limit: None })
//!     .await;
//! assert!(!output.is_error);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::corpus::Corpus;
use crate::error::RagError;
use crate::pipeline::{RetrievalEngine, SearchOptions};

/// Result count used when a caller omits `limit`.
pub const DEFAULT_LIMIT: usize = 5;
/// Largest result count a caller may request.
pub const MAX_LIMIT: usize = 20;

/// Clamp a caller-supplied limit into `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> usize {
    match limit {
        None => DEFAULT_LIMIT,
        Some(n) => n.clamp(1, MAX_LIMIT as i64) as usize,
    }
}

/// The payload of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text returned to the caller.
    pub text: String,
    /// Whether `text` describes a failure.
    pub is_error: bool,
}

impl ToolOutput {
    /// A successful payload.
    pub fn success(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: false }
    }

    /// A failure payload.
    pub fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: true }
    }

    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(text) => Self::success(text),
            Err(e) => {
                error!(error = %e, "failed to serialize tool output");
                Self::error(format!("failed to serialize result: {e}"))
            }
        }
    }
}

impl From<RagError> for ToolOutput {
    fn from(e: RagError) -> Self {
        Self::error(e.to_string())
    }
}

/// Arguments of the formatted lookup tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupArgs {
    /// Natural-language question.
    pub query: String,
    /// Maximum number of results (default 5, clamped to 1–20).
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Arguments of `search_chunks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchArgs {
    /// Natural-language question.
    pub query: String,
    /// Maximum number of results (default 5, clamped to 1–20).
    #[serde(default)]
    pub limit: Option<i64>,
    /// Results at or below this similarity are dropped.
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Corpus name; hierarchical when omitted.
    #[serde(default)]
    pub corpus: Option<String>,
}

/// Retrieval operations exposed as tools.
#[derive(Clone)]
pub struct DocsToolset {
    engine: Arc<RetrievalEngine>,
}

impl DocsToolset {
    /// Wrap an engine.
    pub fn new(engine: Arc<RetrievalEngine>) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Arc<RetrievalEngine> {
        &self.engine
    }

    /// Formatted lookup over the flat corpus.
    pub async fn documentation_lookup(&self, args: LookupArgs) -> ToolOutput {
        self.lookup(Corpus::Flat, args).await
    }

    /// Formatted lookup over the hierarchical corpus, with parent context.
    pub async fn hierarchical_documentation_lookup(&self, args: LookupArgs) -> ToolOutput {
        self.lookup(Corpus::Hierarchical, args).await
    }

    async fn lookup(&self, corpus: Corpus, args: LookupArgs) -> ToolOutput {
        let limit = clamp_limit(args.limit);
        info!(%corpus, query = %args.query, limit, "documentation lookup called");
        match self.engine.search(corpus, &args.query, SearchOptions::new(limit)).await {
            Ok(text) => ToolOutput::success(text),
            Err(e) => {
                warn!(%corpus, error = %e, "documentation lookup failed");
                e.into()
            }
        }
    }

    /// Structured search returning a JSON array of results.
    pub async fn search_chunks(&self, args: SearchArgs) -> ToolOutput {
        let corpus = match parse_corpus(args.corpus.as_deref()) {
            Ok(corpus) => corpus,
            Err(e) => return e.into(),
        };
        let options =
            SearchOptions::new(clamp_limit(args.limit)).with_threshold(args.threshold);
        info!(%corpus, query = %args.query, limit = options.limit, "search_chunks called");
        match self.engine.retrieve(corpus, &args.query, options).await {
            Ok(results) => ToolOutput::json(&results),
            Err(e) => {
                warn!(%corpus, error = %e, "search_chunks failed");
                e.into()
            }
        }
    }

    /// One chunk as JSON.
    pub async fn get_chunk(&self, id: &str, corpus: Option<&str>) -> ToolOutput {
        let corpus = match parse_corpus(corpus) {
            Ok(corpus) => corpus,
            Err(e) => return e.into(),
        };
        match self.engine.get_chunk(corpus, id).await {
            Ok(chunk) => ToolOutput::json(&chunk),
            Err(e) => e.into(),
        }
    }

    /// Every chunk of one component as JSON.
    pub async fn get_chunks_by_component(&self, component: &str, corpus: Option<&str>) -> ToolOutput {
        let corpus = match parse_corpus(corpus) {
            Ok(corpus) => corpus,
            Err(e) => return e.into(),
        };
        match self.engine.get_chunks_by_component(corpus, component).await {
            Ok(chunks) => ToolOutput::json(&chunks),
            Err(e) => e.into(),
        }
    }

    /// `{components, total}` as JSON.
    pub async fn list_components(&self, corpus: Option<&str>) -> ToolOutput {
        match parse_corpus(corpus) {
            Ok(corpus) => ToolOutput::json(&self.engine.list_components(corpus).await),
            Err(e) => e.into(),
        }
    }

    /// `{total_chunks, unique_components, avg_token_count}` as JSON.
    pub async fn get_stats(&self, corpus: Option<&str>) -> ToolOutput {
        let corpus = match parse_corpus(corpus) {
            Ok(corpus) => corpus,
            Err(e) => return e.into(),
        };
        match self.engine.stats(corpus).await {
            Ok(stats) => ToolOutput::json(&stats),
            Err(e) => e.into(),
        }
    }
}

fn parse_corpus(name: Option<&str>) -> Result<Corpus, RagError> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.parse(),
        None => Ok(Corpus::Hierarchical),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(clamp_limit(None), 5);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-3)), 1);
        assert_eq!(clamp_limit(Some(7)), 7);
        assert_eq!(clamp_limit(Some(500)), 20);
    }

    #[test]
    fn corpus_defaults_to_hierarchical() {
        assert_eq!(parse_corpus(None).unwrap(), Corpus::Hierarchical);
        assert_eq!(parse_corpus(Some(" ")).unwrap(), Corpus::Hierarchical);
        assert_eq!(parse_corpus(Some("flat")).unwrap(), Corpus::Flat);
        assert!(matches!(parse_corpus(Some("nested")), Err(RagError::InvalidRequest(_))));
    }

    #[test]
    fn lookup_args_accept_missing_limit() {
        let args: LookupArgs = serde_json::from_str(r#"{"query": "button"}"#).unwrap();
        assert_eq!(args.limit, None);
    }
}
