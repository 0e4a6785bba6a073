//! Hierarchical semantic retrieval over component documentation.
//!
//! This crate provides:
//! - Embedding providers (remote HTTP, in-process ONNX, subprocess fallback)
//! - Similarity stores (PostgreSQL + pgvector, in-memory)
//! - Per-corpus component vocabulary cache and filter inference
//! - Single-hop parent-context resolution
//! - Result formatting and the [`RetrievalEngine`] orchestrator
//! - A tool-facing adapter, [`DocsToolset`]
//!
//! # Feature flags
//!
//! | Feature | Enables |
//! |---|---|
//! | `http` (default) | [`http::HttpEmbeddingProvider`] via `reqwest` |
//! | `pgvector` (default) | [`pgvector::PgVectorStore`] via `sqlx` |
//! | `onnx` | `onnx::OnnxEmbeddingProvider` via `ort` and `tokenizers` |

pub mod config;
pub mod context;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod error;
pub mod format;
pub mod inmemory;
pub mod pipeline;
pub mod store;
pub mod subprocess;
pub mod tool;
pub mod vocabulary;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "pgvector")]
pub mod pgvector;

pub use config::{EmbeddingBackend, EmbeddingConfig, EngineConfig, EngineConfigBuilder, StorageConfig};
pub use context::resolve_parent_contexts;
pub use corpus::{Corpus, CorpusTables, TableName};
pub use document::{
    Chunk, ComponentList, CorpusStats, DemoCode, DemoFile, ParentContext, SearchResult,
    StoredChunk,
};
pub use embedding::{EmbeddingProvider, provider_from_config, validate_embedding};
pub use error::{RagError, Result};
pub use format::{FormatOptions, NO_RESULTS, RESULT_DELIMITER, format_results};
pub use inmemory::InMemoryStore;
pub use pipeline::{RetrievalEngine, RetrievalEngineBuilder, SearchOptions};
pub use store::{RankRequest, SimilarityStore};
pub use subprocess::SubprocessEmbeddingProvider;
pub use tool::{DocsToolset, LookupArgs, SearchArgs, ToolOutput, clamp_limit};
pub use vocabulary::{ComponentVocabulary, extract_component_filter};

#[cfg(feature = "http")]
pub use http::HttpEmbeddingProvider;
#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbeddingProvider;
#[cfg(feature = "pgvector")]
pub use pgvector::PgVectorStore;
