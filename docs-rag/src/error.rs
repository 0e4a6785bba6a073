//! Error types for the `docs-rag` crate.

use thiserror::Error;

/// Errors that can occur while answering a retrieval request.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding backend was unreachable, timed out, or returned an
    /// unusable vector. Fatal to the current request.
    #[error("Embedding failure ({provider}): {message}")]
    EmbeddingFailure {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A ranking, lookup, or aggregate call against the similarity store failed.
    #[error("Storage failure ({backend}): {message}")]
    StorageFailure {
        /// The storage backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A stored payload could not be decoded.
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// A point lookup yielded nothing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller supplied an unusable request (blank query, unknown corpus).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RagError {
    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingFailure { provider: provider.into(), message: message.into() }
    }

    pub(crate) fn storage(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageFailure { backend: backend.into(), message: message.into() }
    }

    /// Whether this error is a point-lookup miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
