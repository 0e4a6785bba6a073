//! Embedding provider trait for turning query text into vectors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
#[cfg(feature = "onnx")]
use tracing::warn;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::{RagError, Result};
use crate::subprocess::SubprocessEmbeddingProvider;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap one embedding backend (remote HTTP service,
/// in-process model, isolated subprocess) behind a unified async interface.
/// Output is deterministic for a fixed backend and model version. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially.
///
/// # Example
///
/// ```rust,ignore
/// use docs_rag::EmbeddingProvider;
///
/// let provider = HttpEmbeddingProvider::new(&config)?;
/// let embedding = provider.embed("How do I style a button?").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;
}

/// Reject vectors that cannot be used as a similarity key.
///
/// # Errors
///
/// Returns [`RagError::EmbeddingFailure`] if the vector is empty, has the
/// wrong length, or contains NaN/infinite values.
pub fn validate_embedding(provider: &str, embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.is_empty() {
        return Err(RagError::embedding(provider, "backend returned an empty vector"));
    }
    if embedding.len() != expected {
        return Err(RagError::embedding(
            provider,
            format!("expected {expected} dimensions, got {}", embedding.len()),
        ));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(RagError::embedding(provider, "vector contains non-finite values"));
    }
    Ok(())
}

/// Construct the provider selected by `config`.
///
/// `Http` builds the remote provider. `Local` prefers the in-process ONNX
/// encoder when the crate is compiled with `onnx` and the model files load,
/// and otherwise falls back to the subprocess provider. The choice is made
/// once here, never per call.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if `Http` is requested without the
/// `http` feature, or the error from building the HTTP client.
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.backend {
        EmbeddingBackend::Http => http_provider(config),
        EmbeddingBackend::Local => {
            if let Some(provider) = in_process_provider(config) {
                return Ok(provider);
            }
            info!(program = %config.python, model = %config.model, "using subprocess embedding fallback");
            Ok(Arc::new(SubprocessEmbeddingProvider::new(config)))
        }
    }
}

#[cfg(feature = "http")]
fn http_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    info!(url = %config.url, model = %config.model, "using HTTP embedding backend");
    Ok(Arc::new(crate::http::HttpEmbeddingProvider::new(config)?))
}

#[cfg(not(feature = "http"))]
fn http_provider(_config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(RagError::ConfigError("the HTTP embedding backend requires the `http` feature".into()))
}

#[cfg(feature = "onnx")]
fn in_process_provider(config: &EmbeddingConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    let (Some(model), Some(tokenizer)) = (&config.onnx_model, &config.onnx_tokenizer) else {
        return None;
    };
    match crate::onnx::OnnxEmbeddingProvider::load(model, tokenizer, config.dimensions) {
        Ok(provider) => {
            info!(model = %model.display(), "using in-process ONNX embedding backend");
            Some(Arc::new(provider))
        }
        Err(e) => {
            warn!(error = %e, "in-process model unavailable");
            None
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn in_process_provider(_config: &EmbeddingConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_backend_without_model_files_uses_subprocess() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Local,
            onnx_model: None,
            ..Default::default()
        };
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.name(), "subprocess");
        assert_eq!(provider.dimensions(), 768);
    }

    #[cfg(feature = "http")]
    #[test]
    fn http_backend_is_default() {
        let provider = provider_from_config(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.name(), "http");
    }

    #[test]
    fn accepts_well_formed_vectors() {
        assert!(validate_embedding("test", &[0.1, 0.2, 0.3], 3).is_ok());
    }

    #[test]
    fn rejects_empty_mismatched_and_nan_vectors() {
        assert!(validate_embedding("test", &[], 3).is_err());
        assert!(validate_embedding("test", &[0.1, 0.2], 3).is_err());
        let err = validate_embedding("test", &[0.1, f32::NAN, 0.3], 3).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure { .. }));
    }
}
