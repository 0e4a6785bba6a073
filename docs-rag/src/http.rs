//! Remote HTTP embedding provider.
//!
//! Speaks the Ollama `/api/embed` protocol: the request carries the model
//! identifier and the input text, the response carries one vector per input.
//! This module is only available when the `http` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, validate_embedding};
use crate::error::{RagError, Result};

const PROVIDER: &str = "http";

/// An [`EmbeddingProvider`] backed by a remote embedding endpoint.
///
/// Every call is bounded by the configured timeout; transport failures,
/// non-success statuses, and malformed bodies all surface as
/// [`RagError::EmbeddingFailure`].
///
/// # Example
///
/// ```rust,ignore
/// use docs_rag::{EmbeddingConfig, http::HttpEmbeddingProvider};
///
/// let provider = HttpEmbeddingProvider::new(&EmbeddingConfig::default())?;
/// let embedding = provider.embed("dialog with forms").await?;
/// ```
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbeddingProvider {
    /// Create a provider from the embedding settings.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RagError::embedding(PROVIDER, format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

// Ollama answers `/api/embed` with `embeddings`, the legacy `/api/embeddings`
// route with a single `embedding`.
#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

impl EmbedResponse {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match (self.embeddings, self.embedding) {
            (Some(batch), _) => batch,
            (None, Some(single)) => vec![single],
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(PROVIDER, "endpoint returned no vectors"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = EmbedRequest { model: &self.model, input: texts.to_vec() };

        let response =
            self.client.post(&self.url).json(&request_body).send().await.map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                error!(provider = PROVIDER, url = %self.url, error = %e, "request {kind}");
                RagError::embedding(PROVIDER, format!("request {kind}: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);

            error!(provider = PROVIDER, %status, "endpoint error");
            return Err(RagError::embedding(
                PROVIDER,
                format!("endpoint returned {status}: {detail}"),
            ));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::embedding(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        let vectors = parsed.into_vectors();
        if vectors.len() != texts.len() {
            return Err(RagError::embedding(
                PROVIDER,
                format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            ));
        }
        for vector in &vectors {
            validate_embedding(PROVIDER, vector, self.dimensions)?;
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Mount one response for `POST /api/embed` and return the endpoint URL.
    async fn mock_embed(server: &MockServer, response: ResponseTemplate) -> String {
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(response)
            .mount(server)
            .await;
        format!("{}/api/embed", server.uri())
    }

    fn provider(url: String, dimensions: usize, timeout_secs: u64) -> HttpEmbeddingProvider {
        let config = EmbeddingConfig { url, dimensions, timeout_secs, ..Default::default() };
        HttpEmbeddingProvider::new(&config).unwrap()
    }

    #[tokio::test]
    async fn extracts_single_vector_from_batch_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(json!({"model": "nomic-embed-text", "input": ["button"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "nomic-embed-text",
                "embeddings": [[0.1, 0.2, 0.3]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/api/embed", server.uri());
        let embedding = provider(url, 3, 5).embed("button").await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn accepts_legacy_single_embedding_shape() {
        let server = MockServer::start().await;
        let url = mock_embed(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"embedding": [1.0, 0.0]})),
        )
        .await;
        assert_eq!(provider(url, 2, 5).embed("x").await.unwrap(), vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn http_error_status_is_embedding_failure() {
        let server = MockServer::start().await;
        let url = mock_embed(
            &server,
            ResponseTemplate::new(500).set_body_json(json!({"error": "model not loaded"})),
        )
        .await;
        let err = provider(url, 3, 5).embed("button").await.unwrap_err();
        match err {
            RagError::EmbeddingFailure { message, .. } => {
                assert!(message.contains("500"), "{message}");
                assert!(message.contains("model not loaded"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_embedding_failure() {
        let server = MockServer::start().await;
        let url = mock_embed(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": "nope"})),
        )
        .await;
        let err = provider(url, 3, 5).embed("button").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure { .. }));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_embedding_failure() {
        let server = MockServer::start().await;
        let url = mock_embed(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.1, 0.2]]})),
        )
        .await;
        let err = provider(url, 768, 5).embed("button").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure { .. }));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        let url = mock_embed(
            &server,
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(json!({"embeddings": [[0.1, 0.2, 0.3]]})),
        )
        .await;
        let err = provider(url, 3, 1).embed("button").await.unwrap_err();
        match err {
            RagError::EmbeddingFailure { message, .. } => {
                assert!(message.contains("timed out"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_embedding_failure() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(format!("http://{addr}/api/embed"), 3, 5).embed("x").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure { .. }));
    }
}
