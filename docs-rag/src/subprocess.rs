//! Subprocess embedding fallback.
//!
//! Runs the embedding model in an isolated interpreter that carries the model
//! dependency. The query text travels over the child's stdin and the vector
//! comes back as a JSON array on stdout. Each call is bounded by a hard
//! timeout; a child that overruns it is killed and the call fails.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, validate_embedding};
use crate::error::{RagError, Result};

const PROVIDER: &str = "subprocess";

/// Longest stderr excerpt carried into an error message.
const MAX_STDERR_CHARS: usize = 500;

/// Encodes stdin with sentence-transformers; the model name is `argv[1]`.
const SENTENCE_TRANSFORMERS_SCRIPT: &str = "\
import json, sys
from sentence_transformers import SentenceTransformer
model = SentenceTransformer(sys.argv[1])
text = sys.stdin.read()
print(json.dumps(model.encode(text, convert_to_tensor=False).tolist()))
";

/// An [`EmbeddingProvider`] that shells out once per query.
pub struct SubprocessEmbeddingProvider {
    program: String,
    args: Vec<String>,
    dimensions: usize,
    timeout: Duration,
}

impl SubprocessEmbeddingProvider {
    /// Run the bundled sentence-transformers script with the configured
    /// interpreter and model.
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            program: config.python.clone(),
            args: vec![
                "-c".to_string(),
                SENTENCE_TRANSFORMERS_SCRIPT.to_string(),
                config.model.clone(),
            ],
            dimensions: config.dimensions,
            timeout: config.timeout(),
        }
    }

    /// Run an arbitrary command that reads text on stdin and prints a JSON
    /// float array on stdout.
    pub fn with_command(
        program: impl Into<String>,
        args: Vec<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Self {
        Self { program: program.into(), args, dimensions, timeout }
    }

    async fn run(&self, text: &str) -> Result<std::process::Output> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(provider = PROVIDER, program = %self.program, error = %e, "spawn failed");
                RagError::embedding(PROVIDER, format!("failed to spawn '{}': {e}", self.program))
            })?;

        let input = text.as_bytes().to_vec();
        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                match stdin.write_all(&input).await {
                    // The child may exit without reading; its status tells the story.
                    Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            child.wait_with_output().await
        };

        // Dropping `exchange` on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RagError::embedding(PROVIDER, format!("I/O with child failed: {e}"))),
            Err(_) => {
                error!(provider = PROVIDER, timeout = ?self.timeout, "child timed out");
                Err(RagError::embedding(
                    PROVIDER,
                    format!("timed out after {:.1}s", self.timeout.as_secs_f64()),
                ))
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SubprocessEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, program = %self.program, text_len = text.len(), "embedding");

        let output = self.run(text).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
            error!(provider = PROVIDER, status = %output.status, "child failed");
            return Err(RagError::embedding(
                PROVIDER,
                format!("child exited with {}: {excerpt}", output.status),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let embedding: Vec<f32> = serde_json::from_str(stdout.trim()).map_err(|e| {
            RagError::embedding(PROVIDER, format!("stdout is not a JSON float array: {e}"))
        })?;

        validate_embedding(PROVIDER, &embedding, self.dimensions)?;
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
