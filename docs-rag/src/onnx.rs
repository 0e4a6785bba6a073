//! In-process ONNX sentence encoder.
//!
//! Loads an exported sentence-transformers model with the `ort` crate and
//! its HuggingFace tokenizer, then mean-pools the token embeddings under the
//! attention mask and L2-normalizes the result. This module is only available
//! when the `onnx` feature is enabled.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::embedding::{EmbeddingProvider, validate_embedding};
use crate::error::{RagError, Result};

const PROVIDER: &str = "onnx";

/// Longest token sequence fed to the encoder.
const MAX_SEQUENCE_LEN: usize = 512;

/// An [`EmbeddingProvider`] running the model inside this process.
pub struct OnnxEmbeddingProvider {
    // `Session::run` takes `&mut self`.
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
}

impl OnnxEmbeddingProvider {
    /// Load the model and tokenizer files.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingFailure`] if either file is missing or
    /// fails to load.
    pub fn load(model_path: &Path, tokenizer_path: &Path, dimensions: usize) -> Result<Self> {
        for path in [model_path, tokenizer_path] {
            if !path.exists() {
                return Err(RagError::embedding(
                    PROVIDER,
                    format!("file not found: {}", path.display()),
                ));
            }
        }

        let load_err = |e: ort::Error| {
            RagError::embedding(PROVIDER, format!("failed to load {}: {e}", model_path.display()))
        };
        let session = Session::builder()
            .map_err(load_err)?
            .with_intra_threads(2)
            .map_err(load_err)?
            .commit_from_file(model_path)
            .map_err(load_err)?;

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            RagError::embedding(
                PROVIDER,
                format!("failed to load tokenizer {}: {e}", tokenizer_path.display()),
            )
        })?;

        debug!(model = %model_path.display(), dimensions, "ONNX model loaded");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
        })
    }
}

fn infer(session: &Mutex<Session>, tokenizer: &Tokenizer, text: &str) -> Result<Vec<f32>> {
    let fail = |message: String| RagError::embedding(PROVIDER, message);

    let encoding =
        tokenizer.encode(text, true).map_err(|e| fail(format!("tokenization failed: {e}")))?;
    let len = encoding.get_ids().len().min(MAX_SEQUENCE_LEN);
    let ids: Vec<i64> = encoding.get_ids()[..len].iter().map(|&id| i64::from(id)).collect();
    let mask: Vec<i64> =
        encoding.get_attention_mask()[..len].iter().map(|&m| i64::from(m)).collect();

    let shape = vec![1i64, len as i64];
    let ids_tensor = Tensor::from_array((shape.clone(), ids))
        .map_err(|e| fail(format!("tensor creation failed: {e}")))?;
    let mask_tensor = Tensor::from_array((shape, mask.clone()))
        .map_err(|e| fail(format!("tensor creation failed: {e}")))?;

    let mut session = session.lock().map_err(|e| fail(format!("session lock poisoned: {e}")))?;
    let outputs = session
        .run(ort::inputs![ids_tensor, mask_tensor])
        .map_err(|e| fail(format!("inference failed: {e}")))?;

    let (_name, output) = outputs.iter().next().ok_or_else(|| fail("no output tensor".into()))?;
    let (shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| fail(format!("tensor extraction failed: {e}")))?;

    let pooled = match shape.len() {
        // [batch=1, seq, dims]: mean over unmasked tokens.
        3 => {
            let seq = shape[1] as usize;
            let dims = shape[2] as usize;
            let mut pooled = vec![0.0f32; dims];
            let mut weight = 0.0f32;
            for (s, &m) in mask.iter().enumerate().take(seq) {
                if m == 0 {
                    continue;
                }
                weight += 1.0;
                for (d, value) in pooled.iter_mut().enumerate() {
                    *value += data[s * dims + d];
                }
            }
            if weight > 0.0 {
                pooled.iter_mut().for_each(|v| *v /= weight);
            }
            pooled
        }
        // [batch=1, dims]: already pooled.
        2 => data[..shape[1] as usize].to_vec(),
        _ => return Err(fail(format!("unexpected output shape: {shape:?}"))),
    };

    let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
    Ok(if norm > f32::EPSILON { pooled.into_iter().map(|v| v / norm).collect() } else { pooled })
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();

        let embedding = tokio::task::spawn_blocking(move || infer(&session, &tokenizer, &text))
            .await
            .map_err(|e| RagError::embedding(PROVIDER, format!("inference task failed: {e}")))??;

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
