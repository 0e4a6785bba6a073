//! Data types for chunks, search results, and corpus summaries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{RagError, Result};

/// One example file attached to a documentation chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DemoFile {
    /// Filename-like key, e.g. `button-styling.demo.tsx`.
    pub file: String,
    /// The code-block body.
    pub code: String,
}

/// Decoded demo code for a chunk, in the order it was received.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DemoCode(Vec<DemoFile>);

impl DemoCode {
    /// Build from already-decoded files.
    pub fn new(files: Vec<DemoFile>) -> Self {
        Self(files)
    }

    /// Decode a stored demo-code payload.
    ///
    /// Accepts a JSON object mapping filename to code, an array of
    /// `{"file", "code"}` objects, `null`, or either form double-encoded as a
    /// JSON string. Object key order is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DecodeFailure`] for anything else.
    pub fn decode(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| RagError::DecodeFailure(format!("demo_code is not valid JSON: {e}")))?;

        match value {
            // Stored as a JSON string holding the serialized mapping.
            Value::String(inner) => match serde_json::from_str::<Value>(&inner) {
                Ok(Value::String(_)) | Err(_) => Err(RagError::DecodeFailure(
                    "demo_code string does not contain a mapping".to_string(),
                )),
                Ok(value) => Self::from_value(value),
            },
            value => Self::from_value(value),
        }
    }

    /// Decode `raw`, degrading to an empty mapping on failure.
    ///
    /// The failure is logged against `chunk_id` so one bad payload never
    /// affects other results.
    pub fn decode_or_empty(raw: Option<&str>, chunk_id: &str) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        Self::decode(raw).unwrap_or_else(|e| {
            warn!(chunk.id = chunk_id, error = %e, "dropping undecodable demo code");
            Self::default()
        })
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => map
                .into_iter()
                .map(|(file, code)| match code {
                    Value::String(code) => Ok(DemoFile { file, code }),
                    other => Err(RagError::DecodeFailure(format!(
                        "demo_code entry '{file}' is {} rather than a string",
                        json_kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self),
            Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    serde_json::from_value::<DemoFile>(item).map_err(|e| {
                        RagError::DecodeFailure(format!("invalid demo_code array entry: {e}"))
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(Self),
            other => Err(RagError::DecodeFailure(format!(
                "demo_code is {} rather than a mapping",
                json_kind(&other)
            ))),
        }
    }

    /// Whether there are no demo files.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of demo files.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the demo files in received order.
    pub fn iter(&self) -> std::slice::Iter<'_, DemoFile> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a DemoCode {
    type Item = &'a DemoFile;
    type IntoIter = std::slice::Iter<'a, DemoFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A chunk row as held by a storage backend, before decoding.
///
/// This is also the shape of a JSON corpus export accepted by
/// [`InMemoryStore::load_json`](crate::inmemory::InMemoryStore::load_json).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredChunk {
    /// Unique identifier.
    pub id: String,
    /// The component the chunk documents.
    pub component: String,
    /// Location of the chunk in the document hierarchy.
    pub section_path: String,
    /// The textual body.
    pub content: String,
    /// Optional reference to the parent chunk.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Serialized demo-code payload, decoded lazily.
    #[serde(default)]
    pub demo_code: Option<String>,
    /// Advisory size metric.
    #[serde(default)]
    pub token_count: i64,
    /// The chunk's embedding vector.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl StoredChunk {
    /// Decode into a [`Chunk`], dropping undecodable demo code.
    pub fn to_chunk(&self) -> Chunk {
        Chunk {
            id: self.id.clone(),
            component: self.component.clone(),
            section_path: self.section_path.clone(),
            content: self.content.clone(),
            parent_id: self.parent_id.clone(),
            demo_code: DemoCode::decode_or_empty(self.demo_code.as_deref(), &self.id),
            token_count: self.token_count,
            embedding: Vec::new(),
        }
    }
}

/// A unit of documentation content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier.
    pub id: String,
    /// The component the chunk documents (e.g. `button`).
    pub component: String,
    /// Location of the chunk in the document hierarchy (e.g. `button/usage/styling`).
    pub section_path: String,
    /// The textual body.
    pub content: String,
    /// Optional reference to the parent chunk.
    pub parent_id: Option<String>,
    /// Decoded demo code, empty when absent or undecodable.
    #[serde(default)]
    pub demo_code: DemoCode,
    /// Advisory size metric.
    pub token_count: i64,
    /// The embedding; left empty when read back from storage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

/// The immediate parent section attached to a result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParentContext {
    /// The parent's section path.
    pub section_path: String,
    /// The parent's content.
    pub content: String,
}

/// A ranked [`Chunk`] with its similarity and resolved parent context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Similarity to the query (higher is closer).
    pub similarity: f32,
    /// Parent section, present only when `parent_id` resolved.
    pub parent_context: Option<ParentContext>,
}

impl SearchResult {
    /// A ranked chunk without parent context.
    pub fn new(chunk: Chunk, similarity: f32) -> Self {
        Self { chunk, similarity, parent_context: None }
    }
}

/// Aggregate snapshot of a corpus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CorpusStats {
    /// Number of chunks.
    pub total_chunks: u64,
    /// Number of distinct components.
    pub unique_components: u64,
    /// Mean token count, rounded to one decimal place.
    pub avg_token_count: f64,
}

impl CorpusStats {
    /// Build a snapshot, rounding the average and treating a missing
    /// average (empty corpus) as zero.
    pub fn new(total_chunks: u64, unique_components: u64, avg_token_count: Option<f64>) -> Self {
        let avg = avg_token_count.filter(|v| v.is_finite()).unwrap_or(0.0);
        Self { total_chunks, unique_components, avg_token_count: (avg * 10.0).round() / 10.0 }
    }
}

/// The distinct component names of a corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentList {
    /// Component names in lexicographic order.
    pub components: Vec<String>,
    /// Number of components.
    pub total: usize,
}

impl From<Vec<String>> for ComponentList {
    fn from(components: Vec<String>) -> Self {
        let total = components.len();
        Self { components, total }
    }
}
