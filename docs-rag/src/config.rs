//! Configuration for the retrieval engine.
//!
//! Every setting has a default, so an empty environment yields a working
//! local setup (Ollama on `localhost:11434`, PostgreSQL on `localhost:5432`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::corpus::{CorpusTables, TableName};
use crate::error::{RagError, Result};

/// Default remote embedding endpoint (Ollama-compatible).
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11434/api/embed";
/// Default model for the remote HTTP backend.
pub const DEFAULT_HTTP_MODEL: &str = "nomic-embed-text";
/// Default model for the local (in-process or subprocess) backend.
pub const DEFAULT_LOCAL_MODEL: &str = "all-mpnet-base-v2";

/// Which embedding backend family to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// A remote inference service reached over HTTP.
    #[default]
    Http,
    /// An in-process model when available, otherwise the subprocess fallback.
    Local,
}

impl FromStr for EmbeddingBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "remote" => Ok(Self::Http),
            "local" | "subprocess" | "onnx" => Ok(Self::Local),
            other => Err(RagError::ConfigError(format!("unknown embedding backend '{other}'"))),
        }
    }
}

/// Embedding backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Backend family.
    pub backend: EmbeddingBackend,
    /// Endpoint for the HTTP backend.
    pub url: String,
    /// Model identifier sent to (or loaded by) the backend.
    pub model: String,
    /// Expected vector length; responses of any other length are rejected.
    pub dimensions: usize,
    /// Hard limit for one embedding call, in seconds.
    pub timeout_secs: u64,
    /// Interpreter used by the subprocess fallback.
    pub python: String,
    /// ONNX model file for the in-process backend.
    pub onnx_model: Option<PathBuf>,
    /// Tokenizer file for the in-process backend.
    pub onnx_tokenizer: Option<PathBuf>,
}

impl EmbeddingConfig {
    /// The per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Http,
            url: DEFAULT_EMBEDDING_URL.to_string(),
            model: DEFAULT_HTTP_MODEL.to_string(),
            dimensions: 768,
            timeout_secs: 30,
            python: "python3".to_string(),
            onnx_model: None,
            onnx_tokenizer: None,
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Login role.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Pool size; each concurrent request borrows its own connection.
    pub max_connections: u32,
    /// Statement and pool-acquire timeout, in seconds.
    pub timeout_secs: u64,
}

impl StorageConfig {
    /// The statement/acquire timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Hand-written so the password never reaches logs.
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "marigold_rag".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 5,
            timeout_secs: 10,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Embedding backend settings.
    pub embedding: EmbeddingConfig,
    /// Storage connection settings.
    pub storage: StorageConfig,
    /// Table backing each corpus.
    pub tables: CorpusTables,
    /// Threshold applied to lookups that do not pass their own.
    pub similarity_threshold: Option<f32>,
}

impl EngineConfig {
    /// Create a new builder for constructing an [`EngineConfig`].
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] only for overrides that can never
    /// work (invalid table identifiers). Absent variables use defaults and
    /// malformed numeric values are logged and replaced by defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = EmbeddingConfig::default();
        let backend = match get("EMBEDDING_BACKEND") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(key = "EMBEDDING_BACKEND", value = %raw, error = %e, "using default");
                defaults.backend
            }),
            None => defaults.backend,
        };
        let model = get("EMBEDDING_MODEL").unwrap_or_else(|| match backend {
            EmbeddingBackend::Http => DEFAULT_HTTP_MODEL.to_string(),
            EmbeddingBackend::Local => DEFAULT_LOCAL_MODEL.to_string(),
        });
        let embedding = EmbeddingConfig {
            backend,
            url: get("EMBEDDING_URL").unwrap_or(defaults.url),
            model,
            dimensions: parse_or(&get, "EMBEDDING_DIMENSIONS", defaults.dimensions),
            timeout_secs: parse_or(&get, "EMBEDDING_TIMEOUT_SECS", defaults.timeout_secs),
            python: get("EMBEDDING_PYTHON").unwrap_or(defaults.python),
            onnx_model: get("EMBEDDING_ONNX_MODEL").map(PathBuf::from),
            onnx_tokenizer: get("EMBEDDING_ONNX_TOKENIZER").map(PathBuf::from),
        };

        let defaults = StorageConfig::default();
        let storage = StorageConfig {
            host: get("DB_HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "DB_PORT", defaults.port),
            database: get("DB_NAME").unwrap_or(defaults.database),
            user: get("DB_USER").unwrap_or(defaults.user),
            password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
            max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", defaults.max_connections),
            timeout_secs: parse_or(&get, "DB_TIMEOUT_SECS", defaults.timeout_secs),
        };

        let defaults = CorpusTables::default();
        let tables = CorpusTables {
            hierarchical: match get("HIERARCHICAL_TABLE") {
                Some(name) => TableName::new(name)?,
                None => defaults.hierarchical,
            },
            flat: match get("FLAT_TABLE") {
                Some(name) => TableName::new(name)?,
                None => defaults.flat,
            },
        };

        let similarity_threshold = get("SIMILARITY_THRESHOLD").and_then(|raw| {
            raw.parse::<f32>()
                .map_err(|e| {
                    warn!(key = "SIMILARITY_THRESHOLD", value = %raw, error = %e, "ignoring");
                })
                .ok()
        });

        EngineConfigBuilder {
            config: EngineConfig { embedding, storage, tables, similarity_threshold },
        }
        .build()
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr + Copy,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!(key, value = %raw, error = %e, "malformed setting, using default");
            default
        }),
        None => default,
    }
}

/// Builder for constructing a validated [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the embedding backend settings.
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    /// Set the storage connection settings.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    /// Set the corpus tables.
    pub fn tables(mut self, tables: CorpusTables) -> Self {
        self.config.tables = tables;
        self
    }

    /// Set the default similarity threshold.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Build the [`EngineConfig`], validating that parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `embedding.dimensions == 0`
    /// - either timeout is zero
    /// - `storage.max_connections == 0`
    /// - the similarity threshold is not finite
    pub fn build(self) -> Result<EngineConfig> {
        let config = self.config;
        if config.embedding.dimensions == 0 {
            return Err(RagError::ConfigError("embedding dimensions must be positive".into()));
        }
        if config.embedding.timeout_secs == 0 || config.storage.timeout_secs == 0 {
            return Err(RagError::ConfigError("timeouts must be at least one second".into()));
        }
        if config.storage.max_connections == 0 {
            return Err(RagError::ConfigError("max_connections must be greater than zero".into()));
        }
        if config.similarity_threshold.is_some_and(|t| !t.is_finite()) {
            return Err(RagError::ConfigError("similarity threshold must be finite".into()));
        }
        Ok(config)
    }
}
