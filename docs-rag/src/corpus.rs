//! Corpus identifiers and validated table names.
//!
//! A corpus is one logical collection of chunks. The set of corpora is closed:
//! storage backends derive every query they issue from a [`Corpus`] and a
//! [`TableName`] validated at start-up, never from caller-supplied strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Maximum identifier length accepted by PostgreSQL without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// The chunking scheme a corpus was ingested with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corpus {
    /// Section chunks that may point at a parent section and carry demo code.
    Hierarchical,
    /// Independent chunks without parent links or demo code.
    Flat,
}

impl Corpus {
    /// All corpora, in a fixed order.
    pub const ALL: [Corpus; 2] = [Corpus::Hierarchical, Corpus::Flat];

    /// The canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Corpus::Hierarchical => "hierarchical",
            Corpus::Flat => "flat",
        }
    }

    /// Whether chunks in this corpus carry `parent_id` and `demo_code`.
    pub fn is_hierarchical(self) -> bool {
        matches!(self, Corpus::Hierarchical)
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Corpus {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hierarchical" => Ok(Corpus::Hierarchical),
            "flat" => Ok(Corpus::Flat),
            other => Err(RagError::InvalidRequest(format!(
                "unknown corpus '{other}' (expected 'hierarchical' or 'flat')"
            ))),
        }
    }
}

/// A SQL table identifier that passed validation.
///
/// Only `[A-Za-z_][A-Za-z0-9_]*` up to 63 bytes is accepted, so the value can be
/// embedded in a query template without quoting concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    /// Validate `name` as a plain SQL identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the name is empty, too long, or
    /// contains characters outside `[A-Za-z0-9_]`, or starts with a digit.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
            return Err(RagError::ConfigError(format!("invalid table name '{name}'")));
        }
        Ok(Self(name))
    }

    /// The validated identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TableName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        TableName::new(raw).map_err(serde::de::Error::custom)
    }
}

/// The table backing each corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusTables {
    /// Table holding the hierarchical corpus.
    pub hierarchical: TableName,
    /// Table holding the flat corpus.
    pub flat: TableName,
}

impl CorpusTables {
    /// The table for `corpus`.
    pub fn table(&self, corpus: Corpus) -> &TableName {
        match corpus {
            Corpus::Hierarchical => &self.hierarchical,
            Corpus::Flat => &self.flat,
        }
    }
}

impl Default for CorpusTables {
    fn default() -> Self {
        Self {
            hierarchical: TableName("chunks_hierarchical".to_string()),
            flat: TableName("chunks".to_string()),
        }
    }
}
