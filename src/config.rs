//! Load configuration: ingestion mode, tuning constants and column names.
//!
//! Configuration is a plain value owned by each load, so two sessions can
//! ingest different files with different settings side by side.

use crate::tsv::{LoadError, Result};
use std::fmt;
use std::str::FromStr;

/// Default chunk size for chunked loading (1 GiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024 * 1024;

/// Default leaf threshold below which a range is parsed directly (1 MiB).
pub const DEFAULT_LEAF_THRESHOLD: u64 = 1024 * 1024;

/// How the file bytes reach the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Map (or read) the whole file, then fork/join over all of it.
    #[default]
    InMemory,
    /// Walk the file in line-aligned chunks of bounded size; each task
    /// reads only its own byte range.
    Chunked,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::InMemory => write!(f, "in-memory"),
            LoadMode::Chunked => write!(f, "chunked"),
        }
    }
}

impl FromStr for LoadMode {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in-memory" | "memory" | "all" => Ok(LoadMode::InMemory),
            "chunked" | "chunks" => Ok(LoadMode::Chunked),
            other => Err(LoadError::InvalidConfig(format!(
                "unknown load mode '{}', expected 'in-memory' or 'chunked'",
                other
            ))),
        }
    }
}

/// Order in which colliding source identifiers receive alias suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AliasOrder {
    /// Suffixes follow first appearance in the file. Costs one extra
    /// parallel pass over the source column.
    #[default]
    FileOrder,
    /// Suffixes follow whichever task registers first; may differ
    /// between runs when base names collide.
    FirstSeen,
}

impl FromStr for AliasOrder {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" | "file-order" => Ok(AliasOrder::FileOrder),
            "first-seen" | "race" => Ok(AliasOrder::FirstSeen),
            other => Err(LoadError::InvalidConfig(format!(
                "unknown alias order '{}', expected 'file' or 'first-seen'",
                other
            ))),
        }
    }
}

/// Header names of the four required columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub group: String,
    pub source: String,
    pub series: String,
    pub value: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            group: "Genes".to_string(),
            source: "File.Name".to_string(),
            series: "Precursor.Id".to_string(),
            value: "Precursor.Normalised".to_string(),
        }
    }
}

/// Settings for one load.
///
/// # Example
///
/// ```
/// use precursor_pivot::config::{IngestConfig, LoadMode};
///
/// let config = IngestConfig::new()
///     .with_mode(LoadMode::Chunked)
///     .with_chunk_size(256 * 1024 * 1024)
///     .with_leaf_threshold(512 * 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub mode: LoadMode,
    /// Target chunk size in bytes for [`LoadMode::Chunked`].
    pub chunk_size: u64,
    /// Ranges at or below this many bytes are parsed without splitting.
    pub leaf_threshold: u64,
    pub columns: ColumnNames,
    pub alias_order: AliasOrder,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestConfig {
    /// Default settings: in-memory mode, file-order aliases, standard column names.
    pub fn new() -> Self {
        Self {
            mode: LoadMode::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            leaf_threshold: DEFAULT_LEAF_THRESHOLD,
            columns: ColumnNames::default(),
            alias_order: AliasOrder::default(),
        }
    }

    /// Set the load mode.
    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the chunk size in bytes.
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set the leaf threshold in bytes.
    pub fn with_leaf_threshold(mut self, bytes: u64) -> Self {
        self.leaf_threshold = bytes;
        self
    }

    /// Set the header names of the required columns.
    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    /// Set the alias suffix order.
    pub fn with_alias_order(mut self, order: AliasOrder) -> Self {
        self.alias_order = order;
        self
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(LoadError::InvalidConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.leaf_threshold == 0 {
            return Err(LoadError::InvalidConfig(
                "leaf threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
