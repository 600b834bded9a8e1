//! Index configuration
//!
//! ```rust,ignore
//! use nestedset_index::config::IndexConfig;
//!
//! // Defaults: in-memory store, 256-row cursor pages
//! let config = IndexConfig::default();
//!
//! // From YAML
//! let config = IndexConfig::from_yaml("index.yaml")?;
//! ```

pub mod error;
pub mod io;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use error::{ConfigError, ConfigResult};
pub use validation::Validatable;

/// Current YAML schema version
pub const CONFIG_VERSION: u32 = 1;

/// Top-level configuration for a `NestedSetIndex`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Schema version (always 1 for v1)
    pub version: u32,

    /// Rows fetched per store read by the descendants cursor (1..=100000)
    pub page_size: usize,

    /// Re-check the whole tree group inside every mutation batch, before it commits
    pub verify_after_mutation: bool,

    pub storage: StorageConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            page_size: 256,
            verify_after_mutation: false,
            storage: StorageConfig::default(),
        }
    }
}

impl IndexConfig {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn verify_after_mutation(mut self, enabled: bool) -> Self {
        self.verify_after_mutation = enabled;
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

/// Record store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Sqlite,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Storage backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: Backend,

    /// Database file; `None` with `sqlite` opens an in-memory database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// SQLite busy timeout in milliseconds (0..=600000)
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            path: None,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Sqlite,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn sqlite_in_memory() -> Self {
        Self {
            backend: Backend::Sqlite,
            path: None,
            ..Self::default()
        }
    }
}
