//! Error types for nestedset-index

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{NodeId, TreeGroup};

/// Index error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Node has no stored row or carries invalid bounds
    NotAttached,
    /// Deletion target still has descendants
    NonLeafDeletion,
    /// Nodes from different tree groups mixed in one call
    CrossGroupOperation,
    /// Another mutation on the same tree group is in flight, or bounds moved underneath us
    ConcurrentModification,
    /// Record store (SQLite, in-memory) failure
    Store,
    /// Serialization/deserialization errors
    Serialization,
    /// Configuration errors
    Config,
    /// Post-mutation integrity check failed
    Integrity,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotAttached => "not_attached",
            ErrorKind::NonLeafDeletion => "non_leaf_deletion",
            ErrorKind::CrossGroupOperation => "cross_group_operation",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::Store => "store",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Config => "config",
            ErrorKind::Integrity => "integrity",
        }
    }

    /// Whether the caller may reasonably retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ConcurrentModification)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Index error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct IndexError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl IndexError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn not_attached(id: NodeId, group: TreeGroup) -> Self {
        Self::new(
            ErrorKind::NotAttached,
            format!("Node {} is not attached to tree group {}", id, group),
        )
    }

    pub fn invalid_bounds(id: NodeId, left: i64, right: i64) -> Self {
        Self::new(
            ErrorKind::NotAttached,
            format!("Node {} has invalid bounds ({}, {})", id, left, right),
        )
    }

    pub fn non_leaf(id: NodeId, left: i64, right: i64) -> Self {
        Self::new(
            ErrorKind::NonLeafDeletion,
            format!(
                "Node {} is not a leaf: interval ({}, {}) has width {}",
                id,
                left,
                right,
                right - left + 1
            ),
        )
    }

    pub fn cross_group(expected: TreeGroup, found: TreeGroup) -> Self {
        Self::new(
            ErrorKind::CrossGroupOperation,
            format!(
                "Tree group mismatch: operation targets group {}, node belongs to group {}",
                expected, found
            ),
        )
    }

    pub fn concurrent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConcurrentModification, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, message)
    }
}

// SQLite error conversions
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for IndexError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let busy = matches!(
            err.sqlite_error_code(),
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
        );
        if busy {
            IndexError::concurrent(format!("SQLite transaction conflict: {}", err)).with_source(err)
        } else {
            IndexError::store(format!("SQLite error: {}", err)).with_source(err)
        }
    }
}

// JSON error conversions
impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<ConfigError> for IndexError {
    fn from(err: ConfigError) -> Self {
        IndexError::new(ErrorKind::Config, err.to_string()).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IndexError>;
