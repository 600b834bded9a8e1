/*
 * nestedset-index - Nested-set tree index over pluggable record stores
 *
 * Hexagonal Architecture:
 * - domain/         : Tree node models, range filters, integrity checks, RecordStore port
 * - engine/         : Query, mutation, NestedSetIndex
 * - infrastructure/ : In-memory and SQLite record stores
 * - config/         : YAML configuration with validation
 *
 * Every node stores a (left, right) interval; descendants are the rows whose
 * left bound falls inside it. Subtree reads are one range scan, inserts and
 * leaf deletes shift the bounds to their right inside one atomic batch.
 */

//! # Usage
//!
//! ```rust,ignore
//! use nestedset_index::{InMemoryRecordStore, NestedSetIndex, NewNode};
//!
//! let index = NestedSetIndex::new(InMemoryRecordStore::new());
//! let root = index.insert_root(NewNode::new("R")).await?;
//! index
//!     .insert_children(&root, vec![NewNode::new("A"), NewNode::new("B")])
//!     .await?;
//!
//! let mut cursor = index.descendants(&root).await?;
//! while let Some(node) = cursor.next().await? {
//!     println!("{} at level {}", node.name, node.level);
//! }
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, IndexError, Result};

pub use config::{Backend, ConfigError, IndexConfig, StorageConfig, Validatable};

pub use domain::{
    verify_rows, BatchOutcome, Bound, CmpOp, Field, IntegrityReport, NewNode, NodeDraft, NodeId,
    Predicate, RangeFilter, RangeShift, RecordStore, TreeGroup, TreeNode, Violation, WriteBatch,
    WriteOp,
};

pub use engine::{Descendants, NestedSetIndex, NestedSetMutator, NestedSetQuery};

pub use infrastructure::{open_store, InMemoryRecordStore};

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteRecordStore;
