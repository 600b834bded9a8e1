//! Nested-set engine
//!
//! `NestedSetQuery` and `NestedSetMutator` translate tree operations into
//! range reads and write batches; `NestedSetIndex` composes them with the
//! per-group mutation guard.

mod guard;
pub mod index;
pub mod mutator;
pub mod query;

pub use index::NestedSetIndex;
pub use mutator::NestedSetMutator;
pub use query::{Descendants, NestedSetQuery};
