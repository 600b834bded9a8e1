//! Domain Layer
//!
//! Models for attached/unattached tree nodes, the group integrity checks,
//! and the `RecordStore` port every backend implements.

pub mod integrity;
pub mod models;
pub mod ports;

pub use models::{
    Bound, CmpOp, Field, NewNode, NodeDraft, NodeId, Predicate, RangeFilter, TreeGroup, TreeNode,
};
pub use integrity::{verify_rows, IntegrityReport, Violation};
pub use ports::{BatchOutcome, RangeShift, RecordStore, WriteBatch, WriteOp};
