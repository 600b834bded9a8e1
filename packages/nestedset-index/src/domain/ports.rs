//! Record Store Port (Trait Interface)
//!
//! Port/Adapter pattern for backend flexibility:
//! - Persistent: SQLite
//! - Testing: InMemory
//!
//! The engine never touches rows directly. Reads go through `range_read` /
//! `count` / `get`; every mutation is handed over as one `WriteBatch` that the
//! store must apply all-or-nothing.

use async_trait::async_trait;

use super::models::{Bound, CmpOp, NodeDraft, NodeId, RangeFilter, TreeGroup, TreeNode};
use crate::error::Result;

/// Record Store Port (Primary Interface)
///
/// All storage backends must implement this trait
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reserve a tree group that has never been used
    async fn allocate_group(&self) -> Result<TreeGroup>;

    /// Get row by id
    async fn get(&self, id: NodeId) -> Result<Option<TreeNode>>;

    /// Rows of `group` matching `filter`, ordered by `left` ascending
    async fn range_read(&self, group: TreeGroup, filter: &RangeFilter) -> Result<Vec<TreeNode>>;

    /// Number of rows of `group` matching `filter` (`limit` ignored)
    async fn count(&self, group: TreeGroup, filter: &RangeFilter) -> Result<usize>;

    /// Apply every op of `batch` to `group` in one transaction
    ///
    /// On any error nothing is committed, including an `Integrity` failure
    /// from a `Verify` op.
    async fn apply(&self, group: TreeGroup, batch: WriteBatch) -> Result<BatchOutcome>;
}

/// Range shift: `bound += delta` for every row where `bound op threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeShift {
    pub bound: Bound,
    pub op: CmpOp,
    pub threshold: i64,
    pub delta: i64,
}

impl RangeShift {
    pub fn selects(&self, node: &TreeNode) -> bool {
        let value = match self.bound {
            Bound::Left => node.left,
            Bound::Right => node.right,
        };
        self.op.eval(value, self.threshold)
    }

    /// Shift `node` in place if selected; returns whether it moved
    pub fn apply_to(&self, node: &mut TreeNode) -> bool {
        if !self.selects(node) {
            return false;
        }
        match self.bound {
            Bound::Left => node.left += self.delta,
            Bound::Right => node.right += self.delta,
        }
        true
    }
}

/// Single step of a write batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Abort with `ConcurrentModification` unless row `id` still has these bounds
    Expect { id: NodeId, left: i64, right: i64 },
    Shift(RangeShift),
    Insert(Vec<NodeDraft>),
    Delete(NodeId),
    /// Abort with `Integrity` unless the group as written so far passes `verify_rows`
    Verify,
}

/// Ordered, atomic unit of work
///
/// Only the engine builds batches, so a caller can never issue a partial
/// shift. Stores read the ops through [`WriteBatch::ops`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn expect(mut self, node: &TreeNode) -> Self {
        self.ops.push(WriteOp::Expect {
            id: node.id,
            left: node.left,
            right: node.right,
        });
        self
    }

    pub(crate) fn shift(mut self, bound: Bound, op: CmpOp, threshold: i64, delta: i64) -> Self {
        self.ops.push(WriteOp::Shift(RangeShift {
            bound,
            op,
            threshold,
            delta,
        }));
        self
    }

    pub(crate) fn insert(mut self, drafts: Vec<NodeDraft>) -> Self {
        self.ops.push(WriteOp::Insert(drafts));
        self
    }

    pub(crate) fn delete(mut self, id: NodeId) -> Self {
        self.ops.push(WriteOp::Delete(id));
        self
    }

    pub(crate) fn verify(mut self) -> Self {
        self.ops.push(WriteOp::Verify);
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// What a committed batch did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Inserted rows with their assigned ids, in draft order
    pub inserted: Vec<TreeNode>,
    /// Total rows touched by shift ops (a row hit by two shifts counts twice)
    pub shifted: usize,
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_shift_threshold_strictness() {
        let mut parent = TreeNode::new(1, 1, None, 0, 0, 1, "p");

        let strict = RangeShift {
            bound: Bound::Left,
            op: CmpOp::Gt,
            threshold: 0,
            delta: 2,
        };
        assert!(!strict.apply_to(&mut parent));
        assert_eq!(parent.left, 0);

        let inclusive = RangeShift {
            bound: Bound::Right,
            op: CmpOp::Ge,
            threshold: 0,
            delta: 2,
        };
        assert!(inclusive.apply_to(&mut parent));
        assert_eq!(parent.right, 3);
    }

    #[test]
    fn test_batch_keeps_op_order() {
        let node = TreeNode::new(3, 1, Some(1), 1, 1, 2, "leaf");
        let batch = WriteBatch::new()
            .expect(&node)
            .delete(3)
            .shift(Bound::Left, CmpOp::Gt, 1, -2)
            .shift(Bound::Right, CmpOp::Ge, 1, -2);

        assert_eq!(batch.ops().len(), 4);
        assert!(matches!(batch.ops()[0], WriteOp::Expect { id: 3, left: 1, right: 2 }));
        assert!(matches!(batch.ops()[1], WriteOp::Delete(3)));
        assert!(matches!(
            batch.ops()[3],
            WriteOp::Shift(RangeShift { bound: Bound::Right, op: CmpOp::Ge, .. })
        ));
    }
}
