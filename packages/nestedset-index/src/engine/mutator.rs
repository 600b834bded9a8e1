//! Bound-shifting mutations
//!
//! Insertion makes room then fills it: every bound to the right of the
//! insertion point moves by `2 * n`, after which the `n` new leaves take the
//! freed positions directly after the parent's left bound. Leaf deletion is
//! the inverse with `n = 1`.
//!
//! Both shifts use the anchor's pre-shift left bound as threshold. The left
//! shift is strict (`>`) so the anchor's own left edge stays put; the right
//! shift is inclusive (`>=`) so the anchor's right edge and every enclosing
//! ancestor's right edge move with it. Keep these thresholds exactly as they
//! are: they are what makes ancestor intervals grow and shrink correctly.

use tracing::debug;

use crate::domain::{
    Bound, CmpOp, NewNode, NodeDraft, RecordStore, TreeGroup, TreeNode, WriteBatch,
};
use crate::error::{IndexError, Result};

use super::query::ensure_bounds;

#[derive(Debug, Clone, Copy, Default)]
pub struct NestedSetMutator {
    verify: bool,
}

impl NestedSetMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the whole tree group inside each batch, before it commits
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify = enabled;
        self
    }

    fn seal(&self, batch: WriteBatch) -> WriteBatch {
        if self.verify {
            batch.verify()
        } else {
            batch
        }
    }

    /// Batch attaching `new_nodes` as the first children of `parent`, in order
    pub(crate) fn plan_insert(parent: &TreeNode, new_nodes: Vec<NewNode>) -> WriteBatch {
        let offset = 2 * new_nodes.len() as i64;
        let left_step = parent.left + 1;

        let drafts = new_nodes
            .into_iter()
            .enumerate()
            .map(|(i, node)| {
                let left = left_step + 2 * i as i64;
                NodeDraft {
                    tree_group: parent.tree_group,
                    parent_id: Some(parent.id),
                    level: parent.level + 1,
                    left,
                    right: left + 1,
                    name: node.name,
                    attrs: node.attrs,
                }
            })
            .collect();

        let batch = WriteBatch::new().expect(parent);
        shift_from(batch, parent.left, offset).insert(drafts)
    }

    /// Batch creating the single root of a fresh tree group
    pub(crate) fn plan_root(tree_group: TreeGroup, node: NewNode) -> WriteBatch {
        WriteBatch::new().insert(vec![NodeDraft {
            tree_group,
            parent_id: None,
            level: 0,
            left: 0,
            right: 1,
            name: node.name,
            attrs: node.attrs,
        }])
    }

    /// Batch removing leaf `node` and closing the gap it leaves
    pub(crate) fn plan_delete_leaf(node: &TreeNode) -> Result<WriteBatch> {
        ensure_bounds(node)?;
        if !node.is_leaf() {
            return Err(IndexError::non_leaf(node.id, node.left, node.right));
        }

        let batch = WriteBatch::new().expect(node).delete(node.id);
        Ok(shift_from(batch, node.left, -2))
    }

    pub async fn insert_children<S>(
        &self,
        store: &S,
        parent: &TreeNode,
        new_nodes: Vec<NewNode>,
    ) -> Result<Vec<TreeNode>>
    where
        S: RecordStore + ?Sized,
    {
        if new_nodes.is_empty() {
            return Ok(Vec::new());
        }
        ensure_bounds(parent)?;

        let count = new_nodes.len();
        let batch = self.seal(Self::plan_insert(parent, new_nodes));
        let outcome = store.apply(parent.tree_group, batch).await?;

        debug!(
            tree_group = parent.tree_group,
            parent_id = parent.id,
            inserted = count,
            offset = 2 * count,
            shifted = outcome.shifted,
            verified = self.verify,
            "inserted children"
        );
        Ok(outcome.inserted)
    }

    pub async fn insert_root<S>(&self, store: &S, tree_group: TreeGroup, node: NewNode) -> Result<TreeNode>
    where
        S: RecordStore + ?Sized,
    {
        let outcome = store
            .apply(tree_group, self.seal(Self::plan_root(tree_group, node)))
            .await?;

        let root = outcome
            .inserted
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::store("Store committed root insert without returning the row"))?;
        debug!(tree_group, root_id = root.id, "created tree");
        Ok(root)
    }

    pub async fn delete_leaf<S>(&self, store: &S, node: &TreeNode) -> Result<()>
    where
        S: RecordStore + ?Sized,
    {
        let batch = self.seal(Self::plan_delete_leaf(node)?);
        let outcome = store.apply(node.tree_group, batch).await?;

        debug!(
            tree_group = node.tree_group,
            node_id = node.id,
            shifted = outcome.shifted,
            "deleted leaf"
        );
        Ok(())
    }
}

/// Move every bound at or right of `anchor`'s insertion point by `delta`
///
/// The two shifts only ever travel together; either one alone leaves
/// overlapping intervals behind.
fn shift_from(batch: WriteBatch, anchor: i64, delta: i64) -> WriteBatch {
    batch
        .shift(Bound::Left, CmpOp::Gt, anchor, delta)
        .shift(Bound::Right, CmpOp::Ge, anchor, delta)
}
