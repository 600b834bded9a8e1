//! In-Memory Record Store
//!
//! HashMap/BTreeMap-based implementation for tests and embedded use.
//! `apply` works on a copy of the tree group and swaps it in only when every
//! op succeeded, which gives the same all-or-nothing behaviour as a
//! database transaction.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::{
    verify_rows, BatchOutcome, NodeId, RangeFilter, RecordStore, TreeGroup, TreeNode, WriteBatch,
    WriteOp,
};
use crate::error::{IndexError, Result};

#[derive(Debug, Default)]
struct State {
    groups: HashMap<TreeGroup, BTreeMap<NodeId, TreeNode>>,
    owners: HashMap<NodeId, TreeGroup>,
    last_id: NodeId,
    last_group: TreeGroup,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all groups
    pub fn len(&self) -> usize {
        self.state.read().owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert rows verbatim, bypassing the engine
    #[cfg(test)]
    pub(crate) fn seed(&self, drafts: Vec<crate::domain::NodeDraft>) -> Vec<TreeNode> {
        let mut state = self.state.write();
        drafts
            .into_iter()
            .map(|draft| {
                state.last_id += 1;
                state.last_group = state.last_group.max(draft.tree_group);
                let node = draft.attach(state.last_id);
                state.owners.insert(node.id, node.tree_group);
                state
                    .groups
                    .entry(node.tree_group)
                    .or_default()
                    .insert(node.id, node.clone());
                node
            })
            .collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn allocate_group(&self) -> Result<TreeGroup> {
        let mut state = self.state.write();
        state.last_group += 1;
        Ok(state.last_group)
    }

    async fn get(&self, id: NodeId) -> Result<Option<TreeNode>> {
        let state = self.state.read();
        Ok(state
            .owners
            .get(&id)
            .and_then(|group| state.groups.get(group))
            .and_then(|rows| rows.get(&id))
            .cloned())
    }

    async fn range_read(&self, group: TreeGroup, filter: &RangeFilter) -> Result<Vec<TreeNode>> {
        let state = self.state.read();
        let Some(rows) = state.groups.get(&group) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<TreeNode> = rows
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        matched.sort_by_key(|n| n.left);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn count(&self, group: TreeGroup, filter: &RangeFilter) -> Result<usize> {
        let state = self.state.read();
        Ok(state
            .groups
            .get(&group)
            .map(|rows| rows.values().filter(|n| filter.matches(n)).count())
            .unwrap_or(0))
    }

    async fn apply(&self, group: TreeGroup, batch: WriteBatch) -> Result<BatchOutcome> {
        let mut state = self.state.write();

        let mut working = state.groups.get(&group).cloned().unwrap_or_default();
        let mut next_id = state.last_id;
        let mut outcome = BatchOutcome::default();
        let mut removed = Vec::new();

        for op in batch.ops() {
            match op {
                WriteOp::Expect { id, left, right } => {
                    let row = working
                        .get(id)
                        .ok_or_else(|| IndexError::not_attached(*id, group))?;
                    if row.left != *left || row.right != *right {
                        return Err(IndexError::concurrent(format!(
                            "Node {} moved from ({}, {}) to ({}, {})",
                            id, left, right, row.left, row.right
                        )));
                    }
                }
                WriteOp::Shift(shift) => {
                    for row in working.values_mut() {
                        if shift.apply_to(row) {
                            outcome.shifted += 1;
                        }
                    }
                }
                WriteOp::Insert(drafts) => {
                    for draft in drafts {
                        if draft.tree_group != group {
                            return Err(IndexError::cross_group(group, draft.tree_group));
                        }
                        next_id += 1;
                        let node = draft.clone().attach(next_id);
                        working.insert(node.id, node.clone());
                        outcome.inserted.push(node);
                    }
                }
                WriteOp::Delete(id) => {
                    working
                        .remove(id)
                        .ok_or_else(|| IndexError::not_attached(*id, group))?;
                    removed.push(*id);
                    outcome.deleted += 1;
                }
                WriteOp::Verify => {
                    let rows: Vec<TreeNode> = working.values().cloned().collect();
                    verify_rows(group, &rows).into_result()?;
                }
            }
        }

        // Commit
        state.last_id = next_id;
        for id in removed {
            state.owners.remove(&id);
        }
        for node in &outcome.inserted {
            state.owners.insert(node.id, group);
        }
        state.groups.insert(group, working);

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bound, CmpOp, NewNode, NodeDraft};
    use crate::error::ErrorKind;

    fn root_draft(group: TreeGroup) -> NodeDraft {
        NodeDraft {
            tree_group: group,
            parent_id: None,
            level: 0,
            left: 0,
            right: 1,
            name: "root".to_string(),
            attrs: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_allocate_group_is_monotonic() {
        let store = InMemoryRecordStore::new();
        let a = store.allocate_group().await.unwrap();
        let b = store.allocate_group().await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_in_order() {
        let store = InMemoryRecordStore::new();
        let group = store.allocate_group().await.unwrap();

        let batch = WriteBatch::new().insert(vec![root_draft(group), {
            let mut d = root_draft(group);
            d.name = "second".to_string();
            d
        }]);
        let outcome = store.apply(group, batch).await.unwrap();

        assert_eq!(outcome.inserted.len(), 2);
        assert!(outcome.inserted[0].id < outcome.inserted[1].id);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(outcome.inserted[1].id).await.unwrap().unwrap().name,
            "second"
        );
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_group_untouched() {
        let store = InMemoryRecordStore::new();
        let group = store.allocate_group().await.unwrap();
        let root = store
            .apply(group, WriteBatch::new().insert(vec![root_draft(group)]))
            .await
            .unwrap()
            .inserted
            .remove(0);

        // Shift succeeds, then the stale expectation aborts the batch
        let stale = TreeNode { right: 99, ..root.clone() };
        let batch = WriteBatch::new()
            .shift(Bound::Right, CmpOp::Ge, 0, 10)
            .expect(&stale);
        let err = store.apply(group, batch).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::ConcurrentModification);
        assert_eq!(store.get(root.id).await.unwrap().unwrap(), root);
    }

    #[tokio::test]
    async fn test_delete_missing_row_fails() {
        let store = InMemoryRecordStore::new();
        let group = store.allocate_group().await.unwrap();
        let err = store
            .apply(group, WriteBatch::new().delete(404))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotAttached);
    }

    #[tokio::test]
    async fn test_insert_into_other_group_rejected() {
        let store = InMemoryRecordStore::new();
        let err = store
            .apply(1, WriteBatch::new().insert(vec![root_draft(2)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CrossGroupOperation);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_range_read_orders_and_limits() {
        let store = InMemoryRecordStore::new();
        let root = store
            .apply(1, WriteBatch::new().insert(vec![root_draft(1)]))
            .await
            .unwrap()
            .inserted
            .remove(0);
        let children = crate::engine::NestedSetMutator::plan_insert(
            &root,
            vec![NewNode::new("a"), NewNode::new("b"), NewNode::new("c")],
        );
        store.apply(1, children).await.unwrap();

        let filter = RangeFilter::new().left(CmpOp::Gt, 0).limit(2);
        let page = store.range_read(1, &filter).await.unwrap();
        let names: Vec<_> = page.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.count(1, &filter).await.unwrap(), 3);
        assert!(store.range_read(2, &filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verify_failure_discards_batch() {
        let store = InMemoryRecordStore::new();
        let mut second = root_draft(1);
        second.left = 2;
        second.right = 3;
        let roots = store.seed(vec![root_draft(1), second]);

        let batch =
            crate::engine::NestedSetMutator::plan_insert(&roots[0], vec![NewNode::new("a")])
                .verify();
        let err = store.apply(1, batch).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Integrity);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(roots[0].id).await.unwrap().unwrap(), roots[0]);
    }
}
