//! NestedSetIndex: the public contract
//!
//! Composes `NestedSetQuery` and `NestedSetMutator` over an injected
//! `RecordStore`. Before delegating, every call resolves the caller's node to
//! its stored row (bounds held by callers go stale as siblings come and go),
//! and every mutation claims its tree group for the duration of the call.
//! With `verify_after_mutation` set, each mutation batch re-checks its whole
//! tree group before committing, so a failed check leaves the group untouched.
//!
//! # Examples
//!
//! ```rust,ignore
//! use nestedset_index::{InMemoryRecordStore, NestedSetIndex, NewNode};
//!
//! let index = NestedSetIndex::new(InMemoryRecordStore::new());
//! let root = index.insert_root(NewNode::new("R")).await?;
//! let kids = index
//!     .insert_children(&root, vec![NewNode::new("A"), NewNode::new("B")])
//!     .await?;
//! assert_eq!(index.depth(&kids[0]).await?, 1);
//! ```

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{IndexConfig, Validatable};
use crate::domain::{
    verify_rows, IntegrityReport, NewNode, NodeId, RangeFilter, RecordStore, TreeGroup, TreeNode,
};
use crate::error::{ErrorKind, IndexError, Result};
use crate::infrastructure::open_store;

use super::guard::{GroupGuard, GroupLocks};
use super::mutator::NestedSetMutator;
use super::query::{Descendants, NestedSetQuery};

pub struct NestedSetIndex<S: ?Sized> {
    config: IndexConfig,
    query: NestedSetQuery,
    mutator: NestedSetMutator,
    locks: GroupLocks,
    store: Arc<S>,
}

impl<S> NestedSetIndex<S>
where
    S: RecordStore,
{
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store), IndexConfig::default())
    }

    pub fn with_config(store: S, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_arc(Arc::new(store), config))
    }
}

impl NestedSetIndex<dyn RecordStore> {
    /// Validate `config` and open the backend it names
    pub fn open(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config.storage)?;
        info!(
            backend = config.storage.backend.as_str(),
            page_size = config.page_size,
            "opened nested-set index"
        );
        Ok(Self::from_arc(store, config))
    }
}

impl<S> NestedSetIndex<S>
where
    S: RecordStore + ?Sized,
{
    /// Share an existing store handle
    pub fn from_arc(store: Arc<S>, config: IndexConfig) -> Self {
        Self {
            query: NestedSetQuery::new(config.page_size),
            mutator: NestedSetMutator::new().with_verification(config.verify_after_mutation),
            locks: GroupLocks::new(),
            config,
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Lookup
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn get(&self, id: NodeId) -> Result<Option<TreeNode>> {
        self.store.get(id).await
    }

    /// Current stored state of `node`
    ///
    /// Fails with `NotAttached` if no row with this id lives in `node`'s tree
    /// group. Rows never change group, so a mismatch means `node` was never
    /// attached there.
    pub async fn refresh(&self, node: &TreeNode) -> Result<TreeNode> {
        match self.store.get(node.id).await? {
            Some(current) if current.tree_group == node.tree_group => Ok(current),
            _ => Err(IndexError::not_attached(node.id, node.tree_group)),
        }
    }

    /// Every node of `tree_group` in pre-order
    pub async fn group_nodes(&self, tree_group: TreeGroup) -> Result<Vec<TreeNode>> {
        self.store.range_read(tree_group, &RangeFilter::new()).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Queries
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Lazy pre-order cursor over every node below `parent`
    pub async fn descendants(&self, parent: &TreeNode) -> Result<Descendants<'_, S>> {
        let parent = self.refresh(parent).await?;
        self.query.descendants(self.store.as_ref(), &parent)
    }

    pub async fn direct_children(&self, parent: &TreeNode) -> Result<Vec<TreeNode>> {
        let parent = self.refresh(parent).await?;
        self.query.direct_children(self.store.as_ref(), &parent).await
    }

    /// Enclosing nodes, root first; empty for a root
    pub async fn ancestor_path(&self, child: &TreeNode) -> Result<Vec<TreeNode>> {
        let child = self.refresh(child).await?;
        self.query.ancestor_path(self.store.as_ref(), &child).await
    }

    pub async fn depth(&self, child: &TreeNode) -> Result<usize> {
        let child = self.refresh(child).await?;
        self.query.depth(self.store.as_ref(), &child).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Mutations
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Start a new tree in a freshly allocated group
    pub async fn insert_root(&self, node: NewNode) -> Result<TreeNode> {
        if let Some(hinted) = node.tree_group {
            warn!(tree_group = hinted, "rejected root insert into existing group");
            return Err(IndexError::new(
                ErrorKind::CrossGroupOperation,
                format!(
                    "A new root gets a fresh tree group; node is already bound to group {}",
                    hinted
                ),
            ));
        }

        let tree_group = self.store.allocate_group().await?;
        let _guard = self.claim(tree_group)?;
        self.mutator
            .insert_root(self.store.as_ref(), tree_group, node)
            .await
    }

    /// Attach `child` under `parent`, or start a new tree when `parent` is `None`
    pub async fn insert_child(&self, parent: Option<&TreeNode>, child: NewNode) -> Result<TreeNode> {
        let Some(parent) = parent else {
            return self.insert_root(child).await;
        };

        self.insert_children(parent, vec![child])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::store("Store committed insert without returning the row"))
    }

    /// Attach `new_nodes` as the leftmost children of `parent`, in order
    ///
    /// An empty list is a no-op and returns an empty list.
    pub async fn insert_children(
        &self,
        parent: &TreeNode,
        new_nodes: Vec<NewNode>,
    ) -> Result<Vec<TreeNode>> {
        if new_nodes.is_empty() {
            return Ok(Vec::new());
        }

        let tree_group = parent.tree_group;
        if let Some(foreign) = new_nodes
            .iter()
            .filter_map(|n| n.tree_group)
            .find(|g| *g != tree_group)
        {
            warn!(tree_group, foreign, "rejected cross-group insert");
            return Err(IndexError::cross_group(tree_group, foreign));
        }

        let _guard = self.claim(tree_group)?;
        let parent = self.refresh(parent).await?;
        self.mutator
            .insert_children(self.store.as_ref(), &parent, new_nodes)
            .await
            .inspect_err(|err| {
                warn!(tree_group, parent_id = parent.id, error = %err, "insert failed");
            })
    }

    /// Remove `node`, which must be a leaf
    pub async fn delete_leaf(&self, node: &TreeNode) -> Result<()> {
        let tree_group = node.tree_group;
        let _guard = self.claim(tree_group)?;

        let node = self.refresh(node).await?;
        self.mutator
            .delete_leaf(self.store.as_ref(), &node)
            .await
            .inspect_err(|err| {
                warn!(tree_group, node_id = node.id, error = %err, "leaf deletion failed");
            })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Integrity
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn verify_group(&self, tree_group: TreeGroup) -> Result<IntegrityReport> {
        let rows = self.group_nodes(tree_group).await?;
        Ok(verify_rows(tree_group, &rows))
    }

    fn claim(&self, tree_group: TreeGroup) -> Result<GroupGuard> {
        self.locks.try_acquire(tree_group).inspect_err(|err| {
            warn!(tree_group, error = %err, "mutation rejected");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeDraft;
    use crate::infrastructure::InMemoryRecordStore;

    fn index() -> NestedSetIndex<InMemoryRecordStore> {
        NestedSetIndex::with_config(
            InMemoryRecordStore::new(),
            IndexConfig::default().verify_after_mutation(true),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_with_config_validates() {
        let result = NestedSetIndex::with_config(
            InMemoryRecordStore::new(),
            IndexConfig::default().page_size(0),
        );
        assert_eq!(result.err().unwrap().kind, ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_insert_child_without_parent_starts_tree() {
        let index = index();
        let a = index.insert_child(None, NewNode::new("a")).await.unwrap();
        let b = index.insert_child(None, NewNode::new("b")).await.unwrap();

        assert_ne!(a.tree_group, b.tree_group);
        assert_eq!((a.left, a.right, a.level), (0, 1, 0));
        assert!(a.is_root());
    }

    #[tokio::test]
    async fn test_root_with_group_hint_rejected() {
        let index = index();
        let err = index
            .insert_root(NewNode::new("r").in_group(4))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CrossGroupOperation);
    }

    #[tokio::test]
    async fn test_cross_group_insert_rejected_without_side_effects() {
        let index = index();
        let left = index.insert_root(NewNode::new("left")).await.unwrap();
        let right = index.insert_root(NewNode::new("right")).await.unwrap();

        let err = index
            .insert_children(&left, vec![NewNode::copy_of(&right)])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CrossGroupOperation);
        assert_eq!(index.refresh(&left).await.unwrap(), left);
    }

    #[tokio::test]
    async fn test_matching_group_hint_accepted() {
        let index = index();
        let root = index.insert_root(NewNode::new("root")).await.unwrap();
        let child = index
            .insert_child(Some(&root), NewNode::new("c").in_group(root.tree_group))
            .await
            .unwrap();
        assert_eq!(child.parent_id, Some(root.id));
    }

    #[tokio::test]
    async fn test_in_flight_group_rejects_mutation() {
        let index = index();
        let root = index.insert_root(NewNode::new("root")).await.unwrap();

        let _held = index.locks.try_acquire(root.tree_group).unwrap();
        let err = index
            .insert_child(Some(&root), NewNode::new("late"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConcurrentModification);

        let err = index.delete_leaf(&root).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConcurrentModification);
    }

    #[tokio::test]
    async fn test_stale_parent_is_refreshed() {
        let index = index();
        let root = index.insert_root(NewNode::new("root")).await.unwrap();
        let a = index.insert_child(Some(&root), NewNode::new("a")).await.unwrap();

        // `root` still claims (0, 1); the index must use the stored (0, 3)
        let b = index.insert_child(Some(&root), NewNode::new("b")).await.unwrap();
        assert_eq!((b.left, b.right), (1, 2));

        let a = index.refresh(&a).await.unwrap();
        assert_eq!((a.left, a.right), (3, 4));
        assert!(index.verify_group(root.tree_group).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_removed_node_is_not_attached() {
        let index = index();
        let root = index.insert_root(NewNode::new("root")).await.unwrap();
        let leaf = index.insert_child(Some(&root), NewNode::new("leaf")).await.unwrap();
        index.delete_leaf(&leaf).await.unwrap();

        let err = index.depth(&leaf).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotAttached);
        let err = index.delete_leaf(&leaf).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotAttached);
    }

    #[tokio::test]
    async fn test_empty_insertion_is_noop() {
        let index = index();
        let root = index.insert_root(NewNode::new("root")).await.unwrap();
        let inserted = index.insert_children(&root, Vec::new()).await.unwrap();
        assert!(inserted.is_empty());
        assert_eq!(index.refresh(&root).await.unwrap(), root);
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let index = NestedSetIndex::open(IndexConfig::default().page_size(2)).unwrap();
        let root = index.insert_root(NewNode::new("root")).await.unwrap();
        index
            .insert_children(&root, vec![NewNode::new("a"), NewNode::new("b"), NewNode::new("c")])
            .await
            .unwrap();

        let names: Vec<_> = index
            .descendants(&root)
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let err = NestedSetIndex::open(IndexConfig::default().page_size(0))
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_failed_verification_commits_nothing() {
        let store = InMemoryRecordStore::new();
        let draft = |left, right, name: &str| NodeDraft {
            tree_group: 1,
            parent_id: None,
            level: 0,
            left,
            right,
            name: name.to_string(),
            attrs: serde_json::Value::Null,
        };
        let roots = store.seed(vec![
            draft(0, 1, "first"),
            draft(2, 3, "second"),
            draft(4, 5, "third"),
        ]);
        let index = NestedSetIndex::with_config(
            store.clone(),
            IndexConfig::default().verify_after_mutation(true),
        )
        .unwrap();

        let err = index
            .insert_child(Some(&roots[0]), NewNode::new("late"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Integrity);
        assert_eq!(store.len(), 3);
        assert_eq!(index.group_nodes(1).await.unwrap(), roots);

        // Still two roots after removing the third
        let err = index.delete_leaf(&roots[2]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Integrity);
        assert_eq!(index.group_nodes(1).await.unwrap(), roots);
    }

    #[tokio::test]
    async fn test_verification_off_by_default() {
        let store = InMemoryRecordStore::new();
        let roots = store.seed(vec![
            NodeDraft {
                tree_group: 1,
                parent_id: None,
                level: 0,
                left: 0,
                right: 1,
                name: "first".to_string(),
                attrs: serde_json::Value::Null,
            },
            NodeDraft {
                tree_group: 1,
                parent_id: None,
                level: 0,
                left: 2,
                right: 3,
                name: "second".to_string(),
                attrs: serde_json::Value::Null,
            },
        ]);
        let index = NestedSetIndex::new(store.clone());

        index
            .insert_child(Some(&roots[0]), NewNode::new("late"))
            .await
            .unwrap();
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_node_from_other_group_is_not_attached() {
        let index = index();
        let left = index.insert_root(NewNode::new("left")).await.unwrap();
        let right = index.insert_root(NewNode::new("right")).await.unwrap();

        let misfiled = TreeNode {
            tree_group: right.tree_group,
            ..left.clone()
        };
        for err in [
            index.refresh(&misfiled).await.unwrap_err(),
            index.direct_children(&misfiled).await.unwrap_err(),
            index.depth(&misfiled).await.unwrap_err(),
        ] {
            assert_eq!(err.kind, ErrorKind::NotAttached);
        }
    }
}
