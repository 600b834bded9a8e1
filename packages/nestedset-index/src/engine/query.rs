//! Read-only nested set traversal
//!
//! Every query is a single bound comparison against the record store, scoped
//! to the node's tree group:
//!
//! | query            | filter                                              |
//! |------------------|-----------------------------------------------------|
//! | descendants      | `left ∈ [p.left + 1, p.right]`                      |
//! | direct children  | descendants ∧ `level = p.level + 1`                 |
//! | ancestor path    | `left < c.left ∧ right > c.right`                   |
//! | depth            | `count(ancestor path)`                              |
//!
//! Results are always ordered by `left` ascending, which is pre-order for
//! descendants and root-first for ancestors.

use std::collections::VecDeque;

use crate::domain::{CmpOp, NodeId, RangeFilter, RecordStore, TreeGroup, TreeNode};
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy)]
pub struct NestedSetQuery {
    page_size: usize,
}

impl NestedSetQuery {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn descendants_filter(parent: &TreeNode) -> RangeFilter {
        RangeFilter::new()
            .left(CmpOp::Ge, parent.left + 1)
            .left(CmpOp::Le, parent.right)
    }

    pub fn direct_children_filter(parent: &TreeNode) -> RangeFilter {
        Self::descendants_filter(parent).level(parent.level + 1)
    }

    pub fn ancestor_filter(child: &TreeNode) -> RangeFilter {
        RangeFilter::new()
            .left(CmpOp::Lt, child.left)
            .right(CmpOp::Gt, child.right)
    }

    /// Lazy pre-order cursor over the subtree below `parent`
    pub fn descendants<'a, S>(&self, store: &'a S, parent: &TreeNode) -> Result<Descendants<'a, S>>
    where
        S: RecordStore + ?Sized,
    {
        ensure_bounds(parent)?;
        Ok(Descendants::new(store, parent, self.page_size))
    }

    pub async fn direct_children<S>(&self, store: &S, parent: &TreeNode) -> Result<Vec<TreeNode>>
    where
        S: RecordStore + ?Sized,
    {
        ensure_bounds(parent)?;
        store
            .range_read(parent.tree_group, &Self::direct_children_filter(parent))
            .await
    }

    /// Root first, direct parent last; empty for a root
    pub async fn ancestor_path<S>(&self, store: &S, child: &TreeNode) -> Result<Vec<TreeNode>>
    where
        S: RecordStore + ?Sized,
    {
        ensure_bounds(child)?;
        store
            .range_read(child.tree_group, &Self::ancestor_filter(child))
            .await
    }

    pub async fn depth<S>(&self, store: &S, child: &TreeNode) -> Result<usize>
    where
        S: RecordStore + ?Sized,
    {
        ensure_bounds(child)?;
        store
            .count(child.tree_group, &Self::ancestor_filter(child))
            .await
    }
}

pub(crate) fn ensure_bounds(node: &TreeNode) -> Result<()> {
    if node.has_valid_bounds() {
        Ok(())
    } else {
        Err(IndexError::invalid_bounds(node.id, node.left, node.right))
    }
}

/// Descendants cursor
///
/// Fetches `page_size` rows per store read, keyed on the last `left` seen, so
/// it never holds the whole subtree in memory. Finite: it stops at the
/// parent's right bound.
///
/// The parent row is re-read before every page. If its bounds moved since the
/// cursor opened (a mutation in the same tree group), `next` fails with
/// `ConcurrentModification` rather than mixing pre- and post-mutation rows.
/// [`Descendants::rewind`] starts over against the parent's current bounds.
pub struct Descendants<'a, S: ?Sized> {
    store: &'a S,
    parent_id: NodeId,
    tree_group: TreeGroup,
    lower: i64,
    upper: i64,
    page_size: usize,
    next_left: i64,
    buffer: VecDeque<TreeNode>,
    exhausted: bool,
    rewound: bool,
}

impl<'a, S> Descendants<'a, S>
where
    S: RecordStore + ?Sized,
{
    fn new(store: &'a S, parent: &TreeNode, page_size: usize) -> Self {
        Self {
            store,
            parent_id: parent.id,
            tree_group: parent.tree_group,
            lower: parent.left + 1,
            upper: parent.right,
            page_size,
            next_left: parent.left + 1,
            buffer: VecDeque::new(),
            exhausted: false,
            rewound: false,
        }
    }

    pub async fn next(&mut self) -> Result<Option<TreeNode>> {
        if let Some(node) = self.buffer.pop_front() {
            return Ok(Some(node));
        }
        if self.exhausted {
            return Ok(None);
        }

        self.check_parent().await?;

        let filter = RangeFilter::new()
            .left(CmpOp::Ge, self.next_left)
            .left(CmpOp::Le, self.upper)
            .limit(self.page_size);
        let page = self.store.range_read(self.tree_group, &filter).await?;

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.next_left = last.left + 1;
        } else {
            self.exhausted = true;
        }
        self.buffer.extend(page);

        Ok(self.buffer.pop_front())
    }

    /// Start over from the first descendant
    ///
    /// The next read re-resolves the parent, so the restarted walk sees the
    /// current store state.
    pub fn rewind(&mut self) {
        self.buffer.clear();
        self.exhausted = false;
        self.rewound = true;
    }

    /// Re-read the parent; adopt its bounds after a rewind, else require them unchanged
    async fn check_parent(&mut self) -> Result<()> {
        let parent = match self.store.get(self.parent_id).await? {
            Some(parent) if parent.tree_group == self.tree_group => parent,
            _ => return Err(IndexError::not_attached(self.parent_id, self.tree_group)),
        };

        if self.rewound {
            ensure_bounds(&parent)?;
            self.lower = parent.left + 1;
            self.upper = parent.right;
            self.next_left = self.lower;
            self.rewound = false;
            return Ok(());
        }

        if parent.left + 1 != self.lower || parent.right != self.upper {
            return Err(IndexError::concurrent(format!(
                "Node {} moved from ({}, {}) to ({}, {}) while its descendants were being read",
                self.parent_id,
                self.lower - 1,
                self.upper,
                parent.left,
                parent.right
            )));
        }
        Ok(())
    }

    pub async fn collect_all(mut self) -> Result<Vec<TreeNode>> {
        let mut nodes = Vec::new();
        while let Some(node) = self.next().await? {
            nodes.push(node);
        }
        Ok(nodes)
    }
}
