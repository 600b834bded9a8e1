//! Domain models for the nested set index
//!
//! A tree is stored as flat rows. Each row carries a pair of integer bounds
//! `(left, right)` so that the subtree of a node is exactly the set of rows
//! whose `left` falls inside `(node.left, node.right)`.
//!
//! # Models
//!
//! - `TreeNode`: an attached row (id and bounds assigned)
//! - `NewNode`: an unattached node waiting to be inserted
//! - `NodeDraft`: a fully positioned row the store has not yet given an id
//! - `RangeFilter` / `Predicate`: conjunctive bound filters for range reads

use serde::{Deserialize, Serialize};

/// Row identifier, assigned by the record store
pub type NodeId = i64;

/// Partition key isolating one tree's bounds from every other tree
pub type TreeGroup = i64;

/// Attached tree node
///
/// Values are immutable snapshots: bounds move only as a side effect of
/// mutations elsewhere in the same tree group, so a `TreeNode` held by a
/// caller may be stale. Re-read it through the index before relying on it.
///
/// # Examples
///
/// ```rust
/// use nestedset_index::domain::TreeNode;
///
/// let leaf = TreeNode::new(1, 1, None, 0, 0, 1, "root");
/// assert!(leaf.is_leaf());
/// assert!(leaf.is_root());
/// assert_eq!(leaf.descendant_count(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub tree_group: TreeGroup,
    /// `None` only for the root of a tree group
    pub parent_id: Option<NodeId>,
    /// Depth, root = 0
    pub level: u32,
    pub left: i64,
    pub right: i64,
    pub name: String,
    /// Free-form payload, stored as JSON
    #[serde(default)]
    pub attrs: serde_json::Value,
}

impl TreeNode {
    pub fn new(
        id: NodeId,
        tree_group: TreeGroup,
        parent_id: Option<NodeId>,
        level: u32,
        left: i64,
        right: i64,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            tree_group,
            parent_id,
            level,
            left,
            right,
            name: name.into(),
            attrs: serde_json::Value::Null,
        }
    }

    /// Number of integer positions the subtree occupies
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    pub fn is_leaf(&self) -> bool {
        self.right == self.left + 1
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Bounds are usable for range arithmetic
    pub fn has_valid_bounds(&self) -> bool {
        self.left >= 0 && self.left < self.right && (self.right - self.left) % 2 == 1
    }

    /// Descendant count derived from the interval width alone
    pub fn descendant_count(&self) -> usize {
        usize::try_from((self.width() - 2) / 2).unwrap_or(0)
    }

    /// Whether `other` lies strictly inside this node's interval (same group)
    pub fn contains(&self, other: &TreeNode) -> bool {
        self.tree_group == other.tree_group && self.left < other.left && other.right < self.right
    }
}

/// Unattached node
///
/// Carries only the payload. `tree_group` is an optional hint: when set it
/// must match the group of the parent the node is attached under.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewNode {
    pub name: String,
    #[serde(default)]
    pub attrs: serde_json::Value,
    #[serde(default)]
    pub tree_group: Option<TreeGroup>,
}

impl NewNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: serde_json::Value::Null,
            tree_group: None,
        }
    }

    pub fn with_attrs(name: impl Into<String>, attrs: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            attrs,
            tree_group: None,
        }
    }

    /// Payload copy of an existing node, keeping its group as the hint
    pub fn copy_of(node: &TreeNode) -> Self {
        Self {
            name: node.name.clone(),
            attrs: node.attrs.clone(),
            tree_group: Some(node.tree_group),
        }
    }

    pub fn in_group(mut self, tree_group: TreeGroup) -> Self {
        self.tree_group = Some(tree_group);
        self
    }
}

/// Fully positioned row awaiting an id from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDraft {
    pub tree_group: TreeGroup,
    pub parent_id: Option<NodeId>,
    pub level: u32,
    pub left: i64,
    pub right: i64,
    pub name: String,
    pub attrs: serde_json::Value,
}

impl NodeDraft {
    pub fn attach(self, id: NodeId) -> TreeNode {
        TreeNode {
            id,
            tree_group: self.tree_group,
            parent_id: self.parent_id,
            level: self.level,
            left: self.left,
            right: self.right,
            name: self.name,
            attrs: self.attrs,
        }
    }
}

/// Shiftable bound column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    Left,
    Right,
}

/// Filterable column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Left,
    Right,
    Level,
}

impl From<Bound> for Field {
    fn from(bound: Bound) -> Self {
        match bound {
            Bound::Left => Field::Left,
            Bound::Right => Field::Right,
        }
    }
}

impl Field {
    /// Column value of `node`
    pub fn read(&self, node: &TreeNode) -> i64 {
        match self {
            Field::Left => node.left,
            Field::Right => node.right,
            Field::Level => i64::from(node.level),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl CmpOp {
    pub fn eval(&self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Gt => lhs > rhs,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "=",
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
        }
    }
}

/// `field op value`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: Field,
    pub op: CmpOp,
    pub value: i64,
}

impl Predicate {
    pub fn matches(&self, node: &TreeNode) -> bool {
        self.op.eval(self.field.read(node), self.value)
    }
}

/// Conjunctive range filter, always ordered by `left` ascending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub predicates: Vec<Predicate>,
    pub limit: Option<usize>,
}

impl RangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, op: CmpOp, value: i64) -> Self {
        self.predicates.push(Predicate { field, op, value });
        self
    }

    pub fn left(self, op: CmpOp, value: i64) -> Self {
        self.with(Field::Left, op, value)
    }

    pub fn right(self, op: CmpOp, value: i64) -> Self {
        self.with(Field::Right, op, value)
    }

    pub fn level(self, value: u32) -> Self {
        self.with(Field::Level, CmpOp::Eq, i64::from(value))
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, node: &TreeNode) -> bool {
        self.predicates.iter().all(|p| p.matches(node))
    }
}
