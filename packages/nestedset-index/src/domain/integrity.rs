//! Tree group integrity checks
//!
//! Walks a group's rows in `left` order with a stack of open intervals and
//! reports every violated invariant instead of stopping at the first one.

use std::collections::BTreeSet;
use thiserror::Error;

use super::models::{NodeId, TreeGroup, TreeNode};
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("node {id} has invalid bounds ({left}, {right})")]
    InvalidBounds { id: NodeId, left: i64, right: i64 },

    #[error("bound {value} is used more than once")]
    DuplicateBound { value: i64 },

    #[error("bounds are not contiguous: expected {expected}, found {found}")]
    Gap { expected: i64, found: i64 },

    #[error("node {id} overlaps the interval of node {enclosing}")]
    Overlap { id: NodeId, enclosing: NodeId },

    #[error("node {id} records parent {found:?} but is enclosed by {expected:?}")]
    WrongParent {
        id: NodeId,
        expected: Option<NodeId>,
        found: Option<NodeId>,
    },

    #[error("node {id} has level {found}, expected {expected}")]
    WrongLevel { id: NodeId, expected: u32, found: u32 },

    #[error("tree group has more than one root: {ids:?}")]
    MultipleRoots { ids: Vec<NodeId> },

    #[error("node {id} spans {width} positions but has {descendants} descendants")]
    WidthMismatch {
        id: NodeId,
        width: i64,
        descendants: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub tree_group: TreeGroup,
    pub nodes: usize,
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// `Err(Integrity)` listing the violations, if any
    pub fn into_result(self) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        let details = self
            .violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(IndexError::integrity(format!(
            "Tree group {} violates {} invariant(s): {}",
            self.tree_group,
            self.violations.len(),
            details
        )))
    }
}

/// Check `rows` (one whole tree group, any order)
pub fn verify_rows(tree_group: TreeGroup, rows: &[TreeNode]) -> IntegrityReport {
    let mut sorted: Vec<&TreeNode> = rows.iter().collect();
    sorted.sort_by_key(|n| n.left);

    let mut violations = Vec::new();

    for node in &sorted {
        if node.left >= node.right {
            violations.push(Violation::InvalidBounds {
                id: node.id,
                left: node.left,
                right: node.right,
            });
        }
    }

    check_bounds(&sorted, &mut violations);
    check_nesting(&sorted, &mut violations);
    check_widths(&sorted, &mut violations);

    IntegrityReport {
        tree_group,
        nodes: rows.len(),
        violations,
    }
}

/// Unique and contiguous from the first left bound
fn check_bounds(sorted: &[&TreeNode], violations: &mut Vec<Violation>) {
    let mut seen = BTreeSet::new();
    for node in sorted {
        for value in [node.left, node.right] {
            if !seen.insert(value) {
                violations.push(Violation::DuplicateBound { value });
            }
        }
    }

    let Some(&start) = seen.iter().next() else {
        return;
    };
    for (expected, &found) in (start..).zip(seen.iter()) {
        if expected != found {
            violations.push(Violation::Gap { expected, found });
            break;
        }
    }
}

fn check_nesting(sorted: &[&TreeNode], violations: &mut Vec<Violation>) {
    let mut open: Vec<&TreeNode> = Vec::new();
    let mut roots = Vec::new();

    for node in sorted {
        while open.last().is_some_and(|top| top.right < node.left) {
            open.pop();
        }

        match open.last() {
            Some(parent) => {
                if node.right >= parent.right {
                    violations.push(Violation::Overlap {
                        id: node.id,
                        enclosing: parent.id,
                    });
                }
                if node.parent_id != Some(parent.id) {
                    violations.push(Violation::WrongParent {
                        id: node.id,
                        expected: Some(parent.id),
                        found: node.parent_id,
                    });
                }
                if node.level != parent.level + 1 {
                    violations.push(Violation::WrongLevel {
                        id: node.id,
                        expected: parent.level + 1,
                        found: node.level,
                    });
                }
            }
            None => {
                roots.push(node.id);
                if node.parent_id.is_some() {
                    violations.push(Violation::WrongParent {
                        id: node.id,
                        expected: None,
                        found: node.parent_id,
                    });
                }
                if node.level != 0 {
                    violations.push(Violation::WrongLevel {
                        id: node.id,
                        expected: 0,
                        found: node.level,
                    });
                }
            }
        }
        open.push(node);
    }

    if roots.len() > 1 {
        violations.push(Violation::MultipleRoots { ids: roots });
    }
}

/// `width = 2 * (descendants + 1)`
fn check_widths(sorted: &[&TreeNode], violations: &mut Vec<Violation>) {
    let lefts: Vec<i64> = sorted.iter().map(|n| n.left).collect();

    for node in sorted {
        let start = lefts.partition_point(|&l| l <= node.left);
        let end = lefts.partition_point(|&l| l < node.right);
        let descendants = end.saturating_sub(start);

        if node.width() != 2 * (descendants as i64 + 1) {
            violations.push(Violation::WidthMismatch {
                id: node.id,
                width: node.width(),
                descendants,
            });
        }
    }
}
