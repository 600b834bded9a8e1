//! Per-tree-group in-flight mutation registry
//!
//! At most one mutation per tree group may run through an index at a time.
//! A second one is rejected immediately with `ConcurrentModification`
//! instead of waiting, leaving the retry decision to the caller.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::TreeGroup;
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Default)]
pub(crate) struct GroupLocks {
    held: Arc<DashMap<TreeGroup, u64>>,
    next_ticket: Arc<AtomicU64>,
}

impl GroupLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim `group` or fail if another mutation holds it
    pub(crate) fn try_acquire(&self, group: TreeGroup) -> Result<GroupGuard> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        match self.held.entry(group) {
            Entry::Occupied(entry) => Err(IndexError::concurrent(format!(
                "Tree group {} already has a mutation in flight (ticket {})",
                group,
                entry.get()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(ticket);
                Ok(GroupGuard {
                    held: Arc::clone(&self.held),
                    group,
                    ticket,
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self, group: TreeGroup) -> bool {
        self.held.contains_key(&group)
    }
}

/// Releases the group on drop
#[derive(Debug)]
pub(crate) struct GroupGuard {
    held: Arc<DashMap<TreeGroup, u64>>,
    group: TreeGroup,
    ticket: u64,
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let ticket = self.ticket;
        self.held.remove_if(&self.group, |_, held| *held == ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_second_acquire_is_rejected() {
        let locks = GroupLocks::new();
        let _guard = locks.try_acquire(1).unwrap();

        let err = locks.try_acquire(1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConcurrentModification);
        assert!(err.message.contains("group 1"));
    }

    #[test]
    fn test_groups_are_independent() {
        let locks = GroupLocks::new();
        let _a = locks.try_acquire(1).unwrap();
        let _b = locks.try_acquire(2).unwrap();
        assert!(locks.is_held(1));
        assert!(locks.is_held(2));
    }

    #[test]
    fn test_drop_releases() {
        let locks = GroupLocks::new();
        {
            let _guard = locks.try_acquire(7).unwrap();
            assert!(locks.is_held(7));
        }
        assert!(!locks.is_held(7));
        assert!(locks.try_acquire(7).is_ok());
    }

    #[test]
    fn test_clones_share_registry() {
        let locks = GroupLocks::new();
        let other = locks.clone();
        let _guard = locks.try_acquire(3).unwrap();
        assert!(other.try_acquire(3).is_err());
    }
}
