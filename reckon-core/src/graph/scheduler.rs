//! Update Scheduler
//!
//! State of one in-flight propagation: which handles still need a refresh
//! and which leaf listeners have been reached so far.
//!
//! # Algorithm
//!
//! 1. The invalidated handle is marked dirty.
//! 2. The dirty handles and everything downstream of them are sorted
//!    topologically (dependencies before dependents).
//! 3. Each handle that is still dirty when its turn comes is refreshed once:
//!    - no leaf reachable: drop its cache entry, mark its edges dirty
//!    - otherwise recompute; if the result changed, mark its edges dirty
//!      and collect its leaves
//! 4. Handles marked dirty that were not part of the order (the graph was
//!    rewired by a recomputation) are ordered and processed in another
//!    round.
//! 5. If a refresh fails, the handles still dirty and everything downstream
//!    of them lose their cache entries.
//!
//! Because a handle is refreshed at most once per mark, a node reachable
//! along several paths recomputes once, and the pending leaf set
//! deduplicates listeners reached along several paths.

use std::collections::HashSet;

use indexmap::IndexSet;

use super::HandleId;
use crate::reactive::ListenerId;

#[derive(Debug, Default)]
pub(crate) struct Propagation {
    dirty: HashSet<HandleId>,
    pending: IndexSet<ListenerId>,
    rounds: usize,
}

impl Propagation {
    pub fn new(root: HandleId) -> Self {
        let mut propagation = Self::default();
        propagation.mark_dirty(root);
        propagation
    }

    pub fn mark_dirty(&mut self, handle: HandleId) {
        self.dirty.insert(handle);
    }

    pub fn is_dirty(&self, handle: HandleId) -> bool {
        self.dirty.contains(&handle)
    }

    /// Clear the dirty mark. Returns whether it was set.
    pub fn settle(&mut self, handle: HandleId) -> bool {
        self.dirty.remove(&handle)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Dirty handles, the seeds of the next round.
    pub fn start_round(&mut self) -> Vec<HandleId> {
        self.rounds += 1;
        let mut seeds: Vec<HandleId> = self.dirty.iter().copied().collect();
        seeds.sort_unstable();
        seeds
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn notify(&mut self, listener: ListenerId) {
        self.pending.insert(listener);
    }

    /// Handles still waiting for a refresh, in index order.
    pub fn into_dirty(self) -> Vec<HandleId> {
        let mut dirty: Vec<HandleId> = self.dirty.into_iter().collect();
        dirty.sort_unstable();
        dirty
    }

    /// Leaves reached, each once, in first-reached order.
    pub fn into_pending(self) -> Vec<ListenerId> {
        self.pending.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_starts_dirty() {
        let root = HandleId::from_index(7);
        let mut propagation = Propagation::new(root);

        assert!(propagation.is_dirty(root));
        assert_eq!(propagation.start_round(), vec![root]);
        assert_eq!(propagation.rounds(), 1);

        assert!(propagation.settle(root));
        assert!(!propagation.settle(root));
        assert!(!propagation.has_dirty());
    }

    #[test]
    fn pending_leaves_are_deduplicated() {
        let mut propagation = Propagation::new(HandleId::from_index(0));
        let first = ListenerId::new();
        let second = ListenerId::new();

        propagation.notify(first);
        propagation.notify(second);
        propagation.notify(first);

        assert_eq!(propagation.into_pending(), vec![first, second]);
    }

    #[test]
    fn unsettled_handles_are_returned() {
        let (a, b) = (HandleId::from_index(3), HandleId::from_index(1));
        let mut propagation = Propagation::new(a);
        propagation.mark_dirty(b);
        propagation.mark_dirty(HandleId::from_index(2));
        propagation.settle(HandleId::from_index(2));

        assert_eq!(propagation.into_dirty(), vec![b, a]);
    }
}
