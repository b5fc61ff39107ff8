//! Dependency Graph
//!
//! This module holds the edges of the reactive graph: which dependents are
//! attached to which Key Handle, and which handles each listener subscribed
//! to during its last evaluation.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Vertices are Key Handles, one per `(node, key)` pair, interned in an
//!   arena so that their identity is a plain index
//! - Edges point from a handle to its dependents: other handles whose
//!   evaluation read it, or leaf listeners
//!
//! Acyclicity is a precondition. Nothing here verifies it, and the
//! recursive liveness check in [`Graph::has_listeners`] will not terminate
//! on a cycle.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized in the runtime rather than spread over the
//!    nodes, so edges between nodes with unrelated value types need no
//!    type erasure.
//!
//! 2. Dependent sets are `IndexSet`s: membership is by value and iteration
//!    follows subscription order, which keeps notification order stable.
//!
//! 3. Handles are never removed from the arena. Removing one would shift
//!    the indices of the others.

mod node;
mod scheduler;

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use smallvec::SmallVec;

pub use node::{Dependent, HandleId, Key, NodeId, VOID_KEY};
pub(crate) use scheduler::Propagation;

use crate::reactive::ListenerId;

/// Dependents snapshot; most keys have only a handful.
pub(crate) type Dependents = SmallVec<[Dependent; 4]>;

/// Outcome of reconciling a listener's reads against its last evaluation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct SubscriptionDiff {
    pub added: Vec<HandleId>,
    pub removed: Vec<HandleId>,
}

impl SubscriptionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Edge storage for one runtime.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    /// Handle arena, indexed by [`HandleId`].
    handles: IndexSet<(NodeId, Key)>,

    /// Dependents per handle.
    dependents: HashMap<HandleId, IndexSet<Dependent>>,

    /// Handles each listener subscribed to as of its last evaluation.
    subscriptions: HashMap<Dependent, IndexSet<HandleId>>,
}

impl Graph {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: IndexSet::with_capacity(capacity),
            dependents: HashMap::new(),
            subscriptions: HashMap::new(),
        }
    }

    /// Get or create the handle for `(node, key)`.
    pub fn intern(&mut self, node: NodeId, key: &Key) -> HandleId {
        let (index, _) = self.handles.insert_full((node, key.clone()));
        HandleId::from_index(index)
    }

    /// Look up an existing handle without creating one.
    pub fn lookup(&self, node: NodeId, key: &Key) -> Option<HandleId> {
        self.handles
            .get_index_of(&(node, key.clone()))
            .map(HandleId::from_index)
    }

    pub fn resolve(&self, handle: HandleId) -> Option<(NodeId, &Key)> {
        self.handles
            .get_index(handle.index())
            .map(|(node, key)| (*node, key))
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Add a dependent to a handle. Returns false if it was already there.
    pub fn subscribe(&mut self, handle: HandleId, dependent: Dependent) -> bool {
        self.dependents.entry(handle).or_default().insert(dependent)
    }

    /// Remove a dependent from a handle. Returns false if it was absent.
    pub fn unsubscribe(&mut self, handle: HandleId, dependent: Dependent) -> bool {
        self.dependents
            .get_mut(&handle)
            .map(|set| set.shift_remove(&dependent))
            .unwrap_or(false)
    }

    /// True iff the handle's dependent set is non-empty.
    pub fn has_dependencies(&self, handle: HandleId) -> bool {
        self.dependents
            .get(&handle)
            .is_some_and(|set| !set.is_empty())
    }

    /// True iff a leaf listener is reachable from the handle.
    pub fn has_listeners(&self, handle: HandleId) -> bool {
        self.dependents.get(&handle).is_some_and(|set| {
            set.iter().any(|dependent| match *dependent {
                Dependent::Leaf(_) => true,
                Dependent::Edge(downstream) => self.has_listeners(downstream),
            })
        })
    }

    pub fn dependent_count(&self, handle: HandleId) -> usize {
        self.dependents.get(&handle).map_or(0, IndexSet::len)
    }

    /// Snapshot of a handle's dependents, in subscription order.
    pub fn dependents(&self, handle: HandleId) -> Dependents {
        self.dependents
            .get(&handle)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Replace `listener`'s subscriptions with `reads`.
    ///
    /// Handles present only in `reads` gain `listener` as a dependent;
    /// handles present only in the previous set lose it.
    pub fn reconcile(&mut self, listener: Dependent, reads: IndexSet<HandleId>) -> SubscriptionDiff {
        let previous = self.subscriptions.remove(&listener).unwrap_or_default();

        let added: Vec<HandleId> = reads.difference(&previous).copied().collect();
        let removed: Vec<HandleId> = previous.difference(&reads).copied().collect();

        for &handle in &added {
            self.subscribe(handle, listener);
        }
        for &handle in &removed {
            self.unsubscribe(handle, listener);
        }

        if !reads.is_empty() {
            self.subscriptions.insert(listener, reads);
        }

        SubscriptionDiff { added, removed }
    }

    /// Handles `listener` subscribed to during its last evaluation.
    pub fn subscriptions_of(&self, listener: Dependent) -> Vec<HandleId> {
        self.subscriptions
            .get(&listener)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every edge that starts or ends at `listener`.
    pub fn forget_listener(&mut self, id: ListenerId) {
        let leaf = Dependent::Leaf(id);
        self.subscriptions.remove(&leaf);
        for set in self.dependents.values_mut() {
            set.shift_remove(&leaf);
        }
    }

    /// Remove all edges involving any handle of `node`.
    ///
    /// The handles stay in the arena.
    pub fn remove_node(&mut self, node: NodeId) {
        let owned: HashSet<HandleId> = self
            .handles
            .iter()
            .enumerate()
            .filter(|(_, (owner, _))| *owner == node)
            .map(|(index, _)| HandleId::from_index(index))
            .collect();

        for &handle in &owned {
            // Upstream edges: this handle listened to others.
            if let Some(upstream) = self.subscriptions.remove(&Dependent::Edge(handle)) {
                for up in upstream {
                    self.unsubscribe(up, Dependent::Edge(handle));
                }
            }

            // Downstream edges: others listened to this handle.
            if let Some(downstream) = self.dependents.remove(&handle) {
                for dependent in downstream {
                    if let Some(reads) = self.subscriptions.get_mut(&dependent) {
                        reads.shift_remove(&handle);
                    }
                }
            }
        }
    }

    /// Order `seeds` and everything reachable from them so that every
    /// handle comes after the handles it depends on.
    pub fn topological_order(&self, seeds: impl IntoIterator<Item = HandleId>) -> Vec<HandleId> {
        let mut reachable: IndexSet<HandleId> = IndexSet::new();
        let mut stack: Vec<HandleId> = seeds.into_iter().collect();

        while let Some(handle) = stack.pop() {
            if !reachable.insert(handle) {
                continue;
            }
            for dependent in self.dependents(handle) {
                if let Dependent::Edge(downstream) = dependent {
                    stack.push(downstream);
                }
            }
        }

        // In-degrees counted within the reachable set only.
        let mut in_degree: HashMap<HandleId, usize> =
            reachable.iter().map(|&handle| (handle, 0)).collect();
        for &handle in &reachable {
            for dependent in self.dependents(handle) {
                if let Dependent::Edge(downstream) = dependent {
                    if let Some(degree) = in_degree.get_mut(&downstream) {
                        *degree += 1;
                    }
                }
            }
        }

        let mut queue: std::collections::VecDeque<HandleId> = reachable
            .iter()
            .copied()
            .filter(|handle| in_degree.get(handle) == Some(&0))
            .collect();
        let mut result = Vec::with_capacity(reachable.len());

        // Kahn's algorithm
        while let Some(handle) = queue.pop_front() {
            result.push(handle);
            for dependent in self.dependents(handle) {
                if let Dependent::Edge(downstream) = dependent {
                    if let Some(degree) = in_degree.get_mut(&downstream) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(downstream);
                        }
                    }
                }
            }
        }

        // Only reachable on a cycle, which is a precondition violation.
        if result.len() < reachable.len() {
            let placed: HashSet<HandleId> = result.iter().copied().collect();
            result.extend(reachable.into_iter().filter(|handle| !placed.contains(handle)));
        }

        result
    }
}
