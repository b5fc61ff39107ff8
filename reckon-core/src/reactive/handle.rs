//! Key Handles.
//!
//! A [`KeyHandle`] stands for one key of one node. Downstream consumers
//! subscribe to a handle rather than to the node, which lets nodes with
//! unrelated key spaces depend on each other entry by entry.

use std::fmt;
use std::hash::{Hash, Hasher};

use super::runtime::Runtime;
use super::subscriber::Listener;
use crate::error::Result;
use crate::graph::{Dependent, HandleId, Key, NodeId};

/// Proxy for one `(node, key)` entry.
///
/// Handles are interned per runtime: asking for the same key of the same
/// node twice yields equal handles with the same [`HandleId`].
#[derive(Clone)]
pub struct KeyHandle {
    runtime: Runtime,
    id: HandleId,
    node: NodeId,
    key: Key,
}

impl KeyHandle {
    pub(crate) fn new(runtime: &Runtime, node: NodeId, key: Key) -> Self {
        let id = runtime.handle(node, &key);
        Self {
            runtime: runtime.clone(),
            id,
            node,
            key,
        }
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The owning node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Invalidate this entry and notify the leaf listeners reached.
    pub fn update(&self) -> Result<()> {
        self.runtime.update(self.id)
    }

    /// Alias of [`KeyHandle::update`].
    pub fn invalidate(&self) -> Result<()> {
        self.update()
    }

    /// Invalidate this entry and return, deduplicated, the leaf listeners
    /// that would fire. None of them is invoked.
    pub fn update_batched(&self) -> Result<Vec<Listener>> {
        self.runtime.update_batched(self.id)
    }

    /// Add a dependent. Subscribing twice is a no-op.
    ///
    /// The dependent must belong to the same runtime.
    pub fn subscribe(&self, dependent: impl Into<Dependent>) {
        self.runtime.subscribe(self.id, dependent.into());
    }

    /// Remove a dependent. Removing an absent one is a no-op.
    pub fn unsubscribe(&self, dependent: impl Into<Dependent>) {
        self.runtime.unsubscribe(self.id, dependent.into());
    }

    /// True iff anything, live or not, depends on this entry.
    pub fn has_dependencies(&self) -> bool {
        self.runtime.has_dependencies(self.id)
    }

    /// True iff a leaf listener is reachable from this entry.
    pub fn has_listeners(&self) -> bool {
        self.runtime.has_listeners(self.id)
    }

    pub fn dependent_count(&self) -> usize {
        self.runtime.dependent_count(self.id)
    }
}

impl PartialEq for KeyHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.runtime.same(&other.runtime)
    }
}

impl Eq for KeyHandle {}

impl Hash for KeyHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("node", &self.node)
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl From<&KeyHandle> for Dependent {
    fn from(handle: &KeyHandle) -> Self {
        Dependent::Edge(handle.id)
    }
}
