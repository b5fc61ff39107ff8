//! Graph Nodes
//!
//! This module defines the identities that live in the dependency graph:
//! node IDs, cache keys, Key Handle indices and the dependent edges
//! connecting them.

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::reactive::ListenerId;

/// The reserved key used when a node has no key function.
pub const VOID_KEY: &str = "__void__";

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reactive({})", self.0)
    }
}

/// Discriminator for the independent cache entries of one node.
///
/// Keys are opaque strings. [`Key::void`] is the sentinel used by nodes
/// created without a key function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Arc<str>);

impl Key {
    /// Create a key from any string.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// The "no explicit key" sentinel.
    pub fn void() -> Self {
        Self(Arc::from(VOID_KEY))
    }

    pub fn is_void(&self) -> bool {
        &*self.0 == VOID_KEY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::void()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

impl From<&String> for Key {
    fn from(key: &String) -> Self {
        Self::new(key)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// Index of a Key Handle in the graph's handle arena.
///
/// A handle stands for one `(node, key)` pair. Handles are interned, so two
/// lookups of the same pair always yield the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(usize);

impl HandleId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// An edge target in the dependency graph.
///
/// A key's dependents are either terminal callbacks or the Key Handle of
/// another node's entry whose last evaluation read this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependent {
    /// A terminal listener callback.
    Leaf(ListenerId),
    /// Another node's cache entry.
    Edge(HandleId),
}

impl Dependent {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Dependent::Leaf(_))
    }
}

impl From<ListenerId> for Dependent {
    fn from(id: ListenerId) -> Self {
        Dependent::Leaf(id)
    }
}

impl From<HandleId> for Dependent {
    fn from(id: HandleId) -> Self {
        Dependent::Edge(id)
    }
}
