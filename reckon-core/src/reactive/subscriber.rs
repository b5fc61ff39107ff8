//! Leaf listeners.
//!
//! A listener is a terminal callback in the dependency graph. Listeners are
//! what make a subgraph "live": keys with a listener reachable downstream
//! are recomputed eagerly when invalidated, everything else is dropped
//! lazily.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::runtime::{Runtime, RuntimeInner};
use crate::graph::Dependent;

/// Unique identifier for a listener.
///
/// Dependents sets store this ID, so a listener attached to several keys is
/// still notified at most once per propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct ListenerInner {
    id: ListenerId,
    /// The callback to invoke when an observed key changes.
    notify: Box<dyn Fn() + Send + Sync>,
    runtime: Weak<RuntimeInner>,
}

impl Drop for ListenerInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.forget_listener(self.id);
        }
    }
}

/// A terminal callback registered with a [`Runtime`].
///
/// Cloning a `Listener` creates another handle to the same callback. When
/// the last handle is dropped the listener is detached from every key it
/// was subscribed to.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// Register a new listener with the given callback.
    pub fn new<F>(runtime: &Runtime, notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(ListenerInner {
            id: ListenerId::new(),
            notify: Box::new(notify),
            runtime: runtime.downgrade(),
        });
        runtime.register_listener(&inner);
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ListenerInner>) -> Self {
        Self { inner }
    }

    /// Get the listener's unique ID.
    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    /// Invoke the callback.
    pub fn notify(&self) {
        (self.inner.notify)();
    }
}

impl ListenerInner {
    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id()).finish()
    }
}

impl From<&Listener> for Dependent {
    fn from(listener: &Listener) -> Self {
        Dependent::Leaf(listener.id())
    }
}
