//! Reactive Runtime
//!
//! The runtime is the explicit context that connects memos, listeners and
//! the dependency graph. Every node belongs to exactly one runtime, and
//! several runtimes can coexist without sharing any state.
//!
//! # How It Works
//!
//! 1. When a memo is created, it registers with the runtime so that
//!    propagation can reach it by [`NodeId`].
//!
//! 2. When a memo is called inside a tracked evaluation, the runtime
//!    records a read of the memo's Key Handle in the innermost
//!    accumulation set.
//!
//! 3. When the evaluation finishes, [`Runtime::autosubscribe`] diffs the
//!    reads against the listener's previous subscriptions and rewires the
//!    graph.
//!
//! 4. When a key is updated, the runtime:
//!    a. Marks its handle dirty
//!    b. Visits dirty handles in topological order
//!    c. Lets each node refresh the key eagerly (live subgraph) or lazily
//!    d. Invokes every leaf listener reached, once
//!
//! # Thread Safety
//!
//! A runtime can be shared across threads, but only one evaluation runs at
//! a time. The evaluation lock is re-entrant, so a computation can call
//! other memos (or update keys) on the same thread, while other threads
//! wait until the outermost evaluation returns. Internal tables are never
//! locked while user code runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use tracing::{debug, debug_span, trace, warn};

use super::context::TrackingContext;
use super::subscriber::{Listener, ListenerId, ListenerInner};
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::graph::{Dependent, Graph, HandleId, Key, NodeId, Propagation};

/// Result of refreshing one key during propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refresh {
    /// No leaf was reachable; the cache entry was dropped.
    Dropped,
    /// Recomputed to an equal value.
    Unchanged,
    /// Recomputed to a different value.
    Changed,
}

/// A node that propagation can refresh.
pub(crate) trait Reactive: Send + Sync {
    /// Bring `key` up to date after one of its inputs changed.
    ///
    /// Implementations decide between the eager and the lazy path with
    /// [`Runtime::has_listeners`].
    fn refresh(&self, key: &Key, handle: HandleId) -> Result<Refresh>;

    /// Drop the cached entry for `key` without recomputing it.
    fn discard(&self, key: &Key);
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,

    /// Held for the dynamic extent of every evaluation.
    evaluation: ReentrantMutex<()>,

    tracking: TrackingContext,

    graph: Mutex<Graph>,

    /// The in-flight propagation, if an update is running.
    propagation: Mutex<Option<Propagation>>,

    // Weak references so that dropping a node discards it.
    nodes: RwLock<HashMap<NodeId, Weak<dyn Reactive>>>,
    listeners: Mutex<HashMap<ListenerId, Weak<ListenerInner>>>,
}

impl RuntimeInner {
    pub(crate) fn forget_listener(&self, id: ListenerId) {
        let _evaluation = self.evaluation.lock();
        self.listeners.lock().remove(&id);
        self.graph.lock().forget_listener(id);
        trace!(runtime = %self.config.label, listener = ?id, "listener dropped");
    }

    fn unregister(&self, node: NodeId) {
        let _evaluation = self.evaluation.lock();
        self.nodes.write().remove(&node);
        self.graph.lock().remove_node(node);
        trace!(runtime = %self.config.label, %node, "node discarded");
    }
}

/// Keeps a node registered; unregisters it and drops its edges on drop.
pub(crate) struct Registration {
    runtime: Weak<RuntimeInner>,
    node: NodeId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.unregister(self.node);
        }
    }
}

/// Clears the propagation slot when the update loop exits.
///
/// If the loop exits early, through an error or a panic, every handle still
/// dirty and everything downstream of it loses its cache entry.
struct PropagationScope<'a> {
    runtime: &'a Runtime,
}

impl PropagationScope<'_> {
    fn finish(self) -> Option<Propagation> {
        self.runtime.inner.propagation.lock().take()
    }
}

impl Drop for PropagationScope<'_> {
    fn drop(&mut self) {
        let abandoned = self.runtime.inner.propagation.lock().take();
        if let Some(propagation) = abandoned {
            self.runtime.discard_dirty(propagation);
        }
    }
}

/// The engine context shared by a family of memos.
///
/// Cloning a `Runtime` creates another handle to the same engine.
///
/// # Example
///
/// ```
/// use reckon_core::{Listener, Memo, Runtime};
///
/// let runtime = Runtime::new();
/// let base = Memo::new(&runtime, |_: &()| 21);
/// let base_clone = base.clone();
/// let doubled = Memo::try_new(&runtime, move |_: &()| Ok(base_clone.get()? * 2));
///
/// let listener = Listener::new(&runtime, || println!("doubled changed"));
/// let value = runtime.autosubscribe(&listener, || doubled.get()).unwrap();
/// assert_eq!(value, 42);
/// assert!(base.has_listeners());
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let graph = Graph::with_capacity(config.handle_capacity);
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                evaluation: ReentrantMutex::new(()),
                tracking: TrackingContext::default(),
                graph: Mutex::new(graph),
                propagation: Mutex::new(None),
                nodes: RwLock::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn label(&self) -> &str {
        &self.inner.config.label
    }

    /// Run `f` as a tracked evaluation on behalf of `listener`.
    ///
    /// Every memo key read while `f` runs becomes a subscription of
    /// `listener`; keys read by its previous evaluation but not by this one
    /// are unsubscribed. Returns whatever `f` returns.
    pub fn autosubscribe<T>(&self, listener: impl Into<Dependent>, f: impl FnOnce() -> T) -> T {
        let listener = listener.into();
        let _evaluation = self.enter_evaluation();

        let scope = self.inner.tracking.enter();
        let value = f();
        let reads = scope.finish();

        let diff = self.inner.graph.lock().reconcile(listener, reads);
        if !diff.is_empty() {
            debug!(
                runtime = %self.label(),
                listener = ?listener,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "subscriptions rewired"
            );
        }

        value
    }

    /// Check if a tracked evaluation is running.
    pub fn is_tracking(&self) -> bool {
        self.inner.tracking.is_active()
    }

    /// Number of nested tracked evaluations currently running.
    pub fn tracking_depth(&self) -> usize {
        self.inner.tracking.depth()
    }

    /// Number of Key Handles ever created.
    pub fn handle_count(&self) -> usize {
        self.inner.graph.lock().handle_count()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.read().len()
    }

    // ------------------------------------------------------------------
    // Crate-internal plumbing
    // ------------------------------------------------------------------

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn same(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn enter_evaluation(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.evaluation.lock()
    }

    pub(crate) fn register(&self, id: NodeId, node: Weak<dyn Reactive>) -> Registration {
        self.inner.nodes.write().insert(id, node);
        Registration {
            runtime: self.downgrade(),
            node: id,
        }
    }

    pub(crate) fn register_listener(&self, listener: &Arc<ListenerInner>) {
        self.inner
            .listeners
            .lock()
            .insert(listener.id(), Arc::downgrade(listener));
    }

    fn node(&self, id: NodeId) -> Option<Arc<dyn Reactive>> {
        self.inner.nodes.read().get(&id).and_then(Weak::upgrade)
    }

    pub(crate) fn handle(&self, node: NodeId, key: &Key) -> HandleId {
        self.inner.graph.lock().intern(node, key)
    }

    pub(crate) fn lookup_handle(&self, node: NodeId, key: &Key) -> Option<HandleId> {
        self.inner.graph.lock().lookup(node, key)
    }

    /// Record a read of `handle` in the innermost accumulation set.
    pub(crate) fn track_read(&self, handle: HandleId) {
        if self.inner.tracking.record(handle) {
            trace!(runtime = %self.label(), handle = ?handle, "read tracked");
        }
    }

    pub(crate) fn subscribe(&self, handle: HandleId, dependent: Dependent) {
        let _evaluation = self.enter_evaluation();
        self.inner.graph.lock().subscribe(handle, dependent);
    }

    pub(crate) fn unsubscribe(&self, handle: HandleId, dependent: Dependent) {
        let _evaluation = self.enter_evaluation();
        self.inner.graph.lock().unsubscribe(handle, dependent);
    }

    pub(crate) fn has_dependencies(&self, handle: HandleId) -> bool {
        self.inner.graph.lock().has_dependencies(handle)
    }

    pub(crate) fn has_listeners(&self, handle: HandleId) -> bool {
        self.inner.graph.lock().has_listeners(handle)
    }

    pub(crate) fn dependent_count(&self, handle: HandleId) -> usize {
        self.inner.graph.lock().dependent_count(handle)
    }

    /// Handles `listener` subscribed to in its last tracked evaluation.
    pub(crate) fn subscriptions_of(&self, listener: Dependent) -> Vec<HandleId> {
        self.inner.graph.lock().subscriptions_of(listener)
    }

    pub(crate) fn log_evaluation(&self, node: NodeId, key: &Key, reason: &'static str) {
        if self.inner.config.trace_evaluations {
            debug!(runtime = %self.label(), %node, %key, reason, "evaluating");
        } else {
            trace!(runtime = %self.label(), %node, %key, reason, "evaluating");
        }
    }

    /// Invalidate `root` and invoke every leaf listener reached, once each.
    pub(crate) fn update(&self, root: HandleId) -> Result<()> {
        let _evaluation = self.enter_evaluation();
        let listeners = self.update_batched(root)?;
        for listener in &listeners {
            listener.notify();
        }
        Ok(())
    }

    /// Invalidate `root` and return the leaf listeners that would fire.
    ///
    /// An update issued while another one is in flight joins it: the root
    /// is marked dirty, and its listeners fire with the outer batch.
    pub(crate) fn update_batched(&self, root: HandleId) -> Result<Vec<Listener>> {
        let _evaluation = self.enter_evaluation();

        {
            let mut slot = self.inner.propagation.lock();
            if let Some(active) = slot.as_mut() {
                active.mark_dirty(root);
                trace!(runtime = %self.label(), root = ?root, "joined in-flight propagation");
                return Ok(Vec::new());
            }
            *slot = Some(Propagation::new(root));
        }

        let scope = PropagationScope { runtime: self };
        let _span = debug_span!("propagate", runtime = %self.label(), root = ?root).entered();

        loop {
            let seeds = match self.inner.propagation.lock().as_mut() {
                Some(propagation) if propagation.has_dirty() => propagation.start_round(),
                _ => break,
            };
            let order = self.inner.graph.lock().topological_order(seeds);
            debug!(handles = order.len(), "propagation round");

            for handle in order {
                self.refresh_if_dirty(handle)?;
            }
        }

        let pending = scope
            .finish()
            .map(|propagation| {
                debug!(rounds = propagation.rounds(), "propagation settled");
                propagation.into_pending()
            })
            .unwrap_or_default();

        Ok(self.resolve_listeners(&pending))
    }

    /// Refresh `handle` first if an in-flight propagation marked it dirty.
    ///
    /// Called before a memo serves a read, so a computation never sees a
    /// value its propagation has not reached yet.
    pub(crate) fn pull(&self, handle: HandleId) -> Result<()> {
        self.refresh_if_dirty(handle)
    }

    fn with_propagation<T>(&self, f: impl FnOnce(&mut Propagation) -> T) -> Option<T> {
        self.inner.propagation.lock().as_mut().map(f)
    }

    fn refresh_if_dirty(&self, handle: HandleId) -> Result<()> {
        if self.with_propagation(|p| p.is_dirty(handle)) != Some(true) {
            return Ok(());
        }

        let Some((node_id, key)) = self.resolve(handle) else {
            self.with_propagation(|p| p.settle(handle));
            return Ok(());
        };
        let Some(node) = self.node(node_id) else {
            trace!(runtime = %self.label(), node = %node_id, %key, "skipping discarded node");
            self.with_propagation(|p| p.settle(handle));
            return Ok(());
        };

        // The handle stays dirty until the refresh succeeds, so a failure
        // leaves it to be discarded with the abandoned propagation.
        let outcome = node.refresh(&key, handle)?;
        self.with_propagation(|p| p.settle(handle));

        if outcome == Refresh::Unchanged {
            return Ok(());
        }

        let dependents = self.inner.graph.lock().dependents(handle);
        self.with_propagation(|propagation| {
            for dependent in dependents {
                match dependent {
                    Dependent::Edge(downstream) => propagation.mark_dirty(downstream),
                    Dependent::Leaf(id) if outcome == Refresh::Changed => propagation.notify(id),
                    Dependent::Leaf(_) => {}
                }
            }
        });

        Ok(())
    }

    fn resolve(&self, handle: HandleId) -> Option<(NodeId, Key)> {
        self.inner
            .graph
            .lock()
            .resolve(handle)
            .map(|(node, key)| (node, key.clone()))
    }

    /// Run the lazy path over an abandoned propagation: drop the cache of
    /// every dirty handle and of everything reachable from them.
    fn discard_dirty(&self, propagation: Propagation) {
        let dirty = propagation.into_dirty();
        if dirty.is_empty() {
            return;
        }

        let order = self.inner.graph.lock().topological_order(dirty);
        for &handle in &order {
            let Some((node_id, key)) = self.resolve(handle) else {
                continue;
            };
            if let Some(node) = self.node(node_id) {
                node.discard(&key);
            }
        }
        warn!(runtime = %self.label(), handles = order.len(), "propagation abandoned, caches dropped");
    }

    fn resolve_listeners(&self, ids: &[ListenerId]) -> Vec<Listener> {
        let listeners = self.inner.listeners.lock();
        ids.iter()
            .filter_map(|id| listeners.get(id).and_then(Weak::upgrade))
            .map(Listener::from_inner)
            .collect()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("label", &self.label())
            .field("nodes", &self.node_count())
            .field("handles", &self.handle_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    /// A node whose refresh outcome is scripted by the test.
    struct MockReactive {
        id: NodeId,
        outcome: Mutex<Refresh>,
        refreshed: AtomicI32,
    }

    impl MockReactive {
        fn new(outcome: Refresh) -> Arc<Self> {
            Arc::new(Self {
                id: NodeId::new(),
                outcome: Mutex::new(outcome),
                refreshed: AtomicI32::new(0),
            })
        }
    }

    impl Reactive for MockReactive {
        fn refresh(&self, _key: &Key, _handle: HandleId) -> Result<Refresh> {
            self.refreshed.fetch_add(1, Ordering::SeqCst);
            Ok(*self.outcome.lock())
        }

        fn discard(&self, _key: &Key) {}
    }

    fn register(runtime: &Runtime, node: &Arc<MockReactive>) -> (Registration, HandleId) {
        let weak: Weak<MockReactive> = Arc::downgrade(node);
        let erased: Weak<dyn Reactive> = weak;
        let registration = runtime.register(node.id, erased);
        let handle = runtime.handle(node.id, &Key::void());
        (registration, handle)
    }

    #[test]
    fn runtime_registers_and_unregisters() {
        let runtime = Runtime::new();
        let node = MockReactive::new(Refresh::Changed);

        let (registration, _) = register(&runtime, &node);
        assert_eq!(runtime.node_count(), 1);

        drop(registration);
        assert_eq!(runtime.node_count(), 0);
    }

    #[test]
    fn autosubscribe_rewires_listener() {
        let runtime = Runtime::new();
        let listener = Listener::new(&runtime, || {});
        let first = runtime.handle(NodeId::new(), &Key::void());
        let second = runtime.handle(NodeId::new(), &Key::void());

        let value = runtime.autosubscribe(&listener, || {
            assert!(runtime.is_tracking());
            runtime.track_read(first);
            7
        });
        assert_eq!(value, 7);
        assert!(runtime.has_listeners(first));
        assert!(!runtime.is_tracking());

        runtime.autosubscribe(&listener, || runtime.track_read(second));
        assert!(!runtime.has_dependencies(first));
        assert!(runtime.has_listeners(second));
    }

    #[test]
    fn changed_refresh_notifies_leaves_once() {
        let runtime = Runtime::new();
        let node = MockReactive::new(Refresh::Changed);
        let (_registration, handle) = register(&runtime, &node);

        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let listener = Listener::new(&runtime, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        runtime.subscribe(handle, Dependent::from(&listener));

        let batch = runtime.update_batched(handle).unwrap();
        assert_eq!(batch, vec![listener.clone()]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        runtime.update(handle).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(node.refreshed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unchanged_refresh_stops_propagation() {
        let runtime = Runtime::new();
        let upstream = MockReactive::new(Refresh::Unchanged);
        let downstream = MockReactive::new(Refresh::Changed);
        let (_r1, up) = register(&runtime, &upstream);
        let (_r2, down) = register(&runtime, &downstream);

        runtime.subscribe(up, Dependent::Edge(down));
        let listener = Listener::new(&runtime, || {});
        runtime.subscribe(down, Dependent::from(&listener));

        assert!(runtime.update_batched(up).unwrap().is_empty());
        assert_eq!(upstream.refreshed.load(Ordering::SeqCst), 1);
        assert_eq!(downstream.refreshed.load(Ordering::SeqCst), 0);

        *upstream.outcome.lock() = Refresh::Changed;
        assert_eq!(runtime.update_batched(up).unwrap(), vec![listener]);
        assert_eq!(downstream.refreshed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_listener_detaches() {
        let runtime = Runtime::new();
        let handle = runtime.handle(NodeId::new(), &Key::void());

        let listener = Listener::new(&runtime, || {});
        runtime.subscribe(handle, Dependent::from(&listener));
        assert!(runtime.has_listeners(handle));

        drop(listener);
        assert!(!runtime.has_listeners(handle));
    }

    #[test]
    fn update_without_node_is_a_no_op() {
        let runtime = Runtime::new();
        let handle = runtime.handle(NodeId::new(), &Key::void());
        assert!(runtime.update_batched(handle).unwrap().is_empty());
    }
}
