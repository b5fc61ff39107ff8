//! Memo Implementation
//!
//! A Memo is a keyed, cached computation. Each distinct key derived from the
//! call arguments owns an independent cache entry, an independent set of
//! dependents, and an independent set of upstream subscriptions.
//!
//! # How Memos Work
//!
//! 1. A call derives the key from its arguments and, if another evaluation
//!    is running, records a read of that key's handle.
//!
//! 2. A cached result is returned as is.
//!
//! 3. On a miss, the arguments are stored and the computation runs as a
//!    tracked evaluation whose listener is the key's own handle, so the keys
//!    it reads become its upstream subscriptions.
//!
//! 4. When an upstream key changes, the key is refreshed:
//!    - if a leaf listener is reachable downstream, it recomputes from the
//!      stored arguments and only propagates if the result differs
//!    - otherwise the cache entry is dropped and the next call recomputes
//!
//! # Why This Matters
//!
//! Unobserved subgraphs cost nothing on invalidation: a key nobody listens
//! to is never recomputed until someone reads it again.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::handle::KeyHandle;
use super::runtime::{Reactive, Refresh, Registration, Runtime};
use super::subscriber::Listener;
use crate::error::Result;
use crate::graph::{Dependent, HandleId, Key, NodeId};

type Compute<A, R> = Box<dyn Fn(&A) -> Result<R> + Send + Sync>;
type KeyFn<A> = Box<dyn Fn(&A) -> Key + Send + Sync>;

/// Per-key cache state.
struct MemoState<A, R> {
    results: HashMap<Key, R>,
    args: HashMap<Key, Arc<A>>,
}

struct MemoInner<A, R> {
    id: NodeId,
    runtime: Runtime,
    compute: Compute<A, R>,
    key_fn: Option<KeyFn<A>>,
    state: Mutex<MemoState<A, R>>,
    evaluations: AtomicUsize,
    _registration: Registration,
}

/// A keyed memoized computation.
///
/// # Type Parameters
///
/// - `A`: the argument type. Use a tuple for several positional arguments.
/// - `R`: the result type. `PartialEq` decides whether a recomputation
///   changed anything; `Clone` hands cached results out.
///
/// Cloning a `Memo` creates another handle to the same node. The node is
/// discarded, and its edges removed from the graph, when the last handle is
/// dropped.
///
/// # Example
///
/// ```
/// use reckon_core::{Memo, Runtime};
///
/// let runtime = Runtime::new();
/// let square = Memo::keyed(&runtime, |x: &i64| x * x, |x| x.to_string());
///
/// assert_eq!(square.call(4).unwrap(), 16);
/// assert_eq!(square.call(4).unwrap(), 16);
/// assert_eq!(square.evaluation_count(), 1);
/// ```
pub struct Memo<A, R> {
    inner: Arc<MemoInner<A, R>>,
}

impl<A, R> Memo<A, R>
where
    A: Send + Sync + 'static,
    R: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a memo with a single, unkeyed cache entry.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        Self::build(runtime, Box::new(move |args: &A| Ok(compute(args))), None)
    }

    /// Create an unkeyed memo whose computation can fail.
    pub fn try_new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn(&A) -> Result<R> + Send + Sync + 'static,
    {
        Self::build(runtime, Box::new(compute), None)
    }

    /// Create a memo with one cache entry per key derived from the
    /// arguments.
    pub fn keyed<F, K, KF>(runtime: &Runtime, compute: F, key_fn: KF) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
        K: Into<Key>,
        KF: Fn(&A) -> K + Send + Sync + 'static,
    {
        Self::build(
            runtime,
            Box::new(move |args: &A| Ok(compute(args))),
            Some(Box::new(move |args: &A| key_fn(args).into())),
        )
    }

    /// Create a keyed memo whose computation can fail.
    pub fn try_keyed<F, K, KF>(runtime: &Runtime, compute: F, key_fn: KF) -> Self
    where
        F: Fn(&A) -> Result<R> + Send + Sync + 'static,
        K: Into<Key>,
        KF: Fn(&A) -> K + Send + Sync + 'static,
    {
        Self::build(
            runtime,
            Box::new(compute),
            Some(Box::new(move |args: &A| key_fn(args).into())),
        )
    }

    fn build(runtime: &Runtime, compute: Compute<A, R>, key_fn: Option<KeyFn<A>>) -> Self {
        let id = NodeId::new();
        let inner = Arc::new_cyclic(|weak: &Weak<MemoInner<A, R>>| {
            let erased: Weak<dyn Reactive> = weak.clone();
            MemoInner {
                id,
                runtime: runtime.clone(),
                compute,
                key_fn,
                state: Mutex::new(MemoState {
                    results: HashMap::new(),
                    args: HashMap::new(),
                }),
                evaluations: AtomicUsize::new(0),
                _registration: runtime.register(id, erased),
            }
        });
        trace!(runtime = %runtime.label(), node = %id, "memo created");
        Self { inner }
    }

    /// Get the value for `args`, computing it if necessary.
    ///
    /// Inside another evaluation, this also records a read of the key the
    /// arguments map to.
    pub fn call(&self, args: A) -> Result<R> {
        let inner = &*self.inner;
        let runtime = &inner.runtime;
        let _evaluation = runtime.enter_evaluation();

        let key = inner.key_for(&args);
        let handle = runtime.handle(inner.id, &key);
        runtime.track_read(handle);
        runtime.pull(handle)?;

        let cached = inner.state.lock().results.get(&key).cloned();
        if let Some(value) = cached {
            trace!(runtime = %runtime.label(), node = %inner.id, %key, "cache hit");
            return Ok(value);
        }

        let args = Arc::new(args);
        inner
            .state
            .lock()
            .args
            .insert(key.clone(), Arc::clone(&args));

        let value = inner.evaluate(&key, handle, &args, "miss")?;
        inner.state.lock().results.insert(key, value.clone());
        Ok(value)
    }

    /// The key `args` map to.
    pub fn key_for(&self, args: &A) -> Key {
        self.inner.key_for(args)
    }

    /// The handle for one key of this memo.
    pub fn key(&self, key: impl Into<Key>) -> KeyHandle {
        KeyHandle::new(&self.inner.runtime, self.inner.id, key.into())
    }

    /// The handle for the unkeyed entry.
    pub fn void_key(&self) -> KeyHandle {
        self.key(Key::void())
    }

    /// Invalidate one key.
    ///
    /// Invalidating a key this memo has never seen is a no-op. A key that
    /// has a live handle but was never evaluated has nothing to recompute,
    /// so it counts as unchanged and its listeners do not fire.
    pub fn update_key(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        match self.inner.runtime.lookup_handle(self.inner.id, &key) {
            Some(handle) => self.inner.runtime.update(handle),
            None => Ok(()),
        }
    }

    /// Invalidate the unkeyed entry. See [`Memo::update_key`].
    pub fn update(&self) -> Result<()> {
        self.update_key(Key::void())
    }

    /// Alias of [`Memo::update`].
    pub fn invalidate(&self) -> Result<()> {
        self.update()
    }

    /// Invalidate the unkeyed entry and return the listeners that would
    /// fire instead of invoking them.
    pub fn update_batched(&self) -> Result<Vec<Listener>> {
        self.void_key().update_batched()
    }

    pub fn subscribe(&self, dependent: impl Into<Dependent>) {
        self.void_key().subscribe(dependent);
    }

    pub fn unsubscribe(&self, dependent: impl Into<Dependent>) {
        self.void_key().unsubscribe(dependent);
    }

    pub fn has_dependencies(&self) -> bool {
        self.void_key().has_dependencies()
    }

    pub fn has_listeners(&self) -> bool {
        self.void_key().has_listeners()
    }
}

impl<A, R> Memo<A, R> {
    /// Get the memo's node ID, also its debug identifier.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Number of times the computation has run.
    pub fn evaluation_count(&self) -> usize {
        self.inner.evaluations.load(Ordering::Relaxed)
    }

    /// Check if `key` has a cached result.
    pub fn is_cached(&self, key: impl Into<Key>) -> bool {
        self.inner.state.lock().results.contains_key(&key.into())
    }

    /// Number of keys with a cached result.
    pub fn cached_len(&self) -> usize {
        self.inner.state.lock().results.len()
    }
}

impl<A, R: Clone> Memo<A, R> {
    /// The cached result for `key`, without evaluating or tracking.
    pub fn cached(&self, key: impl Into<Key>) -> Option<R> {
        self.inner.state.lock().results.get(&key.into()).cloned()
    }
}

impl<R> Memo<(), R>
where
    R: Clone + PartialEq + Send + Sync + 'static,
{
    /// Shorthand for `call(())`.
    pub fn get(&self) -> Result<R> {
        self.call(())
    }
}

impl<A, R> MemoInner<A, R>
where
    A: Send + Sync + 'static,
    R: Clone + PartialEq + Send + Sync + 'static,
{
    fn key_for(&self, args: &A) -> Key {
        match &self.key_fn {
            Some(key_fn) => key_fn(args),
            None => Key::void(),
        }
    }

    /// Run the computation for `key` as a tracked evaluation.
    fn evaluate(&self, key: &Key, handle: HandleId, args: &A, reason: &'static str) -> Result<R> {
        self.runtime.log_evaluation(self.id, key, reason);
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let result = self
            .runtime
            .autosubscribe(Dependent::Edge(handle), || (self.compute)(args));
        if let Err(err) = &result {
            warn!(runtime = %self.runtime.label(), node = %self.id, %key, error = %err, "computation failed");
        }
        result
    }
}

impl<A, R> Reactive for MemoInner<A, R>
where
    A: Send + Sync + 'static,
    R: Clone + PartialEq + Send + Sync + 'static,
{
    fn refresh(&self, key: &Key, handle: HandleId) -> Result<Refresh> {
        if !self.runtime.has_listeners(handle) {
            let dropped = self.state.lock().results.remove(key).is_some();
            debug!(runtime = %self.runtime.label(), node = %self.id, %key, dropped, "lazy invalidation");
            return Ok(Refresh::Dropped);
        }

        // A key that was referenced but never evaluated has nothing to redo.
        let args = self.state.lock().args.get(key).cloned();
        let Some(args) = args else {
            return Ok(Refresh::Unchanged);
        };

        match self.evaluate(key, handle, &args, "update") {
            Ok(value) => {
                let mut state = self.state.lock();
                if state.results.get(key) == Some(&value) {
                    trace!(runtime = %self.runtime.label(), node = %self.id, %key, "result unchanged");
                    Ok(Refresh::Unchanged)
                } else {
                    state.results.insert(key.clone(), value);
                    Ok(Refresh::Changed)
                }
            }
            Err(err) => {
                self.state.lock().results.remove(key);
                Err(err)
            }
        }
    }

    fn discard(&self, key: &Key) {
        if self.state.lock().results.remove(key).is_some() {
            debug!(runtime = %self.runtime.label(), node = %self.id, %key, "cache entry discarded");
        }
    }
}

impl<A, R> Clone for Memo<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R> fmt::Debug for Memo<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("cached", &self.cached_len())
            .field("evaluations", &self.evaluation_count())
            .finish()
    }
}

impl<A, R> fmt::Display for Memo<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.id, f)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
