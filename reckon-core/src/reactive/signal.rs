//! Signal Implementation
//!
//! A Signal is a mutable data source that takes part in the dependency
//! graph. Memos that read it subscribe to it like to any other key; setting
//! a new value invalidates it exactly like updating a memo key.
//!
//! # How Signals Work
//!
//! 1. Reading a signal inside an evaluation records a read of its handle.
//!
//! 2. Setting a value equal to the current one does nothing.
//!
//! 3. Setting a different value starts a propagation from the signal. Live
//!    dependents recompute, unobserved ones drop their cache.
//!
//! 4. Updating the signal's handle directly, without a new value, reaches
//!    nothing: the signal reports itself unchanged.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::handle::KeyHandle;
use super::runtime::{Reactive, Refresh, Registration, Runtime};
use crate::error::Result;
use crate::graph::{Dependent, HandleId, Key, NodeId};

struct SignalInner<T> {
    id: NodeId,
    handle: KeyHandle,
    value: RwLock<T>,
    /// Set by a write the next propagation has not delivered yet.
    staged: AtomicBool,
    _registration: Registration,
}

impl<T> Reactive for SignalInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn refresh(&self, _key: &Key, _handle: HandleId) -> Result<Refresh> {
        if !self.staged.swap(false, Ordering::AcqRel) {
            return Ok(Refresh::Unchanged);
        }
        if self.handle.has_listeners() {
            Ok(Refresh::Changed)
        } else {
            Ok(Refresh::Dropped)
        }
    }

    // The value is the source of truth; a staged write stays staged.
    fn discard(&self, _key: &Key) {}
}

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```
/// use reckon_core::{Memo, Runtime, Signal};
///
/// let runtime = Runtime::new();
/// let start = Signal::new(&runtime, 2);
///
/// let start_clone = start.clone();
/// let doubled = Memo::new(&runtime, move |_: &()| start_clone.get() * 2);
/// assert_eq!(doubled.get().unwrap(), 4);
///
/// start.set(6).unwrap();
/// assert_eq!(doubled.get().unwrap(), 12);
/// ```
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        let id = NodeId::new();
        let inner = Arc::new_cyclic(|weak: &Weak<SignalInner<T>>| {
            let erased: Weak<dyn Reactive> = weak.clone();
            SignalInner {
                id,
                handle: KeyHandle::new(runtime, id, Key::void()),
                value: RwLock::new(value),
                staged: AtomicBool::new(false),
                _registration: runtime.register(id, erased),
            }
        });
        Self { inner }
    }

    /// Get the current value.
    ///
    /// If called within a tracked evaluation, this also subscribes the
    /// evaluation to the signal.
    pub fn get(&self) -> T {
        let _evaluation = self.runtime().enter_evaluation();
        self.runtime().track_read(self.inner.handle.id());
        self.get_untracked()
    }

    /// Get the current value without tracking a read.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and propagate if it differs from the current one.
    ///
    /// Errors come from dependents that failed to recompute.
    pub fn set(&self, value: T) -> Result<()> {
        let _evaluation = self.runtime().enter_evaluation();
        let changed = {
            let mut guard = self.inner.value.write();
            if *guard == value {
                false
            } else {
                *guard = value;
                self.inner.staged.store(true, Ordering::Release);
                true
            }
        };

        if changed {
            self.inner.handle.update()
        } else {
            Ok(())
        }
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&*self.inner.value.read());
        self.set(new_value)
    }

    pub fn subscribe(&self, dependent: impl Into<Dependent>) {
        self.inner.handle.subscribe(dependent);
    }

    pub fn unsubscribe(&self, dependent: impl Into<Dependent>) {
        self.inner.handle.unsubscribe(dependent);
    }

    pub fn has_listeners(&self) -> bool {
        self.inner.handle.has_listeners()
    }

    pub fn has_dependencies(&self) -> bool {
        self.inner.handle.has_dependencies()
    }
}

impl<T> Signal<T> {
    /// Get the signal's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The handle other nodes subscribe to.
    ///
    /// Updating it without setting a new value leaves dependents alone.
    pub fn handle(&self) -> &KeyHandle {
        &self.inner.handle
    }

    fn runtime(&self) -> &Runtime {
        self.inner.handle.runtime()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Signal<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Listener, Memo};
    use std::sync::atomic::AtomicI32;

    #[test]
    fn signal_get_and_set() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 0);
        assert_eq!(signal.get(), 0);

        signal.set(42).unwrap();
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 10);
        signal.update(|v| v + 5).unwrap();
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_notifies_listeners_on_change_only() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let listener = Listener::new(&runtime, move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        signal.subscribe(&listener);
        assert!(signal.has_listeners());

        signal.set(1).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.set(1).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.unsubscribe(&listener);
        signal.set(2).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bare_handle_update_does_not_notify() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 5);
        let signal_clone = signal.clone();
        let plus_one = Memo::new(&runtime, move |_: &()| signal_clone.get() + 1);

        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        let listener = Listener::new(&runtime, move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        signal.subscribe(&listener);
        plus_one.subscribe(&listener);
        assert_eq!(plus_one.get().unwrap(), 6);

        signal.handle().update().unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
        assert_eq!(plus_one.evaluation_count(), 1);

        signal.set(7).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(plus_one.cached(Key::void()), Some(8));
    }

    #[test]
    fn memo_reading_signal_is_invalidated() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 3);
        let signal_clone = signal.clone();
        let tripled = Memo::new(&runtime, move |_: &()| signal_clone.get() * 3);

        assert_eq!(tripled.get().unwrap(), 9);
        assert!(signal.has_dependencies());
        assert!(!signal.has_listeners());

        // Nobody listens: the memo is dropped, not recomputed.
        signal.set(4).unwrap();
        assert_eq!(tripled.evaluation_count(), 1);
        assert_eq!(tripled.get().unwrap(), 12);
        assert_eq!(tripled.evaluation_count(), 2);
    }

    #[test]
    fn signal_clone_shares_state() {
        let runtime = Runtime::new();
        let signal1 = Signal::new(&runtime, 0);
        let signal2 = signal1.clone();

        signal1.set(42).unwrap();
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.id(), signal2.id());
    }
}
