//! Effect Implementation
//!
//! An Effect is a side-effecting observer that re-runs whenever a key it
//! read changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function inside
//!    [`Runtime::autosubscribe`] with its own leaf listener, which subscribes
//!    it to every key the function reads.
//!
//! 2. When one of those keys changes, the propagation reaches the listener
//!    and the effect runs again.
//!
//! 3. Each run re-diffs the subscriptions, so a branch that stops reading a
//!    key also stops being notified by it.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are demand-driven; effects keep their whole upstream live.
//! - An effect is a leaf: nothing can depend on it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use super::runtime::Runtime;
use super::subscriber::Listener;
use crate::graph::Dependent;

struct EffectInner {
    runtime: Runtime,
    run: Box<dyn Fn() + Send + Sync>,
    listener: Listener,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.runtime.autosubscribe(&self.listener, || (self.run)());
        self.run_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A side-effecting computation that runs when its inputs change.
///
/// # Example
///
/// ```
/// use reckon_core::{Effect, Runtime, Signal};
///
/// let runtime = Runtime::new();
/// let count = Signal::new(&runtime, 0);
///
/// let count_clone = count.clone();
/// let effect = Effect::new(&runtime, move || {
///     println!("Count is: {}", count_clone.get());
/// });
///
/// count.set(5).unwrap(); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish its subscriptions.
    pub fn new<F>(runtime: &Runtime, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(runtime, run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it.
    ///
    /// It observes nothing until the first [`Effect::execute`].
    pub fn new_lazy<F>(runtime: &Runtime, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<EffectInner>| {
            let weak = weak.clone();
            EffectInner {
                runtime: runtime.clone(),
                run: Box::new(run),
                listener: Listener::new(runtime, move || {
                    if let Some(effect) = weak.upgrade() {
                        effect.execute();
                    }
                }),
                disposed: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
            }
        });
        Self { inner }
    }

    /// Run the effect function and re-diff its subscriptions.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Stop the effect and drop all of its subscriptions.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        // An empty tracked run unsubscribes from everything read before.
        self.inner.runtime.autosubscribe(&self.inner.listener, || {});
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of keys the last run subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .runtime
            .subscriptions_of(Dependent::from(&self.inner.listener))
            .len()
    }

    /// The leaf listener the effect observes through.
    pub fn listener(&self) -> &Listener {
        &self.inner.listener
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("listener", &self.inner.listener.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Memo, Signal};
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let runtime = Runtime::new();
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new(&runtime, move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let runtime = Runtime::new();
        let effect = Effect::new_lazy(&runtime, || {});
        assert_eq!(effect.run_count(), 0);

        effect.execute();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_input_changes() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 1);
        let seen = Arc::new(AtomicI32::new(0));

        let signal_clone = signal.clone();
        let seen_clone = seen.clone();
        let effect = Effect::new(&runtime, move || {
            seen_clone.store(signal_clone.get(), Ordering::SeqCst);
        });
        assert_eq!(effect.dependency_count(), 1);
        assert!(signal.has_listeners());

        signal.set(7).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(effect.run_count(), 2);

        // Same value: no propagation.
        signal.set(7).unwrap();
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_follows_branch_changes() {
        let runtime = Runtime::new();
        let use_left = Signal::new(&runtime, true);
        let left = Signal::new(&runtime, 1);
        let right = Signal::new(&runtime, 2);

        let (u, l, r) = (use_left.clone(), left.clone(), right.clone());
        let effect = Effect::new(&runtime, move || {
            let _ = if u.get() { l.get() } else { r.get() };
        });
        assert!(left.has_listeners());
        assert!(!right.has_listeners());

        use_left.set(false).unwrap();
        assert!(!left.has_listeners());
        assert!(right.has_listeners());

        left.set(10).unwrap();
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_keeps_memo_chain_live() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 2);
        let signal_clone = signal.clone();
        let doubled = Memo::new(&runtime, move |_: &()| signal_clone.get() * 2);

        let doubled_clone = doubled.clone();
        let effect = Effect::new(&runtime, move || {
            let _ = doubled_clone.get();
        });
        assert!(doubled.has_listeners());

        signal.set(3).unwrap();
        assert_eq!(doubled.cached(crate::graph::Key::void()), Some(6));
        assert_eq!(doubled.evaluation_count(), 2);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 0);
        let signal_clone = signal.clone();
        let effect = Effect::new(&runtime, move || {
            let _ = signal_clone.get();
        });

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(effect.dependency_count(), 0);
        assert!(!signal.has_listeners());

        signal.set(1).unwrap();
        effect.execute();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn dropping_effect_detaches_listener() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 0);
        let signal_clone = signal.clone();
        let effect = Effect::new(&runtime, move || {
            let _ = signal_clone.get();
        });
        assert!(signal.has_listeners());

        drop(effect);
        assert!(!signal.has_listeners());
    }
}
