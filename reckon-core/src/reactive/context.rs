//! Tracking Context
//!
//! The tracking context records which Key Handles are read while a
//! computation runs. This enables automatic dependency tracking: when a
//! memo is called inside another evaluation, the read lands in the
//! innermost accumulation set.
//!
//! # Implementation
//!
//! Each runtime owns a stack of accumulation sets. Entering a tracked
//! evaluation pushes a fresh set and returns a [`TrackingScope`] guard;
//! finishing the scope pops the set and hands it back. The stack is strict
//! LIFO, and only the top set receives reads.
//!
//! If the computation unwinds, the guard pops its set on drop so the stack
//! never keeps a stale frame.

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::graph::HandleId;

/// The stack of accumulation sets for one runtime.
#[derive(Debug, Default)]
pub(crate) struct TrackingContext {
    frames: Mutex<Vec<IndexSet<HandleId>>>,
}

impl TrackingContext {
    /// Push a fresh accumulation set.
    ///
    /// The set is popped when the returned guard is finished or dropped.
    pub fn enter(&self) -> TrackingScope<'_> {
        let mut frames = self.frames.lock();
        frames.push(IndexSet::new());
        TrackingScope {
            context: self,
            depth: frames.len(),
            finished: false,
        }
    }

    /// Check if there is an active accumulation set.
    pub fn is_active(&self) -> bool {
        !self.frames.lock().is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Record a read in the innermost accumulation set.
    ///
    /// Returns false when no evaluation is being tracked.
    pub fn record(&self, handle: HandleId) -> bool {
        match self.frames.lock().last_mut() {
            Some(frame) => {
                frame.insert(handle);
                true
            }
            None => false,
        }
    }

    fn pop(&self, depth: usize) -> IndexSet<HandleId> {
        let mut frames = self.frames.lock();
        debug_assert_eq!(
            frames.len(),
            depth,
            "tracking scope mismatch: expected depth {}, got {}",
            depth,
            frames.len()
        );
        frames.pop().unwrap_or_default()
    }
}

/// Guard for one tracked evaluation.
#[must_use = "dropping the scope discards the recorded reads"]
pub(crate) struct TrackingScope<'a> {
    context: &'a TrackingContext,
    depth: usize,
    finished: bool,
}

impl TrackingScope<'_> {
    /// Pop the accumulation set and return the handles read.
    pub fn finish(mut self) -> IndexSet<HandleId> {
        self.finished = true;
        self.context.pop(self.depth)
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.context.pop(self.depth);
        }
    }
}
