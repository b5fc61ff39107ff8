//! Reactive Primitives
//!
//! This module implements the memoization engine: keyed memos, the handles
//! that stand for their keys, leaf listeners, and the runtime that ties
//! them together. Signals and effects are thin primitives built on the
//! same machinery.
//!
//! # Concepts
//!
//! ## Memos
//!
//! A Memo caches one result per key derived from its arguments. A key is
//! recomputed only when it is read after being invalidated, or eagerly when
//! a leaf listener is reachable downstream of it.
//!
//! ## Key Handles
//!
//! A Key Handle stands for one `(memo, key)` entry. Dependents subscribe to
//! handles, so each key of a memo has its own dependents.
//!
//! ## Listeners
//!
//! A Listener is a leaf callback. It is notified at most once per update,
//! and only when a value it observes actually changed.
//!
//! ## Signals and Effects
//!
//! A Signal is a settable source; an Effect re-runs a closure whenever a
//! key it read changes.
//!
//! # Implementation Notes
//!
//! Reads are tracked through a stack of accumulation sets owned by the
//! runtime: a memo called while another evaluation runs records its handle
//! in the innermost set, and [`Runtime::autosubscribe`] turns the collected
//! reads into subscriptions when the evaluation returns.

mod context;
mod effect;
mod handle;
mod memo;
mod runtime;
mod signal;
mod subscriber;

pub use effect::Effect;
pub use handle::KeyHandle;
pub use memo::Memo;
pub use runtime::Runtime;
pub use signal::Signal;
pub use subscriber::{Listener, ListenerId};
