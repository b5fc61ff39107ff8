//! Reckon Core
//!
//! This crate provides a keyed reactive memoization engine. It implements:
//!
//! - Keyed memos with one cache entry per argument key
//! - Automatic dependency tracking between memo keys
//! - Lazy invalidation of unobserved keys, eager recomputation of observed ones
//! - Batched, deduplicated listener notification
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: memos, key handles, listeners, and the runtime
//! - `graph`: the dependency edges and propagation scheduling
//! - `config`: runtime configuration
//! - `error`: the error type shared by every fallible operation
//!
//! # Example
//!
//! ```rust
//! use reckon_core::{Listener, Memo, Runtime, Signal};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let runtime = Runtime::new();
//! let start = Signal::new(&runtime, 2);
//!
//! let s = start.clone();
//! let scaled = Memo::keyed(&runtime, move |x: &i64| s.get() * x, |x| x.to_string());
//!
//! let fired = Arc::new(AtomicUsize::new(0));
//! let fired_clone = fired.clone();
//! let listener = Listener::new(&runtime, move || {
//!     fired_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! let value = runtime.autosubscribe(&listener, || scaled.call(10)).unwrap();
//! assert_eq!(value, 20);
//!
//! start.set(3).unwrap();
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! assert_eq!(scaled.cached("10"), Some(30));
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use graph::{Dependent, HandleId, Key, NodeId, VOID_KEY};
pub use reactive::{Effect, KeyHandle, Listener, ListenerId, Memo, Runtime, Signal};
