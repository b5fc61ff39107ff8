//! Error types.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Errors returned by the engine.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A computation function failed.
    ///
    /// The failing key's cache entry is left empty, so the next read
    /// retries the computation.
    #[error("computation failed: {0}")]
    Compute(#[source] Arc<dyn StdError + Send + Sync>),

    /// A configuration document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[source] Arc<serde_json::Error>),
}

impl Error {
    /// Wrap any error (or message) as a computation failure.
    ///
    /// ```
    /// use reckon_core::Error;
    ///
    /// let err = Error::compute("division by zero");
    /// assert_eq!(err.to_string(), "computation failed: division by zero");
    /// ```
    pub fn compute(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error::Compute(Arc::from(source.into()))
    }

    pub fn is_compute(&self) -> bool {
        matches!(self, Error::Compute(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(Arc::new(err))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
