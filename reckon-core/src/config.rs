//! Runtime configuration.
//!
//! Hosts usually take the defaults. A configuration document can also be
//! loaded from JSON, with every field optional:
//!
//! ```
//! use reckon_core::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json(r#"{ "label": "sheet" }"#).unwrap();
//! assert_eq!(config.label, "sheet");
//! assert_eq!(config.handle_capacity, 64);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for one [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name attached to log events and `Debug` output.
    pub label: String,

    /// Initial capacity of the Key Handle arena.
    pub handle_capacity: usize,

    /// Log every evaluation at `debug` instead of `trace`.
    pub trace_evaluations: bool,
}

impl RuntimeConfig {
    pub fn from_json(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            label: "reckon".to_string(),
            handle_capacity: 64,
            trace_evaluations: false,
        }
    }
}
