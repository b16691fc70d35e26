//! Filter rules configuration
//!
//! The filter rules file selects which events become alerts. Each list is
//! matched case-insensitively against the event's involved-object kind,
//! event type, and reason; an empty or omitted list matches everything.
//!
//! ```yaml
//! kinds:
//!   - Pod
//!   - Node
//! types:
//!   - Warning
//! reasons:
//!   - Failed
//!   - FailedScheduling
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Filter rules loaded once at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Involved-object kinds to alert on (e.g. "Pod", "Node")
    #[serde(default)]
    pub kinds: Vec<String>,

    /// Event types to alert on (e.g. "Warning", "Normal")
    #[serde(default)]
    pub types: Vec<String>,

    /// Event reasons to alert on (e.g. "Failed", "BackOff")
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl FilterConfig {
    /// Load filter rules from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;

        let config: FilterConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| Error::Config(format!("failed to parse config YAML: {e}")))?;

        Ok(config)
    }

    /// Returns `true` when no rules are configured, i.e. every event alerts.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty() && self.types.is_empty() && self.reasons.is_empty()
    }
}
