//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Tunables for one [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Reject components whose sinks can only be triggered by each other.
    pub detect_value_cycles: bool,

    /// Upper bound on follow-up passes queued by a single external trigger.
    pub max_passes: usize,

    /// Assert engine invariants such as duplicate subscriptions.
    pub check_invariants: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            detect_value_cycles: true,
            max_passes: 10_000,
            check_invariants: cfg!(debug_assertions),
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
