//! Routing table configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Entries kept in the flat cache before the table switches to indexed mode.
    pub cache_threshold: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { cache_threshold: 2 }
    }
}
