//! Query evaluation limits.

use serde::{Deserialize, Serialize};

/// Limits applied while compiling and evaluating queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Nodes one evaluation may visit before `NodeCountExceeded` is raised.
    pub node_quota: usize,
    /// Deepest predicate nesting the compiler accepts.
    pub max_predicate_depth: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            node_quota: 10_000,
            max_predicate_depth: 8,
        }
    }
}
