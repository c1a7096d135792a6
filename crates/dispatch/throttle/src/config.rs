//! Throttle configuration.

use serde::{Deserialize, Serialize};

fn processor_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Capacities of the three service-level throttles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// In-flight calls across all endpoints.
    pub max_concurrent_calls: usize,
    /// Open sessions.
    pub max_concurrent_sessions: usize,
    /// Live service instance contexts.
    pub max_concurrent_instances: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        let cpus = processor_count();
        let calls = 16 * cpus;
        let sessions = 100 * cpus;
        Self {
            max_concurrent_calls: calls,
            max_concurrent_sessions: sessions,
            max_concurrent_instances: calls + sessions,
        }
    }
}
