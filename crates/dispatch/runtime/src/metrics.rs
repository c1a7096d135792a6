//! Dispatcher counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct DispatchMetrics {
    dispatched: AtomicU64,
    no_endpoint: AtomicU64,
    address_only: AtomicU64,
    ambiguous: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMetricsSnapshot {
    /// Envelopes a handler completed.
    pub dispatched: u64,
    /// Envelopes no endpoint address accepted.
    pub no_endpoint: u64,
    /// Envelopes whose address matched but whose contract did not.
    pub address_only: u64,
    pub ambiguous: u64,
    /// Routing or handler failures other than ambiguity.
    pub failures: u64,
}

impl DispatchMetrics {
    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unrouted(&self, address_matched: bool) {
        let counter = if address_matched {
            &self.address_only
        } else {
            &self.no_endpoint
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ambiguous(&self) {
        self.ambiguous.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            no_endpoint: self.no_endpoint.load(Ordering::Relaxed),
            address_only: self.address_only.load(Ordering::Relaxed),
            ambiguous: self.ambiguous.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
