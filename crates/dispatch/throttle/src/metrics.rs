//! Throttle counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters for one throttle.
#[derive(Debug, Default)]
pub struct ThrottleMetrics {
    acquired: AtomicU64,
    denied: AtomicU64,
    released: AtomicU64,
    exceeded_warnings: AtomicU64,
}

/// Point-in-time copy of [`ThrottleMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleMetricsSnapshot {
    /// Acquires granted immediately.
    pub acquired: u64,
    /// Acquires that had to wait.
    pub denied: u64,
    /// Waiters handed to the release callback.
    pub released: u64,
    pub exceeded_warnings: u64,
}

impl ThrottleMetrics {
    pub(crate) fn record_acquire(&self, granted: bool) {
        let counter = if granted { &self.acquired } else { &self.denied };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_released(&self, waiters: usize) {
        self.released.fetch_add(waiters as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_warning(&self) {
        self.exceeded_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ThrottleMetricsSnapshot {
        ThrottleMetricsSnapshot {
            acquired: self.acquired.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            exceeded_warnings: self.exceeded_warnings.load(Ordering::Relaxed),
        }
    }
}
