//! Diagnostic hooks on throttle activity.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

/// Receives throttle activity. Every method defaults to doing nothing.
///
/// Hooks run after the throttle lock has been released. A panicking hook is
/// logged and otherwise ignored.
pub trait ThrottleObserver: Send + Sync {
    fn acquired(&self, _throttle: &str, _granted: bool) {}

    fn released(&self, _throttle: &str) {}

    /// Occupancy after an acquire or release.
    fn ratio(&self, _throttle: &str, _count: usize, _capacity: usize) {}
}

pub(crate) fn notify(
    observer: Option<&Arc<dyn ThrottleObserver>>,
    throttle: &str,
    hook: impl FnOnce(&dyn ThrottleObserver),
) {
    let Some(observer) = observer else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| hook(observer.as_ref()))).is_err() {
        error!(throttle, "throttle observer panicked");
    }
}
