//! Where released waiters are resumed.

use std::fmt;

use tokio::runtime::Handle;

use crate::error::{Result, ThrottleError};

/// Work handed to a scheduler once a waiter has been released.
pub type ReleaseWork = Box<dyn FnOnce() + Send + 'static>;

/// Runs release work after the throttle lock has been dropped.
pub trait ReleaseScheduler: Send + Sync + fmt::Debug {
    fn schedule(&self, work: ReleaseWork);
}

/// Runs work immediately on the releasing thread, after the lock is dropped
/// but still inside the releasing call. Meant for tests and synchronous
/// embeddings that accept the re-entrancy.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineScheduler;

impl ReleaseScheduler for InlineScheduler {
    fn schedule(&self, work: ReleaseWork) {
        work();
    }
}

/// Runs work as a task on a tokio runtime, off the releasing call stack.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling context.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ThrottleError::IllegalState(format!("no tokio runtime: {}", e)))
    }
}

impl ReleaseScheduler for TokioScheduler {
    fn schedule(&self, work: ReleaseWork) {
        self.handle.spawn(async move { work() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_inline_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        InlineScheduler.schedule(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_current_requires_runtime() {
        assert!(matches!(
            TokioScheduler::current(),
            Err(ThrottleError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn test_tokio_runs_on_runtime() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        scheduler.schedule(Box::new(move || {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.await.unwrap(), 7);
    }
}
