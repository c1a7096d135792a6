//! Service-level throttling of calls, sessions and instance contexts.

use std::sync::Arc;

use crate::config::ThrottleConfig;
use crate::error::Result;
use crate::flow::{FlowThrottle, ReleaseFn};
use crate::metrics::ThrottleMetricsSnapshot;
use crate::observer::ThrottleObserver;
use crate::scheduler::ReleaseScheduler;

/// Continuation that resumes a queued caller.
pub type Waiter = Box<dyn FnOnce() + Send + 'static>;

/// Release callback that simply runs the waiter.
pub fn resume_waiter() -> ReleaseFn<Waiter> {
    Arc::new(|waiter: Waiter| waiter())
}

/// The three capacity gates a service host applies to incoming work.
///
/// Each `acquire_*` takes a [`Waiter`]. If admission is immediate it returns
/// true and the waiter is dropped unused; otherwise the waiter runs on the
/// scheduler once a slot is handed over.
#[derive(Debug)]
pub struct ServiceThrottle {
    calls: FlowThrottle<Waiter>,
    sessions: FlowThrottle<Waiter>,
    instance_contexts: FlowThrottle<Waiter>,
}

impl ServiceThrottle {
    pub fn new(config: &ThrottleConfig, scheduler: Arc<dyn ReleaseScheduler>) -> Result<Self> {
        let gate = |name: &str, capacity: usize| {
            FlowThrottle::new(name, capacity, resume_waiter(), scheduler.clone())
        };
        Ok(Self {
            calls: gate("calls", config.max_concurrent_calls)?,
            sessions: gate("sessions", config.max_concurrent_sessions)?,
            instance_contexts: gate("instance_contexts", config.max_concurrent_instances)?,
        })
    }

    /// Attach the same observer to all three gates.
    pub fn with_observer(self, observer: Arc<dyn ThrottleObserver>) -> Self {
        Self {
            calls: self.calls.with_observer(observer.clone()),
            sessions: self.sessions.with_observer(observer.clone()),
            instance_contexts: self.instance_contexts.with_observer(observer),
        }
    }

    pub fn acquire_call(&self, waiter: Waiter) -> bool {
        self.calls.acquire(waiter)
    }

    pub fn release_call(&self) {
        self.calls.release();
    }

    pub fn acquire_session(&self, waiter: Waiter) -> bool {
        self.sessions.acquire(waiter)
    }

    pub fn release_session(&self) {
        self.sessions.release();
    }

    pub fn acquire_instance_context(&self, waiter: Waiter) -> bool {
        self.instance_contexts.acquire(waiter)
    }

    pub fn release_instance_context(&self) {
        self.instance_contexts.release();
    }

    pub fn max_concurrent_calls(&self) -> usize {
        self.calls.capacity()
    }

    pub fn set_max_concurrent_calls(&self, capacity: usize) -> Result<()> {
        self.calls.set_capacity(capacity)
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.sessions.capacity()
    }

    pub fn set_max_concurrent_sessions(&self, capacity: usize) -> Result<()> {
        self.sessions.set_capacity(capacity)
    }

    pub fn max_concurrent_instances(&self) -> usize {
        self.instance_contexts.capacity()
    }

    pub fn set_max_concurrent_instances(&self, capacity: usize) -> Result<()> {
        self.instance_contexts.set_capacity(capacity)
    }

    pub fn calls(&self) -> &FlowThrottle<Waiter> {
        &self.calls
    }

    pub fn sessions(&self) -> &FlowThrottle<Waiter> {
        &self.sessions
    }

    pub fn instance_contexts(&self) -> &FlowThrottle<Waiter> {
        &self.instance_contexts
    }

    pub fn call_metrics(&self) -> ThrottleMetricsSnapshot {
        self.calls.metrics().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThrottleError;
    use crate::scheduler::InlineScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(calls: usize) -> ThrottleConfig {
        ThrottleConfig {
            max_concurrent_calls: calls,
            max_concurrent_sessions: 4,
            max_concurrent_instances: 8,
        }
    }

    #[test]
    fn test_queued_call_resumes_on_release() {
        let throttle = ServiceThrottle::new(&config(1), Arc::new(InlineScheduler)).unwrap();
        let resumed = Arc::new(AtomicUsize::new(0));

        assert!(throttle.acquire_call(Box::new(|| {})));
        let r = resumed.clone();
        assert!(!throttle.acquire_call(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })));
        assert_eq!(resumed.load(Ordering::SeqCst), 0);

        throttle.release_call();
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
        assert_eq!(throttle.calls().count(), 1);
    }

    #[test]
    fn test_gates_are_independent() {
        let throttle = ServiceThrottle::new(&config(1), Arc::new(InlineScheduler)).unwrap();
        assert!(throttle.acquire_call(Box::new(|| {})));
        assert!(throttle.acquire_session(Box::new(|| {})));
        assert!(throttle.acquire_instance_context(Box::new(|| {})));
        assert_eq!(throttle.sessions().count(), 1);
        throttle.release_session();
        throttle.release_instance_context();
        assert_eq!(throttle.instance_contexts().count(), 0);
    }

    #[test]
    fn test_live_capacity_changes() {
        let throttle = ServiceThrottle::new(&config(2), Arc::new(InlineScheduler)).unwrap();
        throttle.set_max_concurrent_calls(5).unwrap();
        assert_eq!(throttle.max_concurrent_calls(), 5);
        throttle.set_max_concurrent_sessions(1).unwrap();
        assert_eq!(throttle.max_concurrent_sessions(), 1);
        assert_eq!(
            throttle.set_max_concurrent_instances(0),
            Err(ThrottleError::IllegalState(
                "throttle instance_contexts needs a positive capacity".to_string()
            ))
        );
        assert_eq!(throttle.max_concurrent_instances(), 8);
    }

    #[test]
    fn test_zero_capacity_config_rejected() {
        let err = ServiceThrottle::new(&config(0), Arc::new(InlineScheduler)).unwrap_err();
        assert!(matches!(err, ThrottleError::IllegalState(_)));
    }
}
