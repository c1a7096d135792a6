//! Capacity-bounded admission throttle.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{Result, ThrottleError};
use crate::metrics::ThrottleMetrics;
use crate::observer::{notify, ThrottleObserver};
use crate::scheduler::ReleaseScheduler;
use crate::warning::LimitWarning;

/// Receives a waiter once capacity frees up for it.
pub type ReleaseFn<T> = Arc<dyn Fn(T) + Send + Sync>;

struct FlowState<T> {
    capacity: usize,
    count: usize,
    waiters: VecDeque<T>,
    warning: LimitWarning,
}

/// Admits up to `capacity` holders at once and queues the rest in FIFO order.
///
/// A queued token is handed to the release callback when a holder releases;
/// the freed slot passes to it directly, so the count does not drop.
pub struct FlowThrottle<T> {
    name: String,
    state: Mutex<FlowState<T>>,
    release: ReleaseFn<T>,
    scheduler: Arc<dyn ReleaseScheduler>,
    observer: Option<Arc<dyn ThrottleObserver>>,
    metrics: ThrottleMetrics,
}

impl<T: Send + 'static> FlowThrottle<T> {
    /// Released waiters are handed to `scheduler`, never run on the
    /// releasing call. Fails with `IllegalState` when `capacity` is zero.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        release: ReleaseFn<T>,
        scheduler: Arc<dyn ReleaseScheduler>,
    ) -> Result<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(ThrottleError::IllegalState(format!(
                "throttle {} needs a positive capacity",
                name
            )));
        }
        Ok(Self {
            name,
            state: Mutex::new(FlowState {
                capacity,
                count: 0,
                waiters: VecDeque::new(),
                warning: LimitWarning::new(capacity),
            }),
            release,
            scheduler,
            observer: None,
            metrics: ThrottleMetrics::default(),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ThrottleObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take a slot for `token`. Returns false if the token was queued; it is
    /// then delivered to the release callback once a slot frees up.
    pub fn acquire(&self, token: T) -> bool {
        let (granted, count, capacity) = {
            let mut state = self.state.lock();
            let granted = if state.count < state.capacity {
                state.count += 1;
                true
            } else {
                if state.waiters.is_empty() && state.warning.exceeded() {
                    warn!(
                        throttle = %self.name,
                        capacity = state.capacity,
                        "throttle capacity reached, callers are now queued"
                    );
                    self.metrics.record_warning();
                }
                state.waiters.push_back(token);
                false
            };
            (granted, state.count, state.capacity)
        };

        self.metrics.record_acquire(granted);
        let observer = self.observer.as_ref();
        notify(observer, &self.name, |o| o.acquired(&self.name, granted));
        notify(observer, &self.name, |o| o.ratio(&self.name, count, capacity));
        granted
    }

    /// Give back a slot. The oldest waiter, if any, inherits it.
    pub fn release(&self) {
        let (next, count, capacity) = {
            let mut state = self.state.lock();
            let next = state.waiters.pop_front();
            if next.is_none() {
                state.count = state.count.saturating_sub(1);
                let count = state.count;
                if state.warning.observe(count) {
                    info!(
                        throttle = %self.name,
                        count,
                        restore_limit = state.warning.restore_limit(),
                        "throttle back under 70% of capacity"
                    );
                }
            }
            (next, state.count, state.capacity)
        };

        if let Some(token) = next {
            self.metrics.record_released(1);
            let release = self.release.clone();
            self.scheduler.schedule(Box::new(move || release(token)));
        }
        let observer = self.observer.as_ref();
        notify(observer, &self.name, |o| o.released(&self.name));
        notify(observer, &self.name, |o| o.ratio(&self.name, count, capacity));
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Change the capacity. Current holders and waiters are left as they are.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(ThrottleError::IllegalState(format!(
                "throttle {} needs a positive capacity",
                self.name
            )));
        }
        let mut state = self.state.lock();
        state.capacity = capacity;
        state.warning.set_capacity(capacity);
        Ok(())
    }

    /// Holders currently admitted.
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Whether the exceeded warning has fired and not yet re-armed.
    pub fn is_warning_issued(&self) -> bool {
        self.state.lock().warning.is_fired()
    }

    pub fn metrics(&self) -> &ThrottleMetrics {
        &self.metrics
    }
}

impl<T> fmt::Debug for FlowThrottle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FlowThrottle")
            .field("name", &self.name)
            .field("capacity", &state.capacity)
            .field("count", &state.count)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{InlineScheduler, TokioScheduler};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recording() -> (ReleaseFn<u32>, Arc<Mutex<Vec<u32>>>) {
        let released = Arc::new(Mutex::new(Vec::<u32>::new()));
        let sink = released.clone();
        let release: ReleaseFn<u32> = Arc::new(move |token: u32| sink.lock().push(token));
        (release, released)
    }

    #[test]
    fn test_zero_capacity_is_illegal() {
        let (release, _) = recording();
        assert!(matches!(
            FlowThrottle::new("calls", 0, release, Arc::new(InlineScheduler)),
            Err(ThrottleError::IllegalState(_))
        ));
    }

    #[test]
    fn test_third_acquire_waits_for_release() {
        let (release, released) = recording();
        let throttle = FlowThrottle::new("calls", 2, release, Arc::new(InlineScheduler)).unwrap();

        assert!(throttle.acquire(1));
        assert!(throttle.acquire(2));
        assert!(!throttle.is_warning_issued());
        assert!(!throttle.acquire(3));
        assert!(throttle.is_warning_issued());
        assert_eq!(throttle.waiting(), 1);

        throttle.release();
        assert_eq!(*released.lock(), vec![3]);
        assert_eq!(throttle.count(), 2);
        assert!(throttle.is_warning_issued());

        // restore limit for capacity 2 is 1
        throttle.release();
        assert_eq!(throttle.count(), 1);
        assert!(throttle.is_warning_issued());
        throttle.release();
        assert_eq!(throttle.count(), 0);
        assert!(!throttle.is_warning_issued());
    }

    #[test]
    fn test_waiters_released_in_order() {
        let (release, released) = recording();
        let throttle = FlowThrottle::new("calls", 1, release, Arc::new(InlineScheduler)).unwrap();
        assert!(throttle.acquire(0));
        for token in 1..=4 {
            assert!(!throttle.acquire(token));
        }
        for _ in 0..4 {
            throttle.release();
        }
        assert_eq!(*released.lock(), vec![1, 2, 3, 4]);
        assert_eq!(throttle.count(), 1);
    }

    #[test]
    fn test_warning_fires_once_per_cycle() {
        let (release, _) = recording();
        let throttle = FlowThrottle::new("calls", 2, release, Arc::new(InlineScheduler)).unwrap();
        for token in 0..4 {
            throttle.acquire(token);
        }
        assert_eq!(throttle.metrics().snapshot().exceeded_warnings, 1);
        for _ in 0..4 {
            throttle.release();
        }
        assert_eq!(throttle.count(), 0);

        for token in 4..7 {
            throttle.acquire(token);
        }
        assert_eq!(throttle.metrics().snapshot().exceeded_warnings, 2);
    }

    #[test]
    fn test_capacity_change_is_not_retroactive() {
        let (release, released) = recording();
        let throttle = FlowThrottle::new("calls", 1, release, Arc::new(InlineScheduler)).unwrap();
        throttle.acquire(0);
        throttle.acquire(1);
        throttle.set_capacity(3).unwrap();
        assert_eq!(throttle.waiting(), 1);
        assert!(released.lock().is_empty());
        assert!(throttle.acquire(2));
        assert_eq!(throttle.count(), 2);
        assert!(throttle.set_capacity(0).is_err());
    }

    #[derive(Default)]
    struct Ratios {
        last: AtomicUsize,
        events: AtomicUsize,
    }

    impl ThrottleObserver for Ratios {
        fn ratio(&self, _throttle: &str, count: usize, _capacity: usize) {
            self.last.store(count, Ordering::SeqCst);
            self.events.fetch_add(1, Ordering::SeqCst);
        }

        fn released(&self, _throttle: &str) {
            panic!("diagnostics must not break releases");
        }
    }

    #[test]
    fn test_observer_sees_ratio_and_cannot_break_release() {
        let (release, _) = recording();
        let ratios = Arc::new(Ratios::default());
        let throttle = FlowThrottle::new("sessions", 4, release, Arc::new(InlineScheduler))
            .unwrap()
            .with_observer(ratios.clone());
        throttle.acquire(1);
        throttle.acquire(2);
        assert_eq!(ratios.last.load(Ordering::SeqCst), 2);
        throttle.release();
        assert_eq!(ratios.last.load(Ordering::SeqCst), 1);
        assert_eq!(ratios.events.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_metrics_snapshot() {
        let (release, _) = recording();
        let throttle = FlowThrottle::new("calls", 1, release, Arc::new(InlineScheduler)).unwrap();
        throttle.acquire(1);
        throttle.acquire(2);
        throttle.release();
        let snapshot = throttle.metrics().snapshot();
        assert_eq!(snapshot.acquired, 1);
        assert_eq!(snapshot.denied, 1);
        assert_eq!(snapshot.released, 1);
    }

    #[tokio::test]
    async fn test_waiter_resumes_after_release_returns() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<u32>();
        let release: ReleaseFn<u32> = Arc::new(move |token: u32| {
            let _ = tx.send(token);
        });
        let scheduler = Arc::new(TokioScheduler::current().unwrap());
        let throttle = FlowThrottle::new("calls", 1, release, scheduler).unwrap();
        assert!(throttle.acquire(1));
        assert!(!throttle.acquire(2));

        throttle.release();
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(throttle.count(), 1);
    }

    proptest! {
        #[test]
        fn prop_count_bounded_and_fifo(
            capacity in 1usize..6,
            ops in proptest::collection::vec(any::<bool>(), 0..64),
        ) {
            let (release, released) = recording();
            let throttle = FlowThrottle::new("calls", capacity, release, Arc::new(InlineScheduler)).unwrap();
            let mut next = 0u32;
            for acquire in ops {
                if acquire {
                    throttle.acquire(next);
                    next += 1;
                } else {
                    throttle.release();
                }
                prop_assert!(throttle.count() <= capacity);
                prop_assert!(throttle.waiting() == 0 || throttle.count() == capacity);
            }
            let order = released.lock().clone();
            prop_assert!(order.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
