//! Dynamically adjusted admission quota.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, ThrottleError};
use crate::flow::ReleaseFn;
use crate::metrics::ThrottleMetrics;
use crate::scheduler::ReleaseScheduler;
use crate::warning::LimitWarning;

struct QuotaState<T> {
    limit: i32,
    waiters: VecDeque<T>,
    warning: LimitWarning,
}

impl<T> QuotaState<T> {
    fn is_enabled(&self) -> bool {
        self.limit != QuotaThrottle::<T>::DISABLED
    }

    /// Hand out as many waiters as the new limit allows.
    fn limit_changed(&mut self) -> Vec<T> {
        if !self.is_enabled() {
            return self.waiters.drain(..).collect();
        }
        self.warning.rearm();
        let available = usize::try_from(self.limit).unwrap_or(0);
        if available == 0 || self.waiters.is_empty() {
            return Vec::new();
        }
        if available < self.waiters.len() {
            self.limit = 0;
            self.waiters.drain(..available).collect()
        } else {
            let released: Vec<T> = self.waiters.drain(..).collect();
            // released.len() <= available, which came from an i32
            self.limit -= released.len() as i32;
            released
        }
    }
}

/// An admission quota that is unlimited until a limit is set.
///
/// While enabled, every grant consumes one unit of the limit; a caller
/// arriving at a zero limit waits until the limit is raised. Released
/// waiters are handed to the scheduler one by one, after the lock is
/// dropped.
pub struct QuotaThrottle<T> {
    name: String,
    state: Mutex<QuotaState<T>>,
    release: ReleaseFn<T>,
    scheduler: Arc<dyn ReleaseScheduler>,
    metrics: ThrottleMetrics,
}

impl<T> QuotaThrottle<T> {
    /// Sentinel limit meaning the quota is off.
    pub const DISABLED: i32 = i32::MAX;
}

impl<T: Send + 'static> QuotaThrottle<T> {
    /// Starts disabled. Released waiters are handed to `scheduler`.
    pub fn new(
        name: impl Into<String>,
        release: ReleaseFn<T>,
        scheduler: Arc<dyn ReleaseScheduler>,
    ) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QuotaState {
                limit: Self::DISABLED,
                waiters: VecDeque::new(),
                warning: LimitWarning::new(1),
            }),
            release,
            scheduler,
            metrics: ThrottleMetrics::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns false if `token` was queued behind an exhausted limit.
    pub fn acquire(&self, token: T) -> bool {
        let granted = {
            let mut state = self.state.lock();
            if !state.is_enabled() {
                true
            } else if state.limit > 0 {
                state.limit -= 1;
                if state.limit == 0 && state.warning.exceeded() {
                    warn!(throttle = %self.name, "quota limit reached");
                    self.metrics.record_warning();
                }
                true
            } else {
                state.waiters.push_back(token);
                false
            }
        };
        self.metrics.record_acquire(granted);
        granted
    }

    /// Replace the limit. Fails on a negative limit.
    pub fn set_limit(&self, limit: i32) -> Result<()> {
        if limit < 0 {
            return Err(ThrottleError::InvalidArgument(format!(
                "quota limit must not be negative, got {}",
                limit
            )));
        }
        let released = {
            let mut state = self.state.lock();
            state.limit = limit;
            state.limit_changed()
        };
        debug!(throttle = %self.name, limit, released = released.len(), "quota limit set");
        self.schedule(released);
        Ok(())
    }

    /// Raise an enabled limit by `delta` and return the resulting limit.
    /// A disabled quota is left disabled.
    pub fn increment_limit(&self, delta: i32) -> Result<i32> {
        if delta < 0 {
            return Err(ThrottleError::InvalidArgument(format!(
                "quota increment must not be negative, got {}",
                delta
            )));
        }
        let (limit, released) = {
            let mut state = self.state.lock();
            if !state.is_enabled() {
                return Ok(Self::DISABLED);
            }
            state.limit = match state.limit.checked_add(delta) {
                Some(limit) if limit != Self::DISABLED => limit,
                _ => {
                    return Err(ThrottleError::InvalidArgument(format!(
                        "quota limit {} + {} overflows",
                        state.limit, delta
                    )))
                }
            };
            let released = state.limit_changed();
            (state.limit, released)
        };
        self.schedule(released);
        Ok(limit)
    }

    /// Turn the quota off and release every waiter.
    pub fn disable(&self) {
        let released = {
            let mut state = self.state.lock();
            state.limit = Self::DISABLED;
            state.limit_changed()
        };
        debug!(throttle = %self.name, released = released.len(), "quota disabled");
        self.schedule(released);
    }

    pub fn limit(&self) -> i32 {
        self.state.lock().limit
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().is_enabled()
    }

    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    pub fn metrics(&self) -> &ThrottleMetrics {
        &self.metrics
    }

    fn schedule(&self, released: Vec<T>) {
        if released.is_empty() {
            return;
        }
        self.metrics.record_released(released.len());
        for token in released {
            let release = self.release.clone();
            self.scheduler.schedule(Box::new(move || release(token)));
        }
    }
}

impl<T> fmt::Debug for QuotaThrottle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("QuotaThrottle")
            .field("name", &self.name)
            .field("limit", &state.limit)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}
