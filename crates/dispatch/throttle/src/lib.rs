//! Dispatch Admission Throttles.
//!
//! Bounded-concurrency gates with FIFO wait queues:
//!
//! - [`FlowThrottle`]: fixed capacity; a release hands the slot to the
//!   oldest waiter. Breaching capacity warns once until occupancy falls
//!   below 70% again ([`LimitWarning`]).
//! - [`QuotaThrottle`]: a consumable limit that is off until set; raising
//!   it releases waiters in arrival order.
//! - [`ServiceThrottle`]: the call, session and instance-context gates of
//!   a service host.
//!
//! No lock is held while released waiters run; they go through a
//! [`ReleaseScheduler`]. The throttles own no timers. Callers bound their
//! own waits.

pub mod config;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod observer;
pub mod quota;
pub mod scheduler;
pub mod service;
pub mod warning;

pub use config::ThrottleConfig;
pub use error::{Result, ThrottleError};
pub use flow::{FlowThrottle, ReleaseFn};
pub use metrics::{ThrottleMetrics, ThrottleMetricsSnapshot};
pub use observer::ThrottleObserver;
pub use quota::QuotaThrottle;
pub use scheduler::{InlineScheduler, ReleaseScheduler, ReleaseWork, TokioScheduler};
pub use service::{resume_waiter, ServiceThrottle, Waiter};
pub use warning::{LimitWarning, WarningState};
