//! MAPLE Message Dispatch.
//!
//! The dispatch core of a service host: envelopes are routed through an
//! [`EndpointTable`](maple_dispatch_router::EndpointTable) of filter-selected
//! endpoints, admitted through the message quota and the call throttle, and
//! handed to the endpoint's [`EndpointHandler`].
//!
//! ```text
//! envelope ─▶ lookup ─▶ message quota ─▶ call throttle ─▶ handler
//!               │
//!               └─▶ NoEndpoint { address_matched }
//! ```
//!
//! The building blocks live in their own crates and are re-exported here:
//! [`types`], [`query`], [`filter`], [`router`] and [`throttle`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod telemetry;

pub use maple_dispatch_filter as filter;
pub use maple_dispatch_query as query;
pub use maple_dispatch_router as router;
pub use maple_dispatch_throttle as throttle;
pub use maple_dispatch_types as types;

pub use config::DispatchConfig;
pub use dispatcher::{DispatchOutcome, Endpoint, EndpointHandler, MessageDispatcher};
pub use error::{DispatchError, Result};
pub use metrics::{DispatchMetrics, DispatchMetricsSnapshot};
pub use telemetry::{init_tracing, TelemetryConfig};
