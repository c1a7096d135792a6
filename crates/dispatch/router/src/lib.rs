//! Dispatch Endpoint Router.
//!
//! [`EndpointTable`] maps envelopes to the registered [`RoutingTarget`] whose
//! filter matches at the highest priority. Small tables are scanned linearly
//! from a lock-free snapshot; larger ones are served by a priority-indexed
//! filter table.
//!
//! Ties at the top priority are never broken arbitrarily: the lookup fails
//! and names every tied filter.

pub mod config;
pub mod error;
pub mod table;
pub mod target;

pub use config::RoutingConfig;
pub use error::{Result, RouterError};
pub use table::{EndpointTable, LookupResult};
pub use target::{DispatchOwner, RoutingTarget};
