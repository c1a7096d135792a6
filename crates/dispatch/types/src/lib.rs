//! Dispatch Envelope Model.
//!
//! The in-memory envelope that the dispatch core routes, queries and admits.
//! Transport, encoding and channel lifecycle live outside this crate; by the
//! time an envelope reaches the dispatch core it is already parsed.
//!
//! ## Contents
//!
//! - [`Envelope`]: destination URI, action header, message headers and body
//! - [`EnvelopeBuffer`]: a shared buffered copy that can realize fresh envelopes
//! - [`Element`]: the structured body / header content tree
//! - [`EndpointAddress`]: a listen address with reference headers
//! - [`FilterId`]: identity of a registered message filter

pub mod address;
pub mod content;
pub mod envelope;
pub mod error;
pub mod ids;

pub use address::{AddressHeader, EndpointAddress, HostNameComparisonMode};
pub use content::{Attribute, Content, Element};
pub use envelope::{
    BodyState, Envelope, EnvelopeBuffer, EnvelopeVersion, MessageHeader, ADDRESSING_NAMESPACE,
};
pub use error::{EnvelopeError, Result};
pub use ids::{FilterId, QueryId};
