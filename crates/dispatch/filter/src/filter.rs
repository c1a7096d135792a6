//! The message filter sum type.

use std::fmt;
use std::sync::Arc;

use maple_dispatch_types::{Envelope, EnvelopeBuffer, EndpointAddress, FilterId, HostNameComparisonMode};

use crate::action::ActionFilter;
use crate::and::{AndFilter, AndMatch};
use crate::custom::{CustomFilter, EnvelopePredicate};
use crate::error::Result;
use crate::prefix::PrefixAddressFilter;
use crate::query::QueryFilter;

/// The closed set of filter kinds.
#[derive(Debug, Clone)]
pub enum FilterKind {
    MatchAll,
    MatchNone,
    Action(ActionFilter),
    And(AndFilter),
    Prefix(PrefixAddressFilter),
    Query(QueryFilter),
    Custom(CustomFilter),
}

/// Which filter index stores a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKind {
    Constant,
    Action,
    And,
    Prefix,
    Query,
    Generic,
}

impl FilterKind {
    pub fn index_kind(&self) -> IndexKind {
        match self {
            FilterKind::MatchAll | FilterKind::MatchNone => IndexKind::Constant,
            FilterKind::Action(_) => IndexKind::Action,
            FilterKind::And(_) => IndexKind::And,
            FilterKind::Prefix(_) => IndexKind::Prefix,
            FilterKind::Query(_) => IndexKind::Query,
            FilterKind::Custom(_) => IndexKind::Generic,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::MatchAll => "match_all",
            FilterKind::MatchNone => "match_none",
            FilterKind::Action(_) => "action",
            FilterKind::And(_) => "and",
            FilterKind::Prefix(_) => "prefix",
            FilterKind::Query(_) => "query",
            FilterKind::Custom(_) => "custom",
        }
    }
}

/// An immutable predicate over envelopes with a stable identity.
///
/// Clones share the identity; two separately constructed filters never do,
/// even when structurally equal.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    id: FilterId,
    kind: FilterKind,
}

impl PartialEq for MessageFilter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageFilter {}

impl MessageFilter {
    pub fn new(kind: FilterKind) -> Self {
        Self {
            id: FilterId::generate(),
            kind,
        }
    }

    pub fn match_all() -> Self {
        Self::new(FilterKind::MatchAll)
    }

    pub fn match_none() -> Self {
        Self::new(FilterKind::MatchNone)
    }

    /// Action-equality filter. Fails on an empty list.
    pub fn action<I, S>(actions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(FilterKind::Action(ActionFilter::new(actions)?)))
    }

    pub fn and(first: MessageFilter, second: MessageFilter) -> Self {
        Self::new(FilterKind::And(AndFilter::new(first, second)))
    }

    pub fn prefix(address: EndpointAddress, mode: HostNameComparisonMode) -> Self {
        Self::new(FilterKind::Prefix(PrefixAddressFilter::new(address, mode)))
    }

    pub fn query(query: QueryFilter) -> Self {
        Self::new(FilterKind::Query(query))
    }

    pub fn custom(name: impl Into<String>, predicate: impl EnvelopePredicate + 'static) -> Self {
        Self::new(FilterKind::Custom(CustomFilter::new(name, Arc::new(predicate))))
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    pub fn index_kind(&self) -> IndexKind {
        self.kind.index_kind()
    }

    /// Test the envelope.
    pub fn matches(&self, envelope: &Envelope) -> Result<bool> {
        match &self.kind {
            FilterKind::MatchAll => Ok(true),
            FilterKind::MatchNone => Ok(false),
            FilterKind::Action(action) => Ok(action.matches(envelope)),
            FilterKind::And(and) => Ok(and.matches_with_address(envelope)?.matched),
            FilterKind::Prefix(prefix) => Ok(prefix.matches(envelope)),
            FilterKind::Query(query) => query.matches(self.id, envelope),
            FilterKind::Custom(custom) => custom.matches(envelope),
        }
    }

    /// Realize an envelope from the buffer and test it. Realization errors
    /// propagate; the realized envelope is dropped before returning.
    pub fn matches_buffer(&self, buffer: &EnvelopeBuffer) -> Result<bool> {
        let envelope = buffer.create_envelope()?;
        self.matches(&envelope)
    }

    /// Test the envelope, also reporting whether the address-level part of
    /// an AND filter matched. Non-AND filters report `address_matched` equal
    /// to `matched`.
    pub fn matches_with_address(&self, envelope: &Envelope) -> Result<AndMatch> {
        match &self.kind {
            FilterKind::And(and) => and.matches_with_address(envelope),
            _ => {
                let matched = self.matches(envelope)?;
                Ok(AndMatch {
                    matched,
                    address_matched: matched,
                })
            }
        }
    }
}

impl fmt::Display for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.name(), self.id)
    }
}
