//! Logical AND of two filters.

use maple_dispatch_types::Envelope;

use crate::error::{FilterError, Result};
use crate::filter::{FilterKind, MessageFilter};
use crate::index::{FilterIndex, MatchSink};

/// Result of an address-aware match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AndMatch {
    pub matched: bool,
    /// The first operand matched.
    pub address_matched: bool,
}

/// `first AND second`, short-circuiting on `first`.
///
/// The router registers endpoints as `address AND contract`, so the first
/// operand alone tells "wrong operation at this address" apart from "no
/// endpoint at this address".
#[derive(Debug, Clone)]
pub struct AndFilter {
    first: Box<MessageFilter>,
    second: Box<MessageFilter>,
}

impl AndFilter {
    pub fn new(first: MessageFilter, second: MessageFilter) -> Self {
        Self {
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    pub fn first(&self) -> &MessageFilter {
        &self.first
    }

    pub fn second(&self) -> &MessageFilter {
        &self.second
    }

    pub fn matches_with_address(&self, envelope: &Envelope) -> Result<AndMatch> {
        if !self.first.matches(envelope)? {
            return Ok(AndMatch::default());
        }
        Ok(AndMatch {
            matched: self.second.matches(envelope)?,
            address_matched: true,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct AndIndex {
    filters: Vec<MessageFilter>,
}

impl FilterIndex for AndIndex {
    fn insert(&mut self, filter: &MessageFilter) {
        if matches!(filter.kind(), FilterKind::And(_)) {
            self.filters.push(filter.clone());
        }
    }

    fn remove(&mut self, filter: &MessageFilter) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| f.id() != filter.id());
        self.filters.len() != before
    }

    fn len(&self) -> usize {
        self.filters.len()
    }

    fn collect_matches(&self, envelope: &Envelope, sink: &mut MatchSink) -> Result<()> {
        for filter in &self.filters {
            match filter.matches_with_address(envelope) {
                Ok(outcome) => {
                    sink.address_matched |= outcome.address_matched;
                    if outcome.matched {
                        sink.matched.push(filter.id());
                    }
                }
                Err(FilterError::BodyAccessDenied { filters }) => {
                    sink.body_access_denied.extend(filters)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
