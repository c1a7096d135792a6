//! Per-kind filter indexes.
//!
//! A [`FilterTable`](crate::table::FilterTable) keeps one index per
//! [`IndexKind`] at each priority level. An index only answers "which of my
//! filters match this envelope"; values and priorities live in the table.

use std::fmt::Debug;

use maple_dispatch_query::QueryConfig;
use maple_dispatch_types::{Envelope, FilterId};

use crate::action::ActionIndex;
use crate::and::AndIndex;
use crate::error::{FilterError, Result};
use crate::filter::{FilterKind, IndexKind, MessageFilter};
use crate::prefix::PrefixIndex;
use crate::query::QueryIndex;

/// Accumulates the outcome of matching one or more indexes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSink {
    pub matched: Vec<FilterId>,
    /// An AND filter's first operand matched, whether or not the whole filter did.
    pub address_matched: bool,
    pub body_access_denied: Vec<FilterId>,
}

pub trait FilterIndex: Send + Sync + Debug {
    fn insert(&mut self, filter: &MessageFilter);

    fn remove(&mut self, filter: &MessageFilter) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collect_matches(&self, envelope: &Envelope, sink: &mut MatchSink) -> Result<()>;
}

impl IndexKind {
    /// Create the index that stores filters of this kind.
    pub fn create(&self, query_config: &QueryConfig) -> Box<dyn FilterIndex> {
        match self {
            IndexKind::Constant => Box::<ConstantIndex>::default(),
            IndexKind::Action => Box::<ActionIndex>::default(),
            IndexKind::And => Box::<AndIndex>::default(),
            IndexKind::Prefix => Box::<PrefixIndex>::default(),
            IndexKind::Query => Box::new(QueryIndex::new(*query_config)),
            IndexKind::Generic => Box::<GenericIndex>::default(),
        }
    }
}

/// Match-all and match-none filters.
#[derive(Debug, Default)]
pub(crate) struct ConstantIndex {
    match_all: Vec<FilterId>,
    match_none: Vec<FilterId>,
}

impl FilterIndex for ConstantIndex {
    fn insert(&mut self, filter: &MessageFilter) {
        match filter.kind() {
            FilterKind::MatchAll => self.match_all.push(filter.id()),
            FilterKind::MatchNone => self.match_none.push(filter.id()),
            _ => {}
        }
    }

    fn remove(&mut self, filter: &MessageFilter) -> bool {
        let id = filter.id();
        let before = self.len();
        self.match_all.retain(|f| *f != id);
        self.match_none.retain(|f| *f != id);
        self.len() != before
    }

    fn len(&self) -> usize {
        self.match_all.len() + self.match_none.len()
    }

    fn collect_matches(&self, _envelope: &Envelope, sink: &mut MatchSink) -> Result<()> {
        sink.matched.extend(self.match_all.iter().copied());
        Ok(())
    }
}

/// Linear scan over filters with no specialized index.
#[derive(Debug, Default)]
pub(crate) struct GenericIndex {
    filters: Vec<MessageFilter>,
}

impl FilterIndex for GenericIndex {
    fn insert(&mut self, filter: &MessageFilter) {
        self.filters.push(filter.clone());
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
            match filter.matches(envelope) {
                Ok(true) => sink.matched.push(filter.id()),
                Ok(false) => {}
                Err(FilterError::BodyAccessDenied { filters }) => {
                    sink.body_access_denied.extend(filters)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
