//! Action-equality filters.

use std::collections::{BTreeSet, HashMap};

use maple_dispatch_types::{Envelope, FilterId};

use crate::error::{FilterError, Result};
use crate::filter::{FilterKind, MessageFilter};
use crate::index::{FilterIndex, MatchSink};

/// Matches envelopes whose action is one of a fixed set. An envelope
/// without an action header is tested as the empty action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFilter {
    actions: BTreeSet<String>,
}

impl ActionFilter {
    /// Build from a non-empty list; duplicates collapse.
    pub fn new<I, S>(actions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let actions: BTreeSet<String> = actions.into_iter().map(Into::into).collect();
        if actions.is_empty() {
            return Err(FilterError::InvalidArgument(
                "action filter needs at least one action".to_string(),
            ));
        }
        Ok(Self { actions })
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn contains(&self, action: &str) -> bool {
        self.actions.contains(action)
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.contains(envelope.action().unwrap_or(""))
    }
}

/// Action → filters hash index.
#[derive(Debug, Default)]
pub(crate) struct ActionIndex {
    by_action: HashMap<String, Vec<FilterId>>,
    count: usize,
}

impl FilterIndex for ActionIndex {
    fn insert(&mut self, filter: &MessageFilter) {
        let FilterKind::Action(action) = filter.kind() else {
            return;
        };
        for a in action.actions() {
            self.by_action
                .entry(a.to_string())
                .or_default()
                .push(filter.id());
        }
        self.count += 1;
    }

    fn remove(&mut self, filter: &MessageFilter) -> bool {
        let FilterKind::Action(action) = filter.kind() else {
            return false;
        };
        let mut removed = false;
        for a in action.actions() {
            if let Some(ids) = self.by_action.get_mut(a) {
                let before = ids.len();
                ids.retain(|id| *id != filter.id());
                removed |= ids.len() != before;
                if ids.is_empty() {
                    self.by_action.remove(a);
                }
            }
        }
        if removed {
            self.count -= 1;
        }
        removed
    }

    fn len(&self) -> usize {
        self.count
    }

    fn collect_matches(&self, envelope: &Envelope, sink: &mut MatchSink) -> Result<()> {
        if let Some(ids) = self.by_action.get(envelope.action().unwrap_or("")) {
            sink.matched.extend(ids.iter().copied());
        }
        Ok(())
    }
}
