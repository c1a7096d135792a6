//! Per-evaluation processing context.

use maple_dispatch_types::{FilterId, QueryId};

use crate::frame::ValueStack;
use crate::result::QueryResult;

/// Transient state for one interpreter run. Never shared between threads.
#[derive(Debug, Default)]
pub struct ProcessingContext {
    stack: ValueStack,
    matched: bool,
    match_set: Option<Vec<FilterId>>,
    result_set: Option<Vec<(QueryId, QueryResult)>>,
    result: Option<QueryResult>,
}

impl ProcessingContext {
    /// Context with single-result slots only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that accumulates the filters of every matching chain.
    pub fn with_match_set() -> Self {
        Self {
            match_set: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Context that accumulates every query result.
    pub fn with_result_set() -> Self {
        Self {
            result_set: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn stack(&mut self) -> &mut ValueStack {
        &mut self.stack
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    pub fn match_set(&self) -> Option<&[FilterId]> {
        self.match_set.as_deref()
    }

    pub fn result(&self) -> Option<&QueryResult> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<QueryResult> {
        self.result.take()
    }

    pub fn result_set(&self) -> Option<&[(QueryId, QueryResult)]> {
        self.result_set.as_deref()
    }

    pub fn take_result_set(&mut self) -> Option<Vec<(QueryId, QueryResult)>> {
        self.result_set.take()
    }

    pub fn take_match_set(&mut self) -> Option<Vec<FilterId>> {
        self.match_set.take()
    }

    /// Clear per-chain state before running the next chain; accumulators are kept.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.matched = false;
        self.result = None;
    }

    pub(crate) fn record_match(&mut self, matched: bool, filter: Option<FilterId>) {
        self.matched = matched;
        if !matched {
            return;
        }
        if let (Some(set), Some(filter)) = (self.match_set.as_mut(), filter) {
            set.push(filter);
        }
    }

    pub(crate) fn record_result(&mut self, query: QueryId, result: QueryResult) {
        match self.result_set.as_mut() {
            Some(set) => set.push((query, result)),
            None => self.result = Some(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_set_only_collects_owned_matches() {
        let mut ctx = ProcessingContext::with_match_set();
        let a = FilterId::generate();
        ctx.record_match(true, Some(a));
        ctx.record_match(false, Some(FilterId::generate()));
        ctx.record_match(true, None);
        assert_eq!(ctx.match_set().unwrap(), &[a]);
    }

    #[test]
    fn results_go_to_set_or_slot() {
        let mut single = ProcessingContext::new();
        single.record_result(QueryId::new(1), QueryResult::Boolean(true));
        assert_eq!(single.result(), Some(&QueryResult::Boolean(true)));

        let mut many = ProcessingContext::with_result_set();
        many.record_result(QueryId::new(1), QueryResult::Number(1.0));
        many.record_result(QueryId::new(2), QueryResult::Number(2.0));
        assert!(many.result().is_none());
        assert_eq!(many.result_set().unwrap().len(), 2);
    }

    #[test]
    fn reset_keeps_accumulators() {
        let mut ctx = ProcessingContext::with_match_set();
        let a = FilterId::generate();
        ctx.record_match(true, Some(a));
        ctx.reset();
        assert!(!ctx.matched());
        assert_eq!(ctx.take_match_set().unwrap(), vec![a]);
    }
}
