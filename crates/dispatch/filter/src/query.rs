//! Compiled-query filters.

use std::collections::HashMap;
use std::sync::Arc;

use maple_dispatch_query::{
    compile, CompiledExpression, NamespaceMap, QueryConfig, QueryEngine, QueryProgram,
};
use maple_dispatch_types::{Envelope, FilterId, QueryId};
use tracing::warn;

use crate::error::{FilterError, Result};
use crate::filter::{FilterKind, MessageFilter};
use crate::index::{FilterIndex, MatchSink};

/// Matches envelopes for which a structural expression is truthy.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    expression: Arc<CompiledExpression>,
    config: QueryConfig,
}

impl QueryFilter {
    pub fn compile(source: &str, namespaces: &NamespaceMap, config: &QueryConfig) -> Result<Self> {
        let expression = compile(source, namespaces, config.max_predicate_depth)?;
        Ok(Self::from_expression(Arc::new(expression), *config))
    }

    pub fn from_expression(expression: Arc<CompiledExpression>, config: QueryConfig) -> Self {
        Self { expression, config }
    }

    pub fn expression(&self) -> &Arc<CompiledExpression> {
        &self.expression
    }

    pub fn source(&self) -> &str {
        self.expression.source()
    }

    /// Evaluate for the filter identified by `id`. A body-access failure is
    /// reported against that filter.
    pub fn matches(&self, id: FilterId, envelope: &Envelope) -> Result<bool> {
        QueryProgram::matcher(self.expression.clone(), Some(id))
            .evaluate_match(envelope, &self.config)
            .map_err(|e| {
                if e.is_body_access() {
                    FilterError::BodyAccessDenied { filters: vec![id] }
                } else {
                    FilterError::Query(e)
                }
            })
    }
}

/// Query filters evaluated together over one shared message document.
#[derive(Debug)]
pub(crate) struct QueryIndex {
    engine: QueryEngine,
    by_filter: HashMap<FilterId, QueryId>,
    by_query: HashMap<QueryId, FilterId>,
    next_query: u64,
}

impl QueryIndex {
    pub(crate) fn new(config: QueryConfig) -> Self {
        Self {
            engine: QueryEngine::new(config),
            by_filter: HashMap::new(),
            by_query: HashMap::new(),
            next_query: 0,
        }
    }
}

impl FilterIndex for QueryIndex {
    fn insert(&mut self, filter: &MessageFilter) {
        let FilterKind::Query(query) = filter.kind() else {
            return;
        };
        if self.by_filter.contains_key(&filter.id()) {
            return;
        }
        let query_id = QueryId::new(self.next_query);
        self.next_query += 1;
        let program = QueryProgram::matcher(query.expression().clone(), Some(filter.id()));
        if let Err(e) = self.engine.insert(query_id, program) {
            // ids are never reused, so this cannot collide
            warn!(filter = %filter.id(), error = %e, "query registration rejected");
            return;
        }
        self.by_filter.insert(filter.id(), query_id);
        self.by_query.insert(query_id, filter.id());
    }

    fn remove(&mut self, filter: &MessageFilter) -> bool {
        let Some(query_id) = self.by_filter.remove(&filter.id()) else {
            return false;
        };
        self.by_query.remove(&query_id);
        self.engine.remove(query_id).is_some()
    }

    fn len(&self) -> usize {
        self.engine.len()
    }

    fn collect_matches(&self, envelope: &Envelope, sink: &mut MatchSink) -> Result<()> {
        if self.engine.is_empty() {
            return Ok(());
        }
        let outcome = self.engine.match_envelope(envelope)?;
        sink.matched.extend(outcome.filters);
        sink.body_access_denied.extend(
            outcome
                .body_access_denied
                .iter()
                .filter_map(|q| self.by_query.get(q).copied()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_dispatch_query::CompileErrorKind;
    use maple_dispatch_types::{Element, EnvelopeVersion};

    fn query(source: &str) -> MessageFilter {
        let ns = NamespaceMap::default().with_prefix("o", "urn:orders");
        MessageFilter::query(QueryFilter::compile(source, &ns, &QueryConfig::default()).unwrap())
    }

    fn order(total: &str) -> Envelope {
        Envelope::new(EnvelopeVersion::Soap12).with_body(
            Element::new("Order")
                .in_namespace("urn:orders")
                .with_child(Element::new("Total").in_namespace("urn:orders").with_text(total)),
        )
    }

    #[test]
    fn test_query_filter_matches() {
        let big = query("//o:Total > 100");
        assert!(big.matches(&order("250")).unwrap());
        assert!(!big.matches(&order("25")).unwrap());
    }

    #[test]
    fn test_compile_errors_surface() {
        let err = QueryFilter::compile("ancestor::x", &NamespaceMap::default(), &QueryConfig::default())
            .unwrap_err();
        let FilterError::Compile(e) = err else {
            panic!("expected a compile error");
        };
        assert_eq!(e.kind, CompileErrorKind::UnsupportedAxis);
    }

    #[test]
    fn test_body_access_reports_filter() {
        let f = query("//o:Total");
        let env = Envelope::new(EnvelopeVersion::None).with_streamed_body(Element::new("Order"));
        assert_eq!(
            f.matches(&env),
            Err(FilterError::BodyAccessDenied {
                filters: vec![f.id()]
            })
        );
    }

    #[test]
    fn test_index_shares_document() {
        let big = query("//o:Total > 100");
        let any = query("boolean(//o:Order)");
        let header_only = query("/s12:Envelope/s12:Header");
        let mut index = QueryIndex::new(QueryConfig::default());
        index.insert(&big);
        index.insert(&any);
        index.insert(&header_only);
        assert_eq!(index.len(), 3);

        let mut sink = MatchSink::default();
        index.collect_matches(&order("20"), &mut sink).unwrap();
        sink.matched.sort();
        let mut expected = vec![any.id(), header_only.id()];
        expected.sort();
        assert_eq!(sink.matched, expected);

        let streamed = Envelope::new(EnvelopeVersion::Soap12)
            .with_streamed_body(Element::new("Order").in_namespace("urn:orders"));
        let mut sink = MatchSink::default();
        index.collect_matches(&streamed, &mut sink).unwrap();
        assert_eq!(sink.matched, vec![header_only.id()]);
        sink.body_access_denied.sort();
        let mut denied = vec![big.id(), any.id()];
        denied.sort();
        assert_eq!(sink.body_access_denied, denied);

        assert!(index.remove(&big));
        assert_eq!(index.len(), 2);
    }
}
