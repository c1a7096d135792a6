//! A set of registered programs evaluated together against one envelope.
//!
//! The message document is built once per call and shared by every program;
//! each program gets a fresh navigator so the node quota applies per chain.

use std::collections::BTreeMap;

use maple_dispatch_types::{Envelope, FilterId, QueryId};
use tracing::debug;

use crate::config::QueryConfig;
use crate::context::ProcessingContext;
use crate::document::MessageDocument;
use crate::error::{CompileErrorKind, QueryCompileError, Result};
use crate::navigator::MessageNavigator;
use crate::program::QueryProgram;
use crate::result::QueryResult;

/// Outcome of matching every registered program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMatch {
    /// Queries whose chain matched, in id order.
    pub queries: Vec<QueryId>,
    /// Filters recorded by matching chains.
    pub filters: Vec<FilterId>,
    /// Queries that needed the body of a non-seekable envelope.
    pub body_access_denied: Vec<QueryId>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    programs: BTreeMap<QueryId, QueryProgram>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            programs: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn insert(
        &mut self,
        query: QueryId,
        program: QueryProgram,
    ) -> std::result::Result<(), QueryCompileError> {
        if self.programs.contains_key(&query) {
            return Err(QueryCompileError::new(
                CompileErrorKind::DuplicateOpcode,
                0,
                format!("{} is already registered", query),
            ));
        }
        self.programs.insert(query, program);
        Ok(())
    }

    pub fn remove(&mut self, query: QueryId) -> Option<QueryProgram> {
        self.programs.remove(&query)
    }

    pub fn contains(&self, query: QueryId) -> bool {
        self.programs.contains_key(&query)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Run every program as a matcher. Body-access failures are collected
    /// rather than raised; any other failure aborts the call.
    pub fn match_envelope(&self, envelope: &Envelope) -> Result<EngineMatch> {
        let document = MessageDocument::from_envelope(envelope);
        let mut ctx = ProcessingContext::with_match_set();
        let mut outcome = EngineMatch::default();

        for (query, program) in &self.programs {
            ctx.reset();
            let mut nav = MessageNavigator::new(&document, self.config.node_quota);
            match program.run(&mut nav, &mut ctx) {
                Ok(()) if ctx.matched() => outcome.queries.push(*query),
                Ok(()) => {}
                Err(e) if e.is_body_access() => {
                    debug!(%query, envelope = %envelope.id, "query needs a seekable body");
                    outcome.body_access_denied.push(*query);
                }
                Err(e) => return Err(e),
            }
        }
        outcome.filters = ctx.take_match_set().unwrap_or_default();
        Ok(outcome)
    }

    /// Run every program and collect the native query results.
    pub fn evaluate(&self, envelope: &Envelope) -> Result<Vec<(QueryId, QueryResult)>> {
        let document = MessageDocument::from_envelope(envelope);
        let mut ctx = ProcessingContext::with_result_set();
        for program in self.programs.values() {
            ctx.reset();
            let mut nav = MessageNavigator::new(&document, self.config.node_quota);
            program.run(&mut nav, &mut ctx)?;
        }
        Ok(ctx.take_result_set().unwrap_or_default())
    }
}
