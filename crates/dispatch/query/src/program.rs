//! Compiled opcode chains.

use std::sync::Arc;

use maple_dispatch_types::{Envelope, FilterId, QueryId};

use crate::config::QueryConfig;
use crate::context::ProcessingContext;
use crate::document::MessageDocument;
use crate::error::{CompileErrorKind, QueryCompileError, Result};
use crate::expr::CompiledExpression;
use crate::interpreter;
use crate::navigator::MessageNavigator;
use crate::opcode::{OpcodeFlags, OpcodeId, OpcodeKind, OpcodeNode};
use crate::result::QueryResult;

/// An immutable opcode arena whose chain starts at the first node.
#[derive(Debug, Clone)]
pub struct QueryProgram {
    nodes: Vec<OpcodeNode>,
}

impl QueryProgram {
    /// Single-opcode chain that matches `expression`.
    pub fn matcher(expression: Arc<CompiledExpression>, filter: Option<FilterId>) -> Self {
        Self {
            nodes: vec![OpcodeNode {
                id: OpcodeId::new(0),
                kind: OpcodeKind::Match { expression, filter },
                next: None,
            }],
        }
    }

    /// Single-opcode chain that returns the native result of `expression`.
    pub fn query(expression: Arc<CompiledExpression>, query: QueryId) -> Self {
        Self {
            nodes: vec![OpcodeNode {
                id: OpcodeId::new(0),
                kind: OpcodeKind::Query { expression, query },
                next: None,
            }],
        }
    }

    pub fn root(&self) -> Option<OpcodeId> {
        self.nodes.first().map(|n| n.id)
    }

    pub fn node(&self, id: OpcodeId) -> Option<&OpcodeNode> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &OpcodeNode> {
        let mut cursor = self.root();
        std::iter::from_fn(move || {
            let node = self.node(cursor?)?;
            cursor = node.next;
            Some(node)
        })
    }

    /// Run the chain into `ctx` against a navigator positioned on the context node.
    pub fn run(&self, nav: &mut MessageNavigator<'_>, ctx: &mut ProcessingContext) -> Result<()> {
        interpreter::run(self, nav, ctx)
    }

    /// Build a document for `envelope` and report whether the chain matched.
    pub fn evaluate_match(&self, envelope: &Envelope, config: &QueryConfig) -> Result<bool> {
        let document = MessageDocument::from_envelope(envelope);
        let mut nav = MessageNavigator::new(&document, config.node_quota);
        let mut ctx = ProcessingContext::new();
        self.run(&mut nav, &mut ctx)?;
        Ok(ctx.matched())
    }

    /// Build a document for `envelope` and return the chain's query result.
    pub fn evaluate_query(
        &self,
        envelope: &Envelope,
        config: &QueryConfig,
    ) -> Result<Option<QueryResult>> {
        let document = MessageDocument::from_envelope(envelope);
        let mut nav = MessageNavigator::new(&document, config.node_quota);
        let mut ctx = ProcessingContext::new();
        self.run(&mut nav, &mut ctx)?;
        Ok(ctx.take_result())
    }
}

/// Appends opcodes into a chain. Each node links to the next one pushed, so
/// `next` indices only increase and the chain cannot cycle.
#[derive(Debug, Default)]
pub struct ChainBuilder {
    nodes: Vec<OpcodeNode>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: OpcodeKind) -> OpcodeId {
        let id = OpcodeId::new(self.nodes.len());
        if let Some(last) = self.nodes.last_mut() {
            last.next = Some(id);
        }
        self.nodes.push(OpcodeNode {
            id,
            kind,
            next: None,
        });
        id
    }

    pub fn with(mut self, kind: OpcodeKind) -> Self {
        self.push(kind);
        self
    }

    pub fn build(self) -> std::result::Result<QueryProgram, QueryCompileError> {
        if !self
            .nodes
            .iter()
            .any(|n| n.flags().contains(OpcodeFlags::RESULT))
        {
            return Err(QueryCompileError::new(
                CompileErrorKind::MissingOpcode,
                0,
                format!(
                    "chain of {} opcodes has no match or query opcode",
                    self.nodes.len()
                ),
            ));
        }
        Ok(QueryProgram { nodes: self.nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ArithmeticOp;

    #[test]
    fn chain_links_in_push_order() {
        let program = ChainBuilder::new()
            .with(OpcodeKind::PushNumber(1.0))
            .with(OpcodeKind::PushNumber(2.0))
            .with(OpcodeKind::Arithmetic(ArithmeticOp::Plus))
            .with(OpcodeKind::StackMatch { filter: None })
            .build()
            .unwrap();
        let order: Vec<usize> = program.iter().map(|n| n.id.index()).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert!(program.node(OpcodeId::new(3)).unwrap().next.is_none());
    }

    #[test]
    fn chain_without_result_is_rejected() {
        let err = ChainBuilder::new()
            .with(OpcodeKind::PushNumber(1.0))
            .build()
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::MissingOpcode);
        assert_eq!(
            ChainBuilder::new().build().unwrap_err().kind,
            CompileErrorKind::MissingOpcode
        );
    }
}
