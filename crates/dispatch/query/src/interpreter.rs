//! Opcode interpreter.
//!
//! Walks a chain from its root, executing each node and following `next`
//! until the terminator. Runs to completion on the calling thread.

use tracing::trace;

use crate::context::ProcessingContext;
use crate::error::Result;
use crate::eval::describe;
use crate::navigator::MessageNavigator;
use crate::opcode::OpcodeKind;
use crate::program::QueryProgram;
use crate::result::QueryResult;
use crate::value::Value;

pub(crate) fn run(
    program: &QueryProgram,
    nav: &mut MessageNavigator<'_>,
    ctx: &mut ProcessingContext,
) -> Result<()> {
    let context_node = nav.position();
    let mut cursor = program.root();
    while let Some(id) = cursor {
        let Some(node) = program.node(id) else {
            panic!("opcode chain links to {} outside a program of {}", id, program.len());
        };
        match &node.kind {
            OpcodeKind::PushNumber(n) => ctx.stack().push_value(Value::Number(*n)),
            OpcodeKind::PushFrame(values) => {
                ctx.stack().push_frame(values.iter().map(|n| Value::Number(*n)))
            }
            OpcodeKind::PushExpression(expression) => {
                let value = expression.evaluate(nav)?;
                nav.set_position(context_node)?;
                let n = value.to_number(nav)?;
                ctx.stack().push_value(Value::Number(n));
            }
            OpcodeKind::Arithmetic(op) => ctx.stack().apply_binary(*op),
            OpcodeKind::Negate => ctx.stack().negate_top(),
            OpcodeKind::Match { expression, filter } => {
                let value = expression.evaluate(nav)?;
                nav.set_position(context_node)?;
                trace!(opcode = %id, expression = expression.source(), value = %describe(&value), "match");
                ctx.record_match(value.truthy(), *filter);
            }
            OpcodeKind::Query { expression, query } => {
                let value = expression.evaluate(nav)?;
                let result = QueryResult::from_value(value, nav)?;
                nav.set_position(context_node)?;
                trace!(opcode = %id, %query, kind = ?result.kind(), "query");
                ctx.record_result(*query, result);
            }
            OpcodeKind::StackMatch { filter } => {
                let matched = ctx
                    .stack()
                    .pop_frame()
                    .map(|frame| frame.iter().any(|v| v.truthy()))
                    .unwrap_or(false);
                ctx.record_match(matched, *filter);
            }
        }
        cursor = node.next;
    }
    Ok(())
}
