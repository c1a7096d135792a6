//! Opcode definitions.
//!
//! Opcodes live in a [`QueryProgram`](crate::program::QueryProgram) arena and
//! link to their successor by index. A `next` of `None` terminates the chain.

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use maple_dispatch_types::{FilterId, QueryId};

use crate::expr::CompiledExpression;
use crate::frame::ArithmeticOp;

/// Index of an opcode within its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpcodeId(u32);

impl OpcodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpcodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Opcode classification bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpcodeFlags(u8);

impl OpcodeFlags {
    pub const NONE: OpcodeFlags = OpcodeFlags(0);
    /// Produces a match flag or query result.
    pub const RESULT: OpcodeFlags = OpcodeFlags(1);
    /// Pushes constant values.
    pub const LITERAL: OpcodeFlags = OpcodeFlags(1 << 1);
    /// Combines numeric stack frames.
    pub const ARITHMETIC: OpcodeFlags = OpcodeFlags(1 << 2);
    /// Evaluates an expression against the document.
    pub const EVALUATE: OpcodeFlags = OpcodeFlags(1 << 3);

    pub fn contains(&self, other: OpcodeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpcodeFlags {
    type Output = OpcodeFlags;

    fn bitor(self, rhs: Self) -> Self {
        OpcodeFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
pub enum OpcodeKind {
    /// Push a one-slot numeric frame.
    PushNumber(f64),
    /// Push a numeric frame.
    PushFrame(Vec<f64>),
    /// Evaluate an expression, coerce it to a number and push it as a one-slot frame.
    PushExpression(Arc<CompiledExpression>),
    Arithmetic(ArithmeticOp),
    Negate,
    /// Evaluate an expression and coerce the native result to a boolean.
    Match {
        expression: Arc<CompiledExpression>,
        filter: Option<FilterId>,
    },
    /// Evaluate an expression and keep the native result.
    Query {
        expression: Arc<CompiledExpression>,
        query: QueryId,
    },
    /// Pop the top frame; true if any slot is truthy.
    StackMatch { filter: Option<FilterId> },
}

impl OpcodeKind {
    pub fn flags(&self) -> OpcodeFlags {
        match self {
            OpcodeKind::PushNumber(_) | OpcodeKind::PushFrame(_) => OpcodeFlags::LITERAL,
            OpcodeKind::PushExpression(_) => OpcodeFlags::EVALUATE,
            OpcodeKind::Arithmetic(_) | OpcodeKind::Negate => OpcodeFlags::ARITHMETIC,
            OpcodeKind::Match { .. } | OpcodeKind::Query { .. } => {
                OpcodeFlags::RESULT | OpcodeFlags::EVALUATE
            }
            OpcodeKind::StackMatch { .. } => OpcodeFlags::RESULT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpcodeKind::PushNumber(_) => "push_number",
            OpcodeKind::PushFrame(_) => "push_frame",
            OpcodeKind::PushExpression(_) => "push_expression",
            OpcodeKind::Arithmetic(ArithmeticOp::Plus) => "plus",
            OpcodeKind::Arithmetic(ArithmeticOp::Minus) => "minus",
            OpcodeKind::Arithmetic(ArithmeticOp::Multiply) => "multiply",
            OpcodeKind::Arithmetic(ArithmeticOp::Divide) => "divide",
            OpcodeKind::Arithmetic(ArithmeticOp::Modulus) => "modulus",
            OpcodeKind::Negate => "negate",
            OpcodeKind::Match { .. } => "match",
            OpcodeKind::Query { .. } => "query",
            OpcodeKind::StackMatch { .. } => "stack_match",
        }
    }
}

/// One step of an opcode chain.
#[derive(Debug, Clone)]
pub struct OpcodeNode {
    pub id: OpcodeId,
    pub kind: OpcodeKind,
    pub next: Option<OpcodeId>,
}

impl OpcodeNode {
    pub fn flags(&self) -> OpcodeFlags {
        self.kind.flags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_compose() {
        let flags = OpcodeFlags::RESULT | OpcodeFlags::EVALUATE;
        assert!(flags.contains(OpcodeFlags::RESULT));
        assert!(flags.contains(OpcodeFlags::EVALUATE));
        assert!(!flags.contains(OpcodeFlags::LITERAL));
        assert!(OpcodeKind::StackMatch { filter: None }
            .flags()
            .contains(OpcodeFlags::RESULT));
        assert!(!OpcodeKind::Negate.flags().contains(OpcodeFlags::RESULT));
    }

    #[test]
    fn opcode_names() {
        assert_eq!(OpcodeKind::Arithmetic(ArithmeticOp::Modulus).name(), "modulus");
        assert_eq!(OpcodeId::new(3).to_string(), "op#3");
    }
}
