//! Query error taxonomy.
//!
//! Compile-time and run-time failures are kept apart: a
//! [`QueryCompileError`] means the expression or opcode chain is malformed
//! and can never run, while a [`QueryProcessingError`] is raised while
//! evaluating a well-formed chain against a particular envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of run-time evaluation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingErrorKind {
    /// An operand had the wrong value type for the operation.
    TypeMismatch,
    /// The expression selected a node kind the message document cannot hold.
    UnsupportedNodeKind,
    /// The evaluation visited more nodes than the configured quota.
    NodeCountExceeded,
    /// A navigator position marker does not belong to the document.
    InvalidNavigatorPosition,
    /// A node could not be reduced to an atomic result value.
    NotAtomized,
    /// The expression read the body of a non-seekable envelope.
    InvalidBodyAccess,
}

/// Run-time evaluation failure.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("query processing failed ({kind:?}): {message}")]
pub struct QueryProcessingError {
    pub kind: ProcessingErrorKind,
    pub message: String,
}

impl QueryProcessingError {
    pub fn new(kind: ProcessingErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ProcessingErrorKind::TypeMismatch, message)
    }

    pub fn is_body_access(&self) -> bool {
        self.kind == ProcessingErrorKind::InvalidBodyAccess
    }
}

/// Kind of compile-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompileErrorKind {
    /// The expression text was empty.
    EmptyExpression,
    /// A token appeared where the grammar does not allow it.
    UnexpectedToken,
    /// The expression ended early.
    UnexpectedEnd,
    /// The axis exists in XPath but is not evaluated by this engine.
    UnsupportedAxis,
    /// Unknown or unsupported function name.
    UnsupportedFunction,
    /// Function called with the wrong number of arguments.
    InvalidArgumentCount,
    /// String literal was not terminated.
    InvalidLiteral,
    /// Numeric literal could not be parsed.
    InvalidNumber,
    /// Unbalanced parentheses or brackets.
    MismatchedGrouping,
    /// Namespace prefix has no binding.
    UndefinedPrefix,
    /// Predicates nested deeper than the configured limit.
    ExcessivePredicateNesting,
    /// Parentheses, negations or calls nested deeper than the compiler allows.
    ExcessiveExpressionNesting,
    /// The same query was registered twice.
    DuplicateOpcode,
    /// An opcode chain has no result-producing opcode.
    MissingOpcode,
}

/// Compile-time failure.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("query compile failed ({kind:?}) at offset {position}: {message}")]
pub struct QueryCompileError {
    pub kind: CompileErrorKind,
    /// Byte offset into the expression text (0 for chain-level errors).
    pub position: usize,
    pub message: String,
}

impl QueryCompileError {
    pub fn new(kind: CompileErrorKind, position: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryProcessingError>;
