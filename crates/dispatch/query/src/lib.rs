//! Dispatch Query VM.
//!
//! Structural predicates over envelopes, compiled to opcode chains and run by
//! a single-threaded interpreter.
//!
//! ## Pipeline
//!
//! 1. [`compile`] turns expression text into a [`CompiledExpression`]
//!    (namespace prefixes resolved through a [`NamespaceMap`]).
//! 2. A [`ChainBuilder`] links opcodes into a [`QueryProgram`]; the common
//!    single-opcode chains are [`QueryProgram::matcher`] and [`QueryProgram::query`].
//! 3. Each run builds a [`MessageDocument`] for the envelope, walks it with a
//!    [`MessageNavigator`] and accumulates results in a [`ProcessingContext`].
//!
//! Match opcodes coerce the native value with XPath 1.0 truthiness: a
//! node-set is true iff non-empty, a number iff non-zero (and not NaN), a
//! string iff non-empty. Query opcodes keep the native value as a
//! [`QueryResult`].
//!
//! Evaluation errors are [`QueryProcessingError`]s; malformed expressions and
//! chains are [`QueryCompileError`]s.

pub mod config;
pub mod context;
pub mod document;
pub mod engine;
pub mod error;
pub mod eval;
pub mod expr;
pub mod frame;
mod interpreter;
pub mod navigator;
pub mod opcode;
pub mod parser;
pub mod program;
pub mod result;
pub mod value;

pub use config::QueryConfig;
pub use context::ProcessingContext;
pub use document::{MessageDocument, NodeId, NodeKind};
pub use engine::{EngineMatch, QueryEngine};
pub use error::{
    CompileErrorKind, ProcessingErrorKind, QueryCompileError, QueryProcessingError, Result,
};
pub use expr::CompiledExpression;
pub use frame::{ArithmeticOp, ValueStack};
pub use navigator::MessageNavigator;
pub use opcode::{OpcodeFlags, OpcodeId, OpcodeKind, OpcodeNode};
pub use parser::{compile, NamespaceMap};
pub use program::{ChainBuilder, QueryProgram};
pub use result::{QueryResult, ResultNode};
pub use value::{NodeSet, Value, ValueKind};
