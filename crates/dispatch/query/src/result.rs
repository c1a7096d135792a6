//! Tagged query results.

use serde::{Deserialize, Serialize};

use crate::document::NodeKind;
use crate::error::{ProcessingErrorKind, QueryProcessingError, Result};
use crate::navigator::MessageNavigator;
use crate::value::{Value, ValueKind};

/// Snapshot of a selected node, detached from the document it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultNode {
    pub kind: NodeKind,
    pub namespace: Option<String>,
    pub local_name: String,
    pub value: String,
}

/// Native result of a query opcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryResult {
    Boolean(bool),
    Number(f64),
    String(String),
    NodeSet(Vec<ResultNode>),
}

impl QueryResult {
    /// Wrap an evaluation result. Node-sets are snapshotted; the document
    /// root has no atomic value and raises `NotAtomized`.
    pub fn from_value(value: Value, nav: &mut MessageNavigator<'_>) -> Result<Self> {
        Ok(match value {
            Value::Boolean(b) => QueryResult::Boolean(b),
            Value::Number(n) => QueryResult::Number(n),
            Value::String(s) => QueryResult::String(s),
            Value::NodeSet(set) => {
                let mut nodes = Vec::with_capacity(set.len());
                for id in set.iter() {
                    let kind = nav.kind(id)?;
                    if kind == NodeKind::Root {
                        return Err(QueryProcessingError::new(
                            ProcessingErrorKind::NotAtomized,
                            "the document root cannot be returned as a query result",
                        ));
                    }
                    nodes.push(ResultNode {
                        kind,
                        namespace: nav.namespace(id)?.map(str::to_string),
                        local_name: nav.local_name(id)?.to_string(),
                        value: nav.string_value(id)?,
                    });
                }
                QueryResult::NodeSet(nodes)
            }
        })
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            QueryResult::Boolean(_) => ValueKind::Boolean,
            QueryResult::Number(_) => ValueKind::Number,
            QueryResult::String(_) => ValueKind::String,
            QueryResult::NodeSet(_) => ValueKind::NodeSet,
        }
    }

    /// Boolean view with the same truthiness rules the match opcode applies.
    pub fn as_bool(&self) -> bool {
        match self {
            QueryResult::Boolean(b) => *b,
            QueryResult::Number(n) => *n != 0.0 && !n.is_nan(),
            QueryResult::String(s) => !s.is_empty(),
            QueryResult::NodeSet(nodes) => !nodes.is_empty(),
        }
    }
}
