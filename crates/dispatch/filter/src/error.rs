//! Filter errors.

use maple_dispatch_query::{QueryCompileError, QueryProcessingError};
use maple_dispatch_types::{EnvelopeError, FilterId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Multiple filters matched at the same priority: {filters:?}")]
    MultipleMatches { filters: Vec<FilterId> },

    #[error("Filters read the body of a non-seekable envelope: {filters:?}")]
    BodyAccessDenied { filters: Vec<FilterId> },

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Query evaluation failed: {0}")]
    Query(#[from] QueryProcessingError),

    #[error("Query compilation failed: {0}")]
    Compile(#[from] QueryCompileError),
}

impl FilterError {
    /// Filters implicated in an ambiguity or body-access failure.
    pub fn filters(&self) -> &[FilterId] {
        match self {
            FilterError::MultipleMatches { filters } | FilterError::BodyAccessDenied { filters } => {
                filters
            }
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
