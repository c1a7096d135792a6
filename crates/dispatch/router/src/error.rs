//! Router errors.

use maple_dispatch_filter::FilterError;
use maple_dispatch_types::FilterId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),
}

impl RouterError {
    /// Two or more entries matched at the top priority.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, RouterError::Filter(FilterError::MultipleMatches { .. }))
    }

    /// Filters implicated in an ambiguity or body-access failure.
    pub fn filters(&self) -> &[FilterId] {
        match self {
            RouterError::Filter(e) => e.filters(),
            RouterError::IllegalState(_) => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
