//! Application-supplied predicates.

use std::fmt;
use std::sync::Arc;

use maple_dispatch_types::Envelope;

use crate::error::Result;

/// A predicate implemented outside the dispatch core. Stored in the
/// generic filter index and evaluated by linear scan.
pub trait EnvelopePredicate: Send + Sync {
    fn matches(&self, envelope: &Envelope) -> Result<bool>;
}

impl<F> EnvelopePredicate for F
where
    F: Fn(&Envelope) -> bool + Send + Sync,
{
    fn matches(&self, envelope: &Envelope) -> Result<bool> {
        Ok(self(envelope))
    }
}

#[derive(Clone)]
pub struct CustomFilter {
    name: String,
    predicate: Arc<dyn EnvelopePredicate>,
}

impl CustomFilter {
    pub fn new(name: impl Into<String>, predicate: Arc<dyn EnvelopePredicate>) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, envelope: &Envelope) -> Result<bool> {
        self.predicate.matches(envelope)
    }
}

impl fmt::Debug for CustomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFilter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
