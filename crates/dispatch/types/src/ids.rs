use serde::{Deserialize, Serialize};

/// Identity of a registered message filter.
///
/// Filters are compared by identity when stored in routing tables, so two
/// structurally equal filters still occupy separate registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilterId(uuid::Uuid);

impl FilterId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl std::fmt::Display for FilterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "filter:{}", self.0)
    }
}

/// Identity of a query registered with a query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(u64);

impl QueryId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "query:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_ids_are_unique() {
        assert_ne!(FilterId::generate(), FilterId::generate());
    }

    #[test]
    fn display_prefixes() {
        assert!(FilterId::generate().to_string().starts_with("filter:"));
        assert_eq!(QueryId::new(7).to_string(), "query:7");
    }
}
