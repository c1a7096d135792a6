//! Priority-ordered filter table.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use maple_dispatch_query::QueryConfig;
use maple_dispatch_types::{Envelope, FilterId};
use tracing::{debug, warn};

use crate::error::{FilterError, Result};
use crate::filter::{IndexKind, MessageFilter};
use crate::index::{FilterIndex, MatchSink};

#[derive(Debug)]
struct TableEntry<V> {
    filter: MessageFilter,
    value: V,
    priority: i32,
}

#[derive(Debug, Default)]
struct PriorityLevel {
    indexes: BTreeMap<IndexKind, Box<dyn FilterIndex>>,
}

impl PriorityLevel {
    fn is_empty(&self) -> bool {
        self.indexes.values().all(|i| i.is_empty())
    }
}

/// Outcome of a single-value lookup.
#[derive(Debug, PartialEq)]
pub struct TableMatch<'a, V> {
    pub filter: Option<FilterId>,
    pub value: Option<&'a V>,
    /// Some AND filter's first operand matched.
    pub address_matched: bool,
}

/// Filters mapped to values, grouped by priority.
///
/// Lookups walk priority levels from highest to lowest; the first level
/// with any match decides the result. Within a level each filter kind is
/// held in its own index.
#[derive(Debug)]
pub struct FilterTable<V> {
    entries: HashMap<FilterId, TableEntry<V>>,
    levels: BTreeMap<Reverse<i32>, PriorityLevel>,
    query_config: QueryConfig,
}

impl<V> Default for FilterTable<V> {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

impl<V> FilterTable<V> {
    pub fn new(query_config: QueryConfig) -> Self {
        Self {
            entries: HashMap::new(),
            levels: BTreeMap::new(),
            query_config,
        }
    }

    /// Register `filter` → `value` at `priority`. A filter may be registered once.
    pub fn add(&mut self, filter: MessageFilter, value: V, priority: i32) -> Result<()> {
        if self.entries.contains_key(&filter.id()) {
            return Err(FilterError::InvalidArgument(format!(
                "{} is already registered",
                filter
            )));
        }
        let config = self.query_config;
        self.levels
            .entry(Reverse(priority))
            .or_default()
            .indexes
            .entry(filter.index_kind())
            .or_insert_with(|| filter.index_kind().create(&config))
            .insert(&filter);
        debug!(filter = %filter, priority, "filter added");
        self.entries.insert(
            filter.id(),
            TableEntry {
                filter,
                value,
                priority,
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, id: &FilterId) -> Option<V> {
        let entry = self.entries.remove(id)?;
        let key = Reverse(entry.priority);
        if let Some(level) = self.levels.get_mut(&key) {
            if let Some(index) = level.indexes.get_mut(&entry.filter.index_kind()) {
                index.remove(&entry.filter);
            }
            if level.is_empty() {
                self.levels.remove(&key);
            }
        }
        debug!(filter = %entry.filter, "filter removed");
        Some(entry.value)
    }

    pub fn get(&self, id: &FilterId) -> Option<&V> {
        self.entries.get(id).map(|e| &e.value)
    }

    pub fn filter(&self, id: &FilterId) -> Option<&MessageFilter> {
        self.entries.get(id).map(|e| &e.filter)
    }

    pub fn priority(&self, id: &FilterId) -> Option<i32> {
        self.entries.get(id).map(|e| e.priority)
    }

    pub fn contains(&self, id: &FilterId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn filters(&self) -> impl Iterator<Item = &MessageFilter> {
        self.entries.values().map(|e| &e.filter)
    }

    /// Unique highest-priority match. Two or more matches at that priority
    /// fail with [`FilterError::MultipleMatches`].
    pub fn get_matching_value(&self, envelope: &Envelope) -> Result<TableMatch<'_, V>> {
        let mut address_matched = false;
        for (Reverse(priority), level) in &self.levels {
            let sink = self.match_level(level, envelope)?;
            address_matched |= sink.address_matched;
            match sink.matched.as_slice() {
                [] => continue,
                [id] => {
                    return Ok(TableMatch {
                        filter: Some(*id),
                        value: self.get(id),
                        address_matched,
                    })
                }
                _ => {
                    warn!(priority, filters = ?sink.matched, "ambiguous filter match");
                    return Err(FilterError::MultipleMatches {
                        filters: sink.matched,
                    });
                }
            }
        }
        Ok(TableMatch {
            filter: None,
            value: None,
            address_matched,
        })
    }

    /// Every value matching at the highest priority that has a match.
    pub fn get_matching_values(&self, envelope: &Envelope) -> Result<Vec<&V>> {
        for level in self.levels.values() {
            let sink = self.match_level(level, envelope)?;
            if !sink.matched.is_empty() {
                return Ok(sink.matched.iter().filter_map(|id| self.get(id)).collect());
            }
        }
        Ok(Vec::new())
    }

    /// Every matching filter at every priority, highest priority first.
    pub fn get_matching_filters(&self, envelope: &Envelope) -> Result<Vec<&MessageFilter>> {
        let mut out = Vec::new();
        for level in self.levels.values() {
            let sink = self.match_level(level, envelope)?;
            out.extend(sink.matched.iter().filter_map(|id| self.filter(id)));
        }
        Ok(out)
    }

    fn match_level(&self, level: &PriorityLevel, envelope: &Envelope) -> Result<MatchSink> {
        let mut sink = MatchSink::default();
        for index in level.indexes.values() {
            index.collect_matches(envelope, &mut sink)?;
        }
        if !sink.body_access_denied.is_empty() {
            warn!(
                envelope = %envelope.id,
                filters = ?sink.body_access_denied,
                "filters need a seekable body"
            );
            return Err(FilterError::BodyAccessDenied {
                filters: sink.body_access_denied,
            });
        }
        Ok(sink)
    }
}
