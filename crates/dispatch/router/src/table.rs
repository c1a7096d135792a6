//! Endpoint routing table.
//!
//! While few endpoints are registered the table keeps them in a flat list
//! that is scanned without taking the lock. Registering one more than
//! [`RoutingConfig::cache_threshold`] entries moves everything into a
//! priority-indexed [`FilterTable`] for good.
//!
//! The indexed table is published as an immutable snapshot and rebuilt on
//! every mutation, so filters are never evaluated while the lock is held.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use maple_dispatch_filter::{FilterError, FilterKind, FilterTable, MessageFilter};
use maple_dispatch_query::QueryConfig;
use maple_dispatch_types::{Envelope, FilterId};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::RoutingConfig;
use crate::error::{Result, RouterError};
use crate::target::{DispatchOwner, RoutingTarget};

/// Outcome of [`EndpointTable::lookup`].
#[derive(Debug)]
pub struct LookupResult<T> {
    pub target: Option<Arc<T>>,
    /// The address part of some endpoint matched, even when its contract did not.
    pub address_matched: bool,
}

impl<T> LookupResult<T> {
    fn miss() -> Self {
        Self {
            target: None,
            address_matched: false,
        }
    }

    pub fn is_match(&self) -> bool {
        self.target.is_some()
    }
}

struct TableState<T> {
    /// Registered entries once the table has left cache mode.
    indexed: Option<Vec<Arc<T>>>,
}

/// Routes envelopes to registered targets by filter and priority.
pub struct EndpointTable<T> {
    cache: ArcSwap<Vec<Arc<T>>>,
    index: ArcSwapOption<FilterTable<Arc<T>>>,
    state: Mutex<TableState<T>>,
    owner: Option<Arc<dyn DispatchOwner>>,
    config: RoutingConfig,
    query_config: QueryConfig,
}

impl<T: RoutingTarget> Default for EndpointTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RoutingTarget> EndpointTable<T> {
    pub fn new() -> Self {
        Self::with_config(RoutingConfig::default(), QueryConfig::default())
    }

    pub fn with_config(config: RoutingConfig, query_config: QueryConfig) -> Self {
        Self {
            cache: ArcSwap::from_pointee(Vec::new()),
            index: ArcSwapOption::empty(),
            state: Mutex::new(TableState { indexed: None }),
            owner: None,
            config,
            query_config,
        }
    }

    /// Attach the dispatcher that is consulted before mutation and told about
    /// every addition and removal.
    pub fn with_owner(mut self, owner: Arc<dyn DispatchOwner>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Register a target under its own filter and priority.
    pub fn add_entry(&self, target: Arc<T>) -> Result<()> {
        if target.is_service() {
            self.ensure_open()?;
        }
        let id = target.filter().id();
        {
            let mut state = self.state.lock();
            self.insert_locked(&mut state, target)?;
        }
        self.notify_added(id);
        Ok(())
    }

    pub fn remove_entry(&self, id: &FilterId) -> Option<Arc<T>> {
        let removed = {
            let mut state = self.state.lock();
            self.remove_locked(&mut state, id)
        }?;
        self.notify_removed(*id);
        Some(removed)
    }

    /// Swap the entry registered under `old` for `target` in one critical
    /// section. Returns the replaced entry, if `old` was registered.
    pub fn replace_entry(&self, old: &FilterId, target: Arc<T>) -> Result<Option<Arc<T>>> {
        if target.is_service() {
            self.ensure_open()?;
        }
        let id = target.filter().id();
        let replaced = {
            let mut state = self.state.lock();
            if id != *old && self.contains_locked(&state, &id) {
                return Err(already_registered(target.filter()));
            }
            let replaced = self.remove_locked(&mut state, old);
            self.insert_locked(&mut state, target)?;
            replaced
        };
        if replaced.is_some() {
            self.notify_removed(*old);
        }
        self.notify_added(id);
        Ok(replaced)
    }

    /// Find the unique highest-priority target matching the envelope.
    ///
    /// Equal top-priority matches fail with an ambiguous-match error naming
    /// every tied filter. A miss on the lock-free cache scan is confirmed
    /// under the lock before it is reported.
    pub fn lookup(&self, envelope: &Envelope) -> Result<LookupResult<T>> {
        {
            let cached = self.cache.load();
            if !cached.is_empty() {
                let hit = scan(&cached, envelope)?;
                if hit.is_match() {
                    return Ok(hit);
                }
            }
        }

        let (cached, index) = {
            let _state = self.state.lock();
            (self.cache.load_full(), self.index.load_full())
        };
        match index {
            None => scan(&cached, envelope),
            Some(table) => {
                let hit = table.get_matching_value(envelope)?;
                Ok(LookupResult {
                    target: hit.value.cloned(),
                    address_matched: hit.address_matched,
                })
            }
        }
    }

    pub fn contains(&self, id: &FilterId) -> bool {
        let state = self.state.lock();
        self.contains_locked(&state, id)
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock();
        match &state.indexed {
            Some(entries) => entries.len(),
            None => self.cache.load().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the table has left cache mode.
    pub fn is_indexed(&self) -> bool {
        self.state.lock().indexed.is_some()
    }

    /// Entries currently held in the flat cache.
    pub fn cached_len(&self) -> usize {
        self.cache.load().len()
    }

    /// Snapshot of every registered target.
    pub fn entries(&self) -> Vec<Arc<T>> {
        let state = self.state.lock();
        match &state.indexed {
            Some(entries) => entries.clone(),
            None => self.cache.load_full().to_vec(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match &self.owner {
            Some(owner) if owner.is_closed() => Err(RouterError::IllegalState(
                "cannot add a service endpoint to a closed dispatcher".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn contains_locked(&self, state: &TableState<T>, id: &FilterId) -> bool {
        match &state.indexed {
            Some(entries) => entries.iter().any(|e| e.filter().id() == *id),
            None => self.cache.load().iter().any(|e| e.filter().id() == *id),
        }
    }

    fn insert_locked(&self, state: &mut TableState<T>, target: Arc<T>) -> Result<()> {
        let filter = target.filter().clone();
        let priority = target.priority();
        if let Some(entries) = state.indexed.as_mut() {
            if entries.iter().any(|e| e.filter().id() == filter.id()) {
                return Err(already_registered(&filter));
            }
            let mut next = entries.clone();
            next.push(target);
            self.publish_index(&next)?;
            *entries = next;
            debug!(filter = %filter, priority, "endpoint added");
            return Ok(());
        }

        let cached = self.cache.load_full();
        if cached.iter().any(|e| e.filter().id() == filter.id()) {
            return Err(already_registered(&filter));
        }
        if cached.len() < self.config.cache_threshold {
            let mut next = cached.to_vec();
            next.push(target);
            self.cache.store(Arc::new(next));
        } else {
            let mut entries = cached.to_vec();
            entries.push(target);
            self.publish_index(&entries)?;
            debug!(
                entries = entries.len(),
                threshold = self.config.cache_threshold,
                "endpoint table switched to indexed mode"
            );
            state.indexed = Some(entries);
            self.cache.store(Arc::new(Vec::new()));
        }
        debug!(filter = %filter, priority, "endpoint added");
        Ok(())
    }

    fn remove_locked(&self, state: &mut TableState<T>, id: &FilterId) -> Option<Arc<T>> {
        let removed = match state.indexed.as_mut() {
            Some(entries) => {
                let position = entries.iter().position(|e| e.filter().id() == *id)?;
                let mut next = entries.clone();
                let removed = next.remove(position);
                if let Err(e) = self.publish_index(&next) {
                    warn!(filter = %id, error = %e, "could not rebuild the endpoint index");
                    return None;
                }
                *entries = next;
                removed
            }
            None => {
                let cached = self.cache.load_full();
                let position = cached.iter().position(|e| e.filter().id() == *id)?;
                let mut next = cached.to_vec();
                let removed = next.remove(position);
                self.cache.store(Arc::new(next));
                removed
            }
        };
        debug!(filter = %id, "endpoint removed");
        Some(removed)
    }

    /// Build a filter table over `entries` and make it the lookup snapshot.
    fn publish_index(&self, entries: &[Arc<T>]) -> Result<()> {
        let mut table = FilterTable::new(self.query_config);
        for entry in entries {
            table.add(entry.filter().clone(), entry.clone(), entry.priority())?;
        }
        self.index.store(Some(Arc::new(table)));
        Ok(())
    }

    fn notify_added(&self, id: FilterId) {
        if let Some(owner) = &self.owner {
            owner.entry_added(id);
        }
    }

    fn notify_removed(&self, id: FilterId) {
        if let Some(owner) = &self.owner {
            owner.entry_removed(id);
        }
    }
}

impl<T> fmt::Debug for EndpointTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointTable")
            .field("cached", &self.cache.load().len())
            .field("indexed", &self.state.lock().indexed.is_some())
            .field("config", &self.config)
            .finish()
    }
}

fn already_registered(filter: &MessageFilter) -> RouterError {
    FilterError::InvalidArgument(format!("{} is already registered", filter)).into()
}

/// Linear best-match over the cached entries.
///
/// A strictly higher priority replaces the current best and forgets earlier
/// ties; an equal priority joins the tie. Filters denied access to the body
/// are collected; the highest priority holding a denial fails the lookup
/// unless a match sits strictly above it, the same outcome the indexed
/// table gives when it walks its priority levels.
fn scan<T: RoutingTarget>(entries: &[Arc<T>], envelope: &Envelope) -> Result<LookupResult<T>> {
    let mut best: Option<&Arc<T>> = None;
    let mut tied: Vec<FilterId> = Vec::new();
    let mut denied: Vec<(i32, FilterId)> = Vec::new();
    let mut result = LookupResult::miss();

    for entry in entries {
        let filter = entry.filter();
        let outcome = match filter.kind() {
            FilterKind::And(and) => and.matches_with_address(envelope).map(|outcome| {
                result.address_matched |= outcome.address_matched;
                outcome.matched
            }),
            _ => filter.matches(envelope),
        };
        let matched = match outcome {
            Ok(matched) => matched,
            Err(FilterError::BodyAccessDenied { filters }) => {
                denied.extend(filters.into_iter().map(|id| (entry.priority(), id)));
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if !matched {
            continue;
        }
        match best {
            Some(current) if entry.priority() < current.priority() => {}
            Some(current) if entry.priority() == current.priority() => tied.push(filter.id()),
            _ => {
                best = Some(entry);
                tied.clear();
                tied.push(filter.id());
            }
        }
    }

    if let Some(top) = denied.iter().map(|(priority, _)| *priority).max() {
        if best.map_or(true, |b| top >= b.priority()) {
            let filters: Vec<FilterId> = denied
                .into_iter()
                .filter(|(priority, _)| *priority == top)
                .map(|(_, id)| id)
                .collect();
            warn!(envelope = %envelope.id, filters = ?filters, "filters need a seekable body");
            return Err(FilterError::BodyAccessDenied { filters }.into());
        }
    }
    if tied.len() > 1 {
        warn!(filters = ?tied, "ambiguous endpoint match");
        return Err(FilterError::MultipleMatches { filters: tied }.into());
    }
    result.target = best.cloned();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_dispatch_types::{Element, EndpointAddress, EnvelopeVersion, HostNameComparisonMode};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Endpoint {
        name: &'static str,
        filter: MessageFilter,
        priority: i32,
        service: bool,
    }

    fn endpoint(name: &'static str, filter: MessageFilter, priority: i32) -> Arc<Endpoint> {
        Arc::new(Endpoint {
            name,
            filter,
            priority,
            service: true,
        })
    }

    impl RoutingTarget for Endpoint {
        fn filter(&self) -> &MessageFilter {
            &self.filter
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn is_service(&self) -> bool {
            self.service
        }
    }

    #[derive(Default)]
    struct Owner {
        closed: AtomicBool,
        added: AtomicUsize,
        removed: AtomicUsize,
    }

    impl DispatchOwner for Owner {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn entry_added(&self, _filter: FilterId) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }

        fn entry_removed(&self, _filter: FilterId) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn cached_table() -> EndpointTable<Endpoint> {
        EndpointTable::with_config(RoutingConfig { cache_threshold: 8 }, QueryConfig::default())
    }

    fn indexed_table() -> EndpointTable<Endpoint> {
        EndpointTable::with_config(RoutingConfig { cache_threshold: 0 }, QueryConfig::default())
    }

    fn body_query(source: &str) -> MessageFilter {
        let ns = maple_dispatch_query::NamespaceMap::default();
        let query = maple_dispatch_filter::QueryFilter::compile(source, &ns, &QueryConfig::default());
        MessageFilter::query(query.unwrap())
    }

    #[test]
    fn test_body_denials_reported_together_in_both_modes() {
        for table in [cached_table(), indexed_table()] {
            let first = endpoint("lines", body_query("count(//Line) > 0"), 0);
            let second = endpoint("orders", body_query("//Order"), 0);
            let fallback = endpoint("fallback", MessageFilter::match_all(), -1);
            let (first_id, second_id) = (first.filter.id(), second.filter.id());
            table.add_entry(first).unwrap();
            table.add_entry(second).unwrap();
            table.add_entry(fallback).unwrap();

            let streamed = env("urn:a").with_streamed_body(Element::new("Order"));
            let err = table.lookup(&streamed).unwrap_err();
            let RouterError::Filter(FilterError::BodyAccessDenied { filters }) = err else {
                panic!("expected a body access error, got {:?}", err);
            };
            assert_eq!(filters.len(), 2);
            assert!(filters.contains(&first_id) && filters.contains(&second_id));
        }
    }

    #[test]
    fn test_filters_may_reenter_the_table() {
        use std::sync::{OnceLock, Weak};

        for table in [cached_table(), indexed_table()] {
            let table = Arc::new(table);
            let slot = Arc::new(OnceLock::<Weak<EndpointTable<Endpoint>>>::new());
            let seen = slot.clone();
            let reentrant = MessageFilter::custom("reentrant", move |_: &Envelope| {
                seen.get()
                    .and_then(Weak::upgrade)
                    .is_some_and(|t| t.len() == 2 && !t.entries().is_empty())
            });
            slot.set(Arc::downgrade(&table)).unwrap();
            table.add_entry(endpoint("reentrant", reentrant, 1)).unwrap();
            table
                .add_entry(endpoint("never", MessageFilter::match_none(), 0))
                .unwrap();

            let hit = table.lookup(&env("urn:a")).unwrap();
            assert_eq!(hit.target.unwrap().name, "reentrant");
        }
    }

    #[test]
    fn test_higher_match_shadows_body_denials_in_both_modes() {
        for table in [cached_table(), indexed_table()] {
            table
                .add_entry(endpoint("orders", body_query("//Order"), 0))
                .unwrap();
            table
                .add_entry(endpoint("urgent", MessageFilter::match_all(), 5))
                .unwrap();

            let streamed = env("urn:a").with_streamed_body(Element::new("Order"));
            let hit = table.lookup(&streamed).unwrap();
            assert_eq!(hit.target.unwrap().name, "urgent");
        }
    }

    fn env(action: &str) -> Envelope {
        Envelope::new(EnvelopeVersion::Soap12)
            .try_with_to("http://svc/orders")
            .unwrap()
            .with_action(action)
    }

    #[test]
    fn test_migrates_on_third_entry() {
        let table = EndpointTable::new();
        table.add_entry(endpoint("a", MessageFilter::action(["urn:a"]).unwrap(), 0)).unwrap();
        table.add_entry(endpoint("b", MessageFilter::action(["urn:b"]).unwrap(), 0)).unwrap();
        assert!(!table.is_indexed());
        assert_eq!(table.cached_len(), 2);

        table.add_entry(endpoint("c", MessageFilter::action(["urn:c"]).unwrap(), 0)).unwrap();
        assert!(table.is_indexed());
        assert_eq!(table.cached_len(), 0);
        assert_eq!(table.len(), 3);

        table.add_entry(endpoint("d", MessageFilter::action(["urn:d"]).unwrap(), 0)).unwrap();
        assert_eq!(table.cached_len(), 0);
        assert_eq!(table.len(), 4);

        for (action, name) in [("urn:a", "a"), ("urn:c", "c"), ("urn:d", "d")] {
            let hit = table.lookup(&env(action)).unwrap();
            assert_eq!(hit.target.map(|t| t.name), Some(name));
        }
    }

    #[test]
    fn test_removal_never_demotes() {
        let table = EndpointTable::new();
        let entries: Vec<_> = ["urn:a", "urn:b", "urn:c"]
            .into_iter()
            .map(|a| endpoint("e", MessageFilter::action([a]).unwrap(), 0))
            .collect();
        for e in &entries {
            table.add_entry(e.clone()).unwrap();
        }
        for e in &entries {
            assert!(table.remove_entry(&e.filter.id()).is_some());
        }
        assert!(table.is_empty());
        assert!(table.is_indexed());
        assert!(table.remove_entry(&entries[0].filter.id()).is_none());
    }

    fn priority_case(table: &EndpointTable<Endpoint>, priorities: &[i32]) -> Result<LookupResult<Endpoint>> {
        for (i, p) in priorities.iter().enumerate() {
            let name = ["first", "second", "third"][i];
            table.add_entry(endpoint(name, MessageFilter::match_all(), *p)).unwrap();
        }
        table.lookup(&env("urn:any"))
    }

    #[test]
    fn test_later_higher_priority_clears_tie() {
        for table in [cached_table(), indexed_table()] {
            let hit = priority_case(&table, &[5, 5, 7]).unwrap();
            assert_eq!(hit.target.map(|t| t.name), Some("third"));
        }
    }

    #[test]
    fn test_three_way_tie_is_ambiguous() {
        for table in [cached_table(), indexed_table()] {
            let err = priority_case(&table, &[5, 5, 5]).unwrap_err();
            assert!(err.is_ambiguous());
            assert_eq!(err.filters().len(), 3);
        }
    }

    #[test]
    fn test_lower_ties_after_best_are_ignored() {
        for table in [cached_table(), indexed_table()] {
            let hit = priority_case(&table, &[7, 5, 5]).unwrap();
            assert_eq!(hit.target.map(|t| t.name), Some("first"));
        }
    }

    #[test]
    fn test_address_matched_without_contract() {
        let address = || {
            MessageFilter::prefix(
                EndpointAddress::parse("http://svc/orders").unwrap(),
                HostNameComparisonMode::Exact,
            )
        };
        for table in [cached_table(), indexed_table()] {
            table
                .add_entry(endpoint(
                    "orders",
                    MessageFilter::and(address(), MessageFilter::action(["urn:submit"]).unwrap()),
                    0,
                ))
                .unwrap();

            let hit = table.lookup(&env("urn:submit")).unwrap();
            assert_eq!(hit.target.map(|t| t.name), Some("orders"));

            let miss = table.lookup(&env("urn:refund")).unwrap();
            assert!(miss.target.is_none());
            assert!(miss.address_matched);

            let elsewhere = Envelope::new(EnvelopeVersion::Soap12)
                .try_with_to("http://svc/billing")
                .unwrap()
                .with_action("urn:submit");
            let miss = table.lookup(&elsewhere).unwrap();
            assert!(!miss.address_matched);
        }
    }

    #[test]
    fn test_closed_owner_rejects_service_entries() {
        let owner = Arc::new(Owner::default());
        let table = EndpointTable::new().with_owner(owner.clone());
        owner.closed.store(true, Ordering::SeqCst);

        let err = table
            .add_entry(endpoint("svc", MessageFilter::match_all(), 0))
            .unwrap_err();
        assert!(matches!(err, RouterError::IllegalState(_)));
        assert!(table.is_empty());

        let infrastructure = Arc::new(Endpoint {
            name: "infra",
            filter: MessageFilter::match_none(),
            priority: 0,
            service: false,
        });
        table.add_entry(infrastructure).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_owner_notified_of_changes() {
        let owner = Arc::new(Owner::default());
        let table = EndpointTable::new().with_owner(owner.clone());
        let a = endpoint("a", MessageFilter::action(["urn:a"]).unwrap(), 0);
        let b = endpoint("b", MessageFilter::action(["urn:b"]).unwrap(), 0);
        table.add_entry(a.clone()).unwrap();

        let replaced = table.replace_entry(&a.filter.id(), b.clone()).unwrap();
        assert_eq!(replaced.map(|t| t.name), Some("a"));
        assert!(table.contains(&b.filter.id()));
        assert!(!table.contains(&a.filter.id()));

        table.remove_entry(&b.filter.id());
        assert_eq!(owner.added.load(Ordering::SeqCst), 2);
        assert_eq!(owner.removed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        for table in [cached_table(), indexed_table()] {
            let a = endpoint("a", MessageFilter::match_all(), 0);
            table.add_entry(a.clone()).unwrap();
            assert!(matches!(
                table.add_entry(a),
                Err(RouterError::Filter(FilterError::InvalidArgument(_)))
            ));
            assert_eq!(table.len(), 1);
        }
    }

    #[test]
    fn test_entries_snapshot() {
        let table = EndpointTable::new();
        for name in ["a", "b", "c"] {
            table.add_entry(endpoint(name, MessageFilter::match_none(), 0)).unwrap();
        }
        let mut names: Vec<_> = table.entries().iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_concurrent_registration_never_loses_lookup() {
        let table = EndpointTable::new();
        table
            .add_entry(endpoint("anchor", MessageFilter::action(["urn:anchor"]).unwrap(), 0))
            .unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..64 {
                    let action = format!("urn:op{}", i);
                    table
                        .add_entry(endpoint("op", MessageFilter::action([action]).unwrap(), 0))
                        .unwrap();
                }
            });
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..256 {
                        let hit = table.lookup(&env("urn:anchor")).unwrap();
                        assert_eq!(hit.target.map(|t| t.name), Some("anchor"));
                    }
                });
            }
        });
        assert_eq!(table.len(), 65);
    }

    proptest! {
        #[test]
        fn cache_and_index_agree(priorities in proptest::collection::vec(0i32..4, 1..6)) {
            let cached = cached_table();
            let indexed = indexed_table();
            let entries: Vec<_> = priorities
                .iter()
                .map(|p| endpoint("e", MessageFilter::match_all(), *p))
                .collect();
            for e in &entries {
                cached.add_entry(e.clone()).unwrap();
                indexed.add_entry(e.clone()).unwrap();
            }

            let top = *priorities.iter().max().unwrap();
            let ties = priorities.iter().filter(|p| **p == top).count();
            let envelope = env("urn:any");
            for table in [&cached, &indexed] {
                match table.lookup(&envelope) {
                    Ok(hit) => {
                        prop_assert_eq!(ties, 1);
                        prop_assert_eq!(hit.target.map(|t| t.priority), Some(top));
                    }
                    Err(e) => {
                        prop_assert!(e.is_ambiguous());
                        prop_assert_eq!(e.filters().len(), ties);
                    }
                }
            }
        }
    }
}
