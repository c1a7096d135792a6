//! Endpoint tables shaped the way a service host registers them.

use std::sync::Arc;

use maple_dispatch_filter::{MessageFilter, QueryFilter};
use maple_dispatch_query::{NamespaceMap, QueryConfig};
use maple_dispatch_router::{EndpointTable, RouterError, RoutingConfig, RoutingTarget};
use maple_dispatch_types::{
    Element, EndpointAddress, Envelope, EnvelopeVersion, HostNameComparisonMode,
};

#[derive(Debug)]
struct Service {
    contract: &'static str,
    filter: MessageFilter,
    priority: i32,
}

impl RoutingTarget for Service {
    fn filter(&self) -> &MessageFilter {
        &self.filter
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

fn service(contract: &'static str, uri: &str, actions: &[&str]) -> Arc<Service> {
    let address = MessageFilter::prefix(
        EndpointAddress::parse(uri).unwrap(),
        HostNameComparisonMode::StrongWildcard,
    );
    Arc::new(Service {
        contract,
        filter: MessageFilter::and(address, MessageFilter::action(actions.iter().copied()).unwrap()),
        priority: 0,
    })
}

fn call(uri: &str, action: &str) -> Envelope {
    Envelope::new(EnvelopeVersion::Soap12)
        .try_with_to(uri)
        .unwrap()
        .with_action(action)
}

#[test]
fn test_host_grows_past_cache() {
    let table = EndpointTable::new();
    let contracts = [
        ("orders", "http://host/orders", "urn:orders:submit"),
        ("billing", "http://host/billing", "urn:billing:charge"),
        ("catalog", "http://host/catalog", "urn:catalog:browse"),
        ("shipping", "http://host/shipping", "urn:shipping:track"),
    ];

    for (i, &(contract, uri, action)) in contracts.iter().enumerate() {
        table.add_entry(service(contract, uri, &[action])).unwrap();
        assert_eq!(table.is_indexed(), i >= 2);

        // every contract registered so far still routes
        for (expected, uri, action) in &contracts[..=i] {
            let hit = table.lookup(&call(uri, action)).unwrap();
            assert_eq!(hit.target.map(|s| s.contract), Some(*expected));
        }
    }

    let miss = table.lookup(&call("http://host/orders", "urn:billing:charge")).unwrap();
    assert!(miss.target.is_none());
    assert!(miss.address_matched);
}

#[test]
fn test_content_routing_overrides_address() {
    let table = EndpointTable::with_config(RoutingConfig::default(), QueryConfig::default());
    let ns = NamespaceMap::default().with_prefix("o", "urn:orders");
    let express = Arc::new(Service {
        contract: "express",
        filter: MessageFilter::query(
            QueryFilter::compile("//o:Order[@priority = 'high']", &ns, &QueryConfig::default())
                .unwrap(),
        ),
        priority: 10,
    });
    table.add_entry(express).unwrap();
    table
        .add_entry(service("orders", "http://host/orders", &["urn:orders:submit"]))
        .unwrap();

    let high = call("http://host/orders", "urn:orders:submit").with_body(
        Element::new("Order")
            .in_namespace("urn:orders")
            .with_attribute("priority", "high"),
    );
    let hit = table.lookup(&high).unwrap();
    assert_eq!(hit.target.map(|s| s.contract), Some("express"));

    let normal = call("http://host/orders", "urn:orders:submit")
        .with_body(Element::new("Order").in_namespace("urn:orders"));
    let hit = table.lookup(&normal).unwrap();
    assert_eq!(hit.target.map(|s| s.contract), Some("orders"));

    let streamed = call("http://host/orders", "urn:orders:submit")
        .with_streamed_body(Element::new("Order").in_namespace("urn:orders"));
    let err = table.lookup(&streamed).unwrap_err();
    assert!(matches!(err, RouterError::Filter(_)));
    assert_eq!(err.filters().len(), 1);
}
