//! Address-prefix filters and the segment-trie index behind them.

use std::collections::HashMap;

use maple_dispatch_types::{Envelope, EndpointAddress, FilterId, HostNameComparisonMode};
use url::Url;

use crate::error::Result;
use crate::filter::{FilterKind, MessageFilter};
use crate::index::{FilterIndex, MatchSink};

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "net.tcp" => Some(808),
        _ => None,
    }
}

/// Normalized form of a URI under a host comparison mode.
///
/// Scheme and host are lowercased, default ports dropped, empty path
/// segments (including a trailing slash) ignored. Wildcard modes omit the
/// host and port entirely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressKey {
    scheme: String,
    authority: Option<String>,
    segments: Vec<String>,
}

impl AddressKey {
    pub fn normalize(uri: &Url, mode: HostNameComparisonMode) -> Self {
        let scheme = uri.scheme().to_ascii_lowercase();
        let authority = if mode.compares_host() {
            let host = uri.host_str().unwrap_or_default().to_ascii_lowercase();
            match uri.port().filter(|p| Some(*p) != default_port(&scheme)) {
                Some(port) => Some(format!("{}:{}", host, port)),
                None => Some(host),
            }
        } else {
            None
        };
        let segments = uri
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            scheme,
            authority,
            segments,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Same scheme and authority, and `self`'s segments lead `other`'s.
    pub fn is_prefix_of(&self, other: &AddressKey) -> bool {
        self.scheme == other.scheme
            && self.authority == other.authority
            && other.segments.starts_with(&self.segments)
    }
}

/// Matches envelopes whose destination starts with an endpoint address and
/// that carry every reference header of that address.
#[derive(Debug, Clone)]
pub struct PrefixAddressFilter {
    address: EndpointAddress,
    mode: HostNameComparisonMode,
    key: AddressKey,
}

impl PrefixAddressFilter {
    pub fn new(address: EndpointAddress, mode: HostNameComparisonMode) -> Self {
        let key = AddressKey::normalize(&address.uri, mode);
        Self { address, mode, key }
    }

    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    pub fn mode(&self) -> HostNameComparisonMode {
        self.mode
    }

    pub fn key(&self) -> &AddressKey {
        &self.key
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        let Some(to) = envelope.to() else {
            return false;
        };
        self.key.is_prefix_of(&AddressKey::normalize(to, self.mode)) && self.headers_match(envelope)
    }

    /// Final confirmation once the URI prefix has matched.
    pub fn headers_match(&self, envelope: &Envelope) -> bool {
        self.address.headers.iter().all(|h| h.is_present_in(envelope))
    }
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    filters: Vec<(FilterId, PrefixAddressFilter)>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.filters.is_empty()
    }

    fn remove(&mut self, segments: &[String], id: FilterId) -> bool {
        match segments.split_first() {
            None => {
                let before = self.filters.len();
                self.filters.retain(|(f, _)| *f != id);
                self.filters.len() != before
            }
            Some((head, rest)) => {
                let Some(child) = self.children.get_mut(head) else {
                    return false;
                };
                let removed = child.remove(rest, id);
                if child.is_empty() {
                    self.children.remove(head);
                }
                removed
            }
        }
    }
}

type RootKey = (String, Option<String>);

/// Segment tries keyed by host comparison mode, then scheme and authority.
#[derive(Debug, Default)]
pub(crate) struct PrefixIndex {
    roots: HashMap<HostNameComparisonMode, HashMap<RootKey, TrieNode>>,
    count: usize,
}

impl FilterIndex for PrefixIndex {
    fn insert(&mut self, filter: &MessageFilter) {
        let FilterKind::Prefix(prefix) = filter.kind() else {
            return;
        };
        let key = prefix.key();
        let mut node = self
            .roots
            .entry(prefix.mode())
            .or_default()
            .entry((key.scheme.clone(), key.authority.clone()))
            .or_default();
        for segment in &key.segments {
            node = node.children.entry(segment.clone()).or_default();
        }
        node.filters.push((filter.id(), prefix.clone()));
        self.count += 1;
    }

    fn remove(&mut self, filter: &MessageFilter) -> bool {
        let FilterKind::Prefix(prefix) = filter.kind() else {
            return false;
        };
        let key = prefix.key();
        let root_key = (key.scheme.clone(), key.authority.clone());
        let Some(roots) = self.roots.get_mut(&prefix.mode()) else {
            return false;
        };
        let Some(root) = roots.get_mut(&root_key) else {
            return false;
        };
        let removed = root.remove(&key.segments, filter.id());
        if root.is_empty() {
            roots.remove(&root_key);
        }
        if removed {
            self.count -= 1;
        }
        removed
    }

    fn len(&self) -> usize {
        self.count
    }

    fn collect_matches(&self, envelope: &Envelope, sink: &mut MatchSink) -> Result<()> {
        let Some(to) = envelope.to() else {
            return Ok(());
        };
        for (mode, roots) in &self.roots {
            let key = AddressKey::normalize(to, *mode);
            let Some(mut node) = roots.get(&(key.scheme.clone(), key.authority.clone())) else {
                continue;
            };
            let mut depth = 0;
            loop {
                for (id, prefix) in &node.filters {
                    if prefix.headers_match(envelope) {
                        sink.matched.push(*id);
                    }
                }
                let Some(next) = key.segments.get(depth).and_then(|s| node.children.get(s)) else {
                    break;
                };
                node = next;
                depth += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_dispatch_types::{AddressHeader, EnvelopeVersion, MessageHeader};

    fn to(uri: &str) -> Envelope {
        Envelope::new(EnvelopeVersion::None).try_with_to(uri).unwrap()
    }

    fn filter(uri: &str, mode: HostNameComparisonMode) -> MessageFilter {
        MessageFilter::prefix(EndpointAddress::parse(uri).unwrap(), mode)
    }

    #[test]
    fn test_normalization() {
        let a = Url::parse("HTTP://Svc.Example.org:80/Orders/").unwrap();
        let b = Url::parse("http://svc.example.org/Orders").unwrap();
        assert_eq!(
            AddressKey::normalize(&a, HostNameComparisonMode::Exact),
            AddressKey::normalize(&b, HostNameComparisonMode::Exact)
        );

        let c = Url::parse("http://other.host:8080/Orders").unwrap();
        assert_eq!(
            AddressKey::normalize(&a, HostNameComparisonMode::StrongWildcard),
            AddressKey::normalize(&c, HostNameComparisonMode::StrongWildcard)
        );
        assert_ne!(
            AddressKey::normalize(&a, HostNameComparisonMode::Exact),
            AddressKey::normalize(&c, HostNameComparisonMode::Exact)
        );
    }

    #[test]
    fn test_prefix_matching() {
        let f = filter("http://svc/orders", HostNameComparisonMode::Exact);
        assert!(f.matches(&to("http://svc/orders")).unwrap());
        assert!(f.matches(&to("http://svc/orders/42")).unwrap());
        assert!(!f.matches(&to("http://svc/order")).unwrap());
        assert!(!f.matches(&to("http://other/orders")).unwrap());
        assert!(!f.matches(&to("https://svc/orders")).unwrap());
        assert!(!f.matches(&Envelope::new(EnvelopeVersion::None)).unwrap());

        let wild = filter("http://svc/orders", HostNameComparisonMode::WeakWildcard);
        assert!(wild.matches(&to("http://other:9000/orders/1")).unwrap());
    }

    #[test]
    fn test_headers_confirm_match() {
        let address = EndpointAddress::parse("net.tcp://svc/orders")
            .unwrap()
            .with_header(AddressHeader::new("Tenant", "urn:t", "acme"));
        let f = MessageFilter::prefix(address, HostNameComparisonMode::StrongWildcard);
        let bare = to("net.tcp://svc/orders");
        assert!(!f.matches(&bare).unwrap());
        let tagged = bare.with_header(MessageHeader::new("Tenant", "urn:t", "acme"));
        assert!(f.matches(&tagged).unwrap());
    }

    #[test]
    fn test_index_agrees_with_linear_matching() {
        let filters = vec![
            filter("http://svc/", HostNameComparisonMode::StrongWildcard),
            filter("http://svc/orders", HostNameComparisonMode::Exact),
            filter("http://svc/orders/archive", HostNameComparisonMode::Exact),
            filter("http://svc/billing", HostNameComparisonMode::WeakWildcard),
        ];
        let mut index = PrefixIndex::default();
        for f in &filters {
            index.insert(f);
        }
        assert_eq!(index.len(), 4);

        for uri in [
            "http://svc/orders/42",
            "http://svc/orders/archive/1",
            "http://elsewhere/billing",
            "http://svc",
        ] {
            let env = to(uri);
            let mut sink = MatchSink::default();
            index.collect_matches(&env, &mut sink).unwrap();
            let mut indexed = sink.matched;
            indexed.sort();
            let mut linear: Vec<FilterId> = filters
                .iter()
                .filter(|f| f.matches(&env).unwrap())
                .map(|f| f.id())
                .collect();
            linear.sort();
            assert_eq!(indexed, linear, "{}", uri);
        }

        assert!(index.remove(&filters[2]));
        assert!(!index.remove(&filters[2]));
        assert_eq!(index.len(), 3);
    }
}
