//! Endpoint addresses.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::envelope::Envelope;
use crate::error::Result;

/// How the host component participates in address matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HostNameComparisonMode {
    /// Host is ignored; the address matches on any host name.
    #[default]
    StrongWildcard,
    /// Host and port must match exactly.
    Exact,
    /// Host is ignored, but only used when no other mode matched.
    WeakWildcard,
}

impl HostNameComparisonMode {
    /// Whether the host and port form part of the match key.
    pub fn compares_host(&self) -> bool {
        matches!(self, Self::Exact)
    }
}

/// A reference header that an envelope must carry to reach an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressHeader {
    pub name: String,
    pub namespace: String,
    pub value: String,
}

impl AddressHeader {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            value: value.into(),
        }
    }

    /// True when the envelope carries a header with this name, namespace and value.
    pub fn is_present_in(&self, envelope: &Envelope) -> bool {
        envelope.headers().iter().any(|h| {
            h.name == self.name && h.namespace == self.namespace && h.value == self.value
        })
    }
}

/// An endpoint listen address plus its reference headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub uri: Url,
    pub headers: Vec<AddressHeader>,
}

impl EndpointAddress {
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            headers: Vec::new(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(uri)?))
    }

    pub fn with_header(mut self, header: AddressHeader) -> Self {
        self.headers.push(header);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EnvelopeVersion, MessageHeader};

    #[test]
    fn only_exact_mode_compares_host() {
        assert!(HostNameComparisonMode::Exact.compares_host());
        assert!(!HostNameComparisonMode::StrongWildcard.compares_host());
        assert!(!HostNameComparisonMode::WeakWildcard.compares_host());
    }

    #[test]
    fn address_header_presence() {
        let header = AddressHeader::new("Tenant", "urn:t", "acme");
        let env = Envelope::new(EnvelopeVersion::None)
            .with_header(MessageHeader::new("Tenant", "urn:t", "acme"));
        assert!(header.is_present_in(&env));

        let other = Envelope::new(EnvelopeVersion::None)
            .with_header(MessageHeader::new("Tenant", "urn:t", "globex"));
        assert!(!header.is_present_in(&other));
    }

    #[test]
    fn parse_address() {
        let addr = EndpointAddress::parse("net.tcp://svc.local:808/orders").unwrap();
        assert_eq!(addr.uri.scheme(), "net.tcp");
        assert!(EndpointAddress::parse("::").is_err());
    }
}
