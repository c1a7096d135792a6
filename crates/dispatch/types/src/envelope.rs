//! Envelope and buffered envelope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::content::Element;
use crate::error::{EnvelopeError, Result};

/// Namespace of the addressing headers (`To`, `Action`) surfaced to queries.
pub const ADDRESSING_NAMESPACE: &str = "http://www.w3.org/2005/08/addressing";

/// Envelope schema version. Determines the namespace of the
/// `Envelope`, `Header` and `Body` elements queries navigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EnvelopeVersion {
    Soap11,
    #[default]
    Soap12,
    /// Plain envelope with no schema namespace.
    None,
}

impl EnvelopeVersion {
    pub fn namespace(&self) -> Option<&'static str> {
        match self {
            Self::Soap11 => Some("http://schemas.xmlsoap.org/soap/envelope/"),
            Self::Soap12 => Some("http://www.w3.org/2003/05/soap-envelope"),
            Self::None => None,
        }
    }
}

/// Whether the body can be read repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyState {
    /// No body.
    Empty,
    /// Body held in memory; any number of readers may inspect it.
    Buffered,
    /// Body is a forward-only stream; inspecting it during routing would
    /// consume it before the endpoint sees it.
    Streamed,
}

/// A header carried by an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub namespace: String,
    pub value: String,
    pub must_understand: bool,
}

impl MessageHeader {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            value: value.into(),
            must_understand: false,
        }
    }
}

/// A parsed inbound envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: uuid::Uuid,
    pub version: EnvelopeVersion,
    to: Option<Url>,
    action: Option<String>,
    headers: Vec<MessageHeader>,
    body: Option<Element>,
    body_state: BodyState,
}

impl Envelope {
    pub fn new(version: EnvelopeVersion) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            version,
            to: None,
            action: None,
            headers: Vec::new(),
            body: None,
            body_state: BodyState::Empty,
        }
    }

    pub fn with_to(mut self, to: Url) -> Self {
        self.to = Some(to);
        self
    }

    /// Set the destination from a string.
    pub fn try_with_to(self, to: &str) -> Result<Self> {
        let url = Url::parse(to)?;
        Ok(self.with_to(url))
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_header(mut self, header: MessageHeader) -> Self {
        self.headers.push(header);
        self
    }

    /// Attach an in-memory body.
    pub fn with_body(mut self, body: Element) -> Self {
        self.body = Some(body);
        self.body_state = BodyState::Buffered;
        self
    }

    /// Attach a forward-only body.
    pub fn with_streamed_body(mut self, body: Element) -> Self {
        self.body = Some(body);
        self.body_state = BodyState::Streamed;
        self
    }

    pub fn to(&self) -> Option<&Url> {
        self.to.as_ref()
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn headers(&self) -> &[MessageHeader] {
        &self.headers
    }

    /// Find the first header with the given name and namespace.
    pub fn find_header(&self, name: &str, namespace: &str) -> Option<&MessageHeader> {
        self.headers
            .iter()
            .find(|h| h.name == name && h.namespace == namespace)
    }

    pub fn body(&self) -> Option<&Element> {
        self.body.as_ref()
    }

    pub fn body_state(&self) -> BodyState {
        self.body_state
    }

    /// True when the body may be inspected without consuming it.
    pub fn is_seekable(&self) -> bool {
        self.body_state != BodyState::Streamed
    }

    /// Buffer this envelope so it can be realized any number of times.
    ///
    /// A streamed body is read into memory as part of buffering.
    pub fn into_buffer(mut self) -> EnvelopeBuffer {
        if self.body_state == BodyState::Streamed {
            self.body_state = BodyState::Buffered;
        }
        EnvelopeBuffer {
            inner: Arc::new(BufferInner {
                snapshot: self,
                closed: AtomicBool::new(false),
            }),
        }
    }
}

/// A buffered copy of an envelope.
///
/// Cloning shares the same snapshot. Closing the buffer disposes the snapshot
/// for every holder: later realizations fail with
/// [`EnvelopeError::BufferClosed`].
#[derive(Debug, Clone)]
pub struct EnvelopeBuffer {
    inner: Arc<BufferInner>,
}

#[derive(Debug)]
struct BufferInner {
    snapshot: Envelope,
    closed: AtomicBool,
}

impl EnvelopeBuffer {
    /// Realize a fresh envelope from the buffered snapshot.
    pub fn create_envelope(&self) -> Result<Envelope> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(EnvelopeError::BufferClosed);
        }
        let mut envelope = self.inner.snapshot.clone();
        envelope.id = uuid::Uuid::new_v4();
        Ok(envelope)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Action of the buffered envelope, readable without realizing it.
    pub fn action(&self) -> Option<&str> {
        self.inner.snapshot.action()
    }
}
