//! Message document: an arena view of an envelope for query navigation.
//!
//! The document is laid out as
//!
//! ```text
//! (root)
//! └── Envelope
//!     ├── Header
//!     │   ├── To        (addressing namespace, when a destination is set)
//!     │   ├── Action    (addressing namespace, when an action is set)
//!     │   └── <one element per message header>
//!     └── Body
//!         └── <body element>
//! ```
//!
//! Nodes are stored in document order, so a [`NodeId`] comparison is a
//! document-order comparison and a position marker is a plain index.

use maple_dispatch_types::{Content, Element, Envelope, ADDRESSING_NAMESPACE};
use serde::{Deserialize, Serialize};

/// Position of a node in a [`MessageDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Rebuild a marker from a raw index; validity is checked on use.
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Element,
    Attribute,
    Text,
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub namespace: Option<String>,
    pub local_name: String,
    /// Attribute value or text content; empty for roots and elements.
    pub value: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attributes: Vec<NodeId>,
    /// Node lies strictly inside the Body element.
    pub in_body: bool,
}

/// Arena view of an envelope.
#[derive(Debug, Clone)]
pub struct MessageDocument {
    nodes: Vec<Node>,
    seekable: bool,
}

impl MessageDocument {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            seekable: envelope.is_seekable(),
        };
        let env_ns = envelope.version.namespace().map(str::to_string);

        let root = doc.push(NodeKind::Root, None, String::new(), String::new(), None, false);
        let env = doc.push_element(root, env_ns.clone(), "Envelope", false);

        let header = doc.push_element(env, env_ns.clone(), "Header", false);
        if let Some(to) = envelope.to() {
            doc.push_text_element(header, ADDRESSING_NAMESPACE, "To", to.as_str());
        }
        if let Some(action) = envelope.action() {
            doc.push_text_element(header, ADDRESSING_NAMESPACE, "Action", action);
        }
        for h in envelope.headers() {
            doc.push_text_element(header, &h.namespace, &h.name, &h.value);
        }

        let body = doc.push_element(env, env_ns, "Body", false);
        if let Some(content) = envelope.body() {
            doc.push_content(body, content, true);
        }
        doc
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the body region may be navigated.
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    fn push(
        &mut self,
        kind: NodeKind,
        namespace: Option<String>,
        local_name: String,
        value: String,
        parent: Option<NodeId>,
        in_body: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            namespace,
            local_name,
            value,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
            in_body,
        });
        if let Some(p) = parent {
            match kind {
                NodeKind::Attribute => self.nodes[p.index()].attributes.push(id),
                _ => self.nodes[p.index()].children.push(id),
            }
        }
        id
    }

    fn push_element(
        &mut self,
        parent: NodeId,
        namespace: Option<String>,
        name: &str,
        in_body: bool,
    ) -> NodeId {
        self.push(
            NodeKind::Element,
            namespace,
            name.to_string(),
            String::new(),
            Some(parent),
            in_body,
        )
    }

    fn push_text_element(&mut self, parent: NodeId, namespace: &str, name: &str, text: &str) {
        let ns = (!namespace.is_empty()).then(|| namespace.to_string());
        let el = self.push_element(parent, ns, name, false);
        if !text.is_empty() {
            self.push(
                NodeKind::Text,
                None,
                String::new(),
                text.to_string(),
                Some(el),
                false,
            );
        }
    }

    fn push_content(&mut self, parent: NodeId, element: &Element, in_body: bool) {
        let el = self.push_element(parent, element.namespace.clone(), &element.name, in_body);
        for attr in &element.attributes {
            self.push(
                NodeKind::Attribute,
                attr.namespace.clone(),
                attr.name.clone(),
                attr.value.clone(),
                Some(el),
                in_body,
            );
        }
        for child in &element.children {
            match child {
                Content::Element(e) => self.push_content(el, e, in_body),
                Content::Text(t) => {
                    self.push(
                        NodeKind::Text,
                        None,
                        String::new(),
                        t.clone(),
                        Some(el),
                        in_body,
                    );
                }
            }
        }
    }
}
