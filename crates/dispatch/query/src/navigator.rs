//! Seekable navigator over a [`MessageDocument`].
//!
//! The navigator's position is a [`NodeId`], so saving and restoring the
//! cursor during evaluation is a copy, never a clone of the cursor state.
//! Every node the evaluator reaches through the navigator is charged against
//! a node quota and checked against the document's body-access rule.

use crate::document::{MessageDocument, Node, NodeId, NodeKind};
use crate::error::{ProcessingErrorKind, QueryProcessingError, Result};

pub struct MessageNavigator<'d> {
    document: &'d MessageDocument,
    position: NodeId,
    quota: usize,
    remaining: usize,
}

impl<'d> MessageNavigator<'d> {
    pub fn new(document: &'d MessageDocument, node_quota: usize) -> Self {
        Self {
            document,
            position: NodeId::ROOT,
            quota: node_quota,
            remaining: node_quota,
        }
    }

    pub fn document(&self) -> &'d MessageDocument {
        self.document
    }

    /// Current position marker.
    pub fn position(&self) -> NodeId {
        self.position
    }

    /// Restore a previously saved position marker.
    pub fn set_position(&mut self, position: NodeId) -> Result<()> {
        self.node(position)?;
        self.position = position;
        Ok(())
    }

    /// Nodes visited so far in this evaluation.
    pub fn nodes_visited(&self) -> usize {
        self.quota - self.remaining
    }

    pub fn kind(&self, id: NodeId) -> Result<NodeKind> {
        Ok(self.node(id)?.kind)
    }

    pub fn local_name(&self, id: NodeId) -> Result<&'d str> {
        Ok(self.node(id)?.local_name.as_str())
    }

    pub fn namespace(&self, id: NodeId) -> Result<Option<&'d str>> {
        Ok(self.node(id)?.namespace.as_deref())
    }

    pub fn parent(&mut self, id: NodeId) -> Result<Option<NodeId>> {
        match self.node(id)?.parent {
            Some(p) => Ok(Some(self.visit(p)?)),
            None => Ok(None),
        }
    }

    pub fn children(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        let children = &self.node(id)?.children;
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            out.push(self.visit(*child)?);
        }
        Ok(out)
    }

    pub fn attributes(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        let attributes = &self.node(id)?.attributes;
        let mut out = Vec::with_capacity(attributes.len());
        for attr in attributes {
            out.push(self.visit(*attr)?);
        }
        Ok(out)
    }

    /// All descendants of `id` in document order (attributes excluded).
    pub fn descendants(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.node(id)?.children.iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            let next = self.visit(next)?;
            out.push(next);
            pending.extend(self.node(next)?.children.iter().rev().copied());
        }
        Ok(out)
    }

    /// XPath string-value of a node.
    pub fn string_value(&mut self, id: NodeId) -> Result<String> {
        let node = self.node(id)?;
        match node.kind {
            NodeKind::Attribute | NodeKind::Text => {
                self.check_body_access(node)?;
                Ok(node.value.clone())
            }
            NodeKind::Root | NodeKind::Element => {
                let mut out = String::new();
                for d in self.descendants(id)? {
                    let n = self.node(d)?;
                    if n.kind == NodeKind::Text {
                        out.push_str(&n.value);
                    }
                }
                Ok(out)
            }
        }
    }

    fn visit(&mut self, id: NodeId) -> Result<NodeId> {
        let node = self.node(id)?;
        self.check_body_access(node)?;
        if self.remaining == 0 {
            return Err(QueryProcessingError::new(
                ProcessingErrorKind::NodeCountExceeded,
                format!("evaluation exceeded node quota of {}", self.quota),
            ));
        }
        self.remaining -= 1;
        Ok(id)
    }

    fn check_body_access(&self, node: &Node) -> Result<()> {
        if node.in_body && !self.document.is_seekable() {
            return Err(QueryProcessingError::new(
                ProcessingErrorKind::InvalidBodyAccess,
                "expression reads the body of a non-seekable envelope",
            ));
        }
        Ok(())
    }

    fn node(&self, id: NodeId) -> Result<&'d Node> {
        self.document.node(id).ok_or_else(|| {
            QueryProcessingError::new(
                ProcessingErrorKind::InvalidNavigatorPosition,
                format!("position {} is outside the document", id.index()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_dispatch_types::{Element, Envelope, EnvelopeVersion};

    fn body() -> Element {
        Element::new("Order")
            .with_child(Element::new("Line").with_text("a"))
            .with_child(Element::new("Line").with_text("b"))
    }

    #[test]
    fn position_round_trip_and_invalid_marker() {
        let env = Envelope::new(EnvelopeVersion::None).with_body(body());
        let doc = MessageDocument::from_envelope(&env);
        let mut nav = MessageNavigator::new(&doc, 100);

        let saved = nav.position();
        nav.set_position(NodeId::from_index(3)).unwrap();
        assert_eq!(nav.position(), NodeId::from_index(3));
        nav.set_position(saved).unwrap();
        assert_eq!(nav.position(), NodeId::ROOT);

        let err = nav.set_position(NodeId::from_index(10_000)).unwrap_err();
        assert_eq!(err.kind, ProcessingErrorKind::InvalidNavigatorPosition);
    }

    #[test]
    fn string_value_of_root_concatenates_text() {
        let env = Envelope::new(EnvelopeVersion::None).with_body(body());
        let doc = MessageDocument::from_envelope(&env);
        let mut nav = MessageNavigator::new(&doc, 100);
        assert_eq!(nav.string_value(NodeId::ROOT).unwrap(), "ab");
    }

    #[test]
    fn streamed_body_is_forbidden() {
        let env = Envelope::new(EnvelopeVersion::None).with_streamed_body(body());
        let doc = MessageDocument::from_envelope(&env);
        let mut nav = MessageNavigator::new(&doc, 100);
        let err = nav.descendants(NodeId::ROOT).unwrap_err();
        assert_eq!(err.kind, ProcessingErrorKind::InvalidBodyAccess);
    }

    #[test]
    fn quota_is_enforced() {
        let env = Envelope::new(EnvelopeVersion::None).with_body(body());
        let doc = MessageDocument::from_envelope(&env);
        let mut nav = MessageNavigator::new(&doc, 3);
        let err = nav.descendants(NodeId::ROOT).unwrap_err();
        assert_eq!(err.kind, ProcessingErrorKind::NodeCountExceeded);
        assert_eq!(nav.nodes_visited(), 3);
    }
}
