//! Runtime value model and XPath 1.0 coercions.

use crate::document::NodeId;
use crate::error::Result;
use crate::navigator::MessageNavigator;

/// A set of document nodes, kept sorted in document order without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet(Vec<NodeId>);

impl NodeSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_nodes(mut nodes: Vec<NodeId>) -> Self {
        nodes.sort_unstable();
        nodes.dedup();
        Self(nodes)
    }

    pub fn single(node: NodeId) -> Self {
        Self(vec![node])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First node in document order.
    pub fn first(&self) -> Option<NodeId> {
        self.0.first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }

    pub fn union(mut self, other: NodeSet) -> Self {
        self.0.extend(other.0);
        Self::from_nodes(self.0)
    }

    pub fn into_vec(self) -> Vec<NodeId> {
        self.0
    }
}

/// Kind tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    Number,
    String,
    NodeSet,
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Number(f64),
    String(String),
    NodeSet(NodeSet),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::NodeSet(_) => ValueKind::NodeSet,
        }
    }

    /// Number payload of a value already known to be numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// XPath `boolean()` coercion. Needs no navigation.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::NodeSet(set) => !set.is_empty(),
        }
    }

    /// XPath `number()` coercion.
    pub fn to_number(&self, nav: &mut MessageNavigator<'_>) -> Result<f64> {
        Ok(match self {
            Value::Boolean(b) => bool_to_number(*b),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::NodeSet(_) => string_to_number(&self.to_string_value(nav)?),
        })
    }

    /// XPath `string()` coercion. A node-set yields the string-value of its
    /// first node in document order, or the empty string.
    pub fn to_string_value(&self, nav: &mut MessageNavigator<'_>) -> Result<String> {
        Ok(match self {
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::NodeSet(set) => match set.first() {
                Some(node) => nav.string_value(node)?,
                None => String::new(),
            },
        })
    }
}

pub fn bool_to_number(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// XPath string-to-number: optional whitespace, optional minus, digits with
/// at most one decimal point. Anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));
    let digits = t.strip_prefix('-').unwrap_or(t);
    if digits.is_empty() || digits == "." {
        return f64::NAN;
    }
    let mut dots = 0;
    for c in digits.chars() {
        match c {
            '0'..='9' => {}
            '.' => dots += 1,
            _ => return f64::NAN,
        }
    }
    if dots > 1 {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// XPath number-to-string.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::NodeSet(NodeSet::new()).truthy());
        assert!(Value::NodeSet(NodeSet::single(NodeId::ROOT)).truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(Value::Number(-2.5).truthy());
        assert!(Value::String("x".into()).truthy());
        assert!(!Value::String(String::new()).truthy());
    }

    #[test]
    fn string_number_conversion() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number("-1.5"), -1.5);
        assert_eq!(string_to_number(".5"), 0.5);
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("1.2.3").is_nan());
        assert!(string_to_number("").is_nan());
        assert!(string_to_number("+1").is_nan());
    }

    #[test]
    fn number_string_conversion() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(2.5), "2.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn node_sets_are_ordered_and_unique() {
        let a = NodeSet::from_nodes(vec![NodeId::from_index(4), NodeId::from_index(2)]);
        let b = NodeSet::from_nodes(vec![NodeId::from_index(2), NodeId::from_index(1)]);
        let u = a.union(b);
        let ids: Vec<usize> = u.iter().map(|n| n.index()).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }
}
