//! Expression evaluator with XPath 1.0 semantics.
//!
//! The context node is the navigator's current position. Predicates move the
//! navigator to each candidate and restore the saved marker afterwards.

use crate::document::{NodeId, NodeKind};
use crate::error::{ProcessingErrorKind, QueryProcessingError, Result};
use crate::expr::{Axis, BinaryOp, CompiledExpression, Expr, Function, LocationPath, NodeTest, Step};
use crate::navigator::MessageNavigator;
use crate::value::{number_to_string, NodeSet, Value};

#[derive(Debug, Clone, Copy)]
struct Context {
    position: usize,
    size: usize,
}

impl CompiledExpression {
    /// Evaluate against the navigator's current position.
    pub fn evaluate(&self, nav: &mut MessageNavigator<'_>) -> Result<Value> {
        let mut evaluator = Evaluator { nav };
        evaluator.eval(
            self.root(),
            Context {
                position: 1,
                size: 1,
            },
        )
    }
}

struct Evaluator<'a, 'd> {
    nav: &'a mut MessageNavigator<'d>,
}

impl<'a, 'd> Evaluator<'a, 'd> {
    fn eval(&mut self, expr: &Expr, ctx: Context) -> Result<Value> {
        match expr {
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Path(path) => self.eval_path(path).map(Value::NodeSet),
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let set = match self.eval(primary, ctx)? {
                    Value::NodeSet(set) => set,
                    other => {
                        return Err(QueryProcessingError::type_mismatch(format!(
                            "cannot filter a {:?} value",
                            other.kind()
                        )))
                    }
                };
                let mut nodes = set.into_vec();
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                let mut current = NodeSet::from_nodes(nodes);
                for step in steps {
                    current = self.apply_step(&current, step)?;
                }
                Ok(Value::NodeSet(current))
            }
            Expr::Negate(inner) => {
                let value = self.eval(inner, ctx)?;
                Ok(Value::Number(-value.to_number(self.nav)?))
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, ctx),
            Expr::Call { function, args } => self.eval_call(*function, args, ctx),
        }
    }

    fn eval_path(&mut self, path: &LocationPath) -> Result<NodeSet> {
        let start = if path.absolute {
            NodeId::ROOT
        } else {
            self.nav.position()
        };
        let mut current = NodeSet::single(start);
        for step in &path.steps {
            current = self.apply_step(&current, step)?;
        }
        Ok(current)
    }

    fn apply_step(&mut self, input: &NodeSet, step: &Step) -> Result<NodeSet> {
        let mut out = Vec::new();
        for node in input.iter() {
            let candidates = match step.axis {
                Axis::Child => self.nav.children(node)?,
                Axis::Descendant => self.nav.descendants(node)?,
                Axis::DescendantOrSelf => {
                    let mut all = vec![node];
                    all.extend(self.nav.descendants(node)?);
                    all
                }
                Axis::SelfAxis => vec![node],
                Axis::Parent => self.nav.parent(node)?.into_iter().collect(),
                Axis::Attribute => self.nav.attributes(node)?,
            };
            let mut selected = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                if self.node_test(candidate, &step.test, step.axis)? {
                    selected.push(candidate);
                }
            }
            for predicate in &step.predicates {
                selected = self.filter(selected, predicate)?;
            }
            out.extend(selected);
        }
        Ok(NodeSet::from_nodes(out))
    }

    fn node_test(&self, node: NodeId, test: &NodeTest, axis: Axis) -> Result<bool> {
        let principal = match axis {
            Axis::Attribute => NodeKind::Attribute,
            _ => NodeKind::Element,
        };
        let kind = self.nav.kind(node)?;
        let node_ns = self.nav.namespace(node)?;
        Ok(match test {
            NodeTest::AnyNode => true,
            NodeTest::Text => kind == NodeKind::Text,
            NodeTest::Comment | NodeTest::ProcessingInstruction => {
                return Err(QueryProcessingError::new(
                    ProcessingErrorKind::UnsupportedNodeKind,
                    format!("{:?} nodes do not occur in a message document", test),
                ))
            }
            NodeTest::Wildcard { namespace } => {
                kind == principal && namespace.as_deref().map_or(true, |ns| node_ns == Some(ns))
            }
            NodeTest::Name { namespace, local } => {
                kind == principal
                    && self.nav.local_name(node)? == local
                    && node_ns == namespace.as_deref()
            }
        })
    }

    /// Apply one predicate to nodes in axis order.
    fn filter(&mut self, nodes: Vec<NodeId>, predicate: &Expr) -> Result<Vec<NodeId>> {
        let size = nodes.len();
        let saved = self.nav.position();
        let mut kept = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            self.nav.set_position(node)?;
            let ctx = Context {
                position: i + 1,
                size,
            };
            let value = self.eval(predicate, ctx);
            let keep = match value {
                Ok(Value::Number(n)) => n == (i + 1) as f64,
                Ok(other) => other.truthy(),
                Err(e) => {
                    self.nav.set_position(saved)?;
                    return Err(e);
                }
            };
            if keep {
                kept.push(node);
            }
        }
        self.nav.set_position(saved)?;
        Ok(kept)
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, ctx: Context) -> Result<Value> {
        match op {
            BinaryOp::Or => {
                if self.eval(left, ctx)?.truthy() {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.eval(right, ctx)?.truthy()))
            }
            BinaryOp::And => {
                if !self.eval(left, ctx)?.truthy() {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.eval(right, ctx)?.truthy()))
            }
            BinaryOp::Union => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                match (l, r) {
                    (Value::NodeSet(a), Value::NodeSet(b)) => Ok(Value::NodeSet(a.union(b))),
                    (a, b) => Err(QueryProcessingError::type_mismatch(format!(
                        "union of {:?} and {:?}",
                        a.kind(),
                        b.kind()
                    ))),
                }
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let l = self.eval(left, ctx)?.to_number(self.nav)?;
                let r = self.eval(right, ctx)?.to_number(self.nav)?;
                Ok(Value::Number(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    _ => l % r,
                }))
            }
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                self.compare(op, &l, &r).map(Value::Boolean)
            }
        }
    }

    fn compare(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<bool> {
        match (left, right) {
            (Value::NodeSet(a), Value::NodeSet(b)) => {
                let rights = self.string_values(b)?;
                for l in self.string_values(a)? {
                    for r in &rights {
                        if self.compare_atomic(op, &Value::String(l.clone()), &Value::String(r.clone()))? {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            (Value::NodeSet(a), Value::Boolean(_)) => {
                self.compare_atomic(op, &Value::Boolean(!a.is_empty()), right)
            }
            (Value::Boolean(_), Value::NodeSet(b)) => {
                self.compare_atomic(op, left, &Value::Boolean(!b.is_empty()))
            }
            (Value::NodeSet(a), _) => {
                for s in self.string_values(a)? {
                    if self.compare_atomic(op, &Value::String(s), right)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            (_, Value::NodeSet(b)) => {
                for s in self.string_values(b)? {
                    if self.compare_atomic(op, left, &Value::String(s))? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => self.compare_atomic(op, left, right),
        }
    }

    fn compare_atomic(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<bool> {
        match op {
            BinaryOp::Eq | BinaryOp::NotEq => {
                let equal = match (left, right) {
                    (Value::Boolean(_), _) | (_, Value::Boolean(_)) => left.truthy() == right.truthy(),
                    (Value::Number(_), _) | (_, Value::Number(_)) => {
                        left.to_number(self.nav)? == right.to_number(self.nav)?
                    }
                    _ => left.to_string_value(self.nav)? == right.to_string_value(self.nav)?,
                };
                Ok(equal == (op == BinaryOp::Eq))
            }
            _ => {
                let l = left.to_number(self.nav)?;
                let r = right.to_number(self.nav)?;
                Ok(match op {
                    BinaryOp::Lt => l < r,
                    BinaryOp::LtEq => l <= r,
                    BinaryOp::Gt => l > r,
                    _ => l >= r,
                })
            }
        }
    }

    fn string_values(&mut self, set: &NodeSet) -> Result<Vec<String>> {
        set.iter().map(|n| self.nav.string_value(n)).collect()
    }

    fn node_set_arg(&mut self, args: &[Expr], ctx: Context) -> Result<NodeSet> {
        match args.first() {
            None => Ok(NodeSet::single(self.nav.position())),
            Some(arg) => match self.eval(arg, ctx)? {
                Value::NodeSet(set) => Ok(set),
                other => Err(QueryProcessingError::type_mismatch(format!(
                    "expected a node-set argument, found {:?}",
                    other.kind()
                ))),
            },
        }
    }

    fn string_arg(&mut self, args: &[Expr], index: usize, ctx: Context) -> Result<String> {
        match args.get(index) {
            None => {
                let here = self.nav.position();
                self.nav.string_value(here)
            }
            Some(arg) => {
                let value = self.eval(arg, ctx)?;
                value.to_string_value(self.nav)
            }
        }
    }

    fn eval_call(&mut self, function: Function, args: &[Expr], ctx: Context) -> Result<Value> {
        Ok(match function {
            Function::Last => Value::Number(ctx.size as f64),
            Function::Position => Value::Number(ctx.position as f64),
            Function::True => Value::Boolean(true),
            Function::False => Value::Boolean(false),
            Function::Count => Value::Number(self.node_set_arg(args, ctx)?.len() as f64),
            Function::LocalName | Function::Name => {
                let set = self.node_set_arg(args, ctx)?;
                match set.first() {
                    Some(node) => Value::String(self.nav.local_name(node)?.to_string()),
                    None => Value::String(String::new()),
                }
            }
            Function::NamespaceUri => {
                let set = self.node_set_arg(args, ctx)?;
                let ns = match set.first() {
                    Some(node) => self.nav.namespace(node)?.unwrap_or_default().to_string(),
                    None => String::new(),
                };
                Value::String(ns)
            }
            Function::String => Value::String(self.string_arg(args, 0, ctx)?),
            Function::Concat => {
                let mut out = String::new();
                for i in 0..args.len() {
                    out.push_str(&self.string_arg(args, i, ctx)?);
                }
                Value::String(out)
            }
            Function::StartsWith => {
                let s = self.string_arg(args, 0, ctx)?;
                let prefix = self.string_arg(args, 1, ctx)?;
                Value::Boolean(s.starts_with(&prefix))
            }
            Function::Contains => {
                let s = self.string_arg(args, 0, ctx)?;
                let needle = self.string_arg(args, 1, ctx)?;
                Value::Boolean(s.contains(&needle))
            }
            Function::StringLength => {
                Value::Number(self.string_arg(args, 0, ctx)?.chars().count() as f64)
            }
            Function::NormalizeSpace => {
                let s = self.string_arg(args, 0, ctx)?;
                Value::String(s.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            Function::Boolean => Value::Boolean(self.eval(&args[0], ctx)?.truthy()),
            Function::Not => Value::Boolean(!self.eval(&args[0], ctx)?.truthy()),
            Function::Number => match args.first() {
                None => {
                    let here = self.nav.position();
                    let s = self.nav.string_value(here)?;
                    Value::Number(Value::String(s).to_number(self.nav)?)
                }
                Some(arg) => {
                    let value = self.eval(arg, ctx)?;
                    Value::Number(value.to_number(self.nav)?)
                }
            },
            Function::Sum => {
                let set = self.node_set_arg(args, ctx)?;
                let mut total = 0.0;
                for s in self.string_values(&set)? {
                    total += Value::String(s).to_number(self.nav)?;
                }
                Value::Number(total)
            }
        })
    }
}

/// Render a value for diagnostics.
pub fn describe(value: &Value) -> String {
    match value {
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => format!("{:?}", s),
        Value::NodeSet(set) => format!("node-set({})", set.len()),
    }
}
