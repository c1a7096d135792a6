//! Expression compiler: lexer and recursive-descent parser for the
//! structural XPath subset evaluated by the query VM.

use std::collections::HashMap;

use maple_dispatch_types::ADDRESSING_NAMESPACE;

use crate::error::{CompileErrorKind, QueryCompileError};
use crate::expr::{Axis, BinaryOp, CompiledExpression, Expr, Function, LocationPath, NodeTest, Step};

type CompileResult<T> = std::result::Result<T, QueryCompileError>;

/// Prefix → namespace URI bindings used while compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMap {
    bindings: HashMap<String, String>,
}

impl Default for NamespaceMap {
    /// Standard prefixes: `s11`, `s12` and `wsa`.
    fn default() -> Self {
        Self::empty()
            .with_prefix("s11", "http://schemas.xmlsoap.org/soap/envelope/")
            .with_prefix("s12", "http://www.w3.org/2003/05/soap-envelope")
            .with_prefix("wsa", ADDRESSING_NAMESPACE)
    }
}

impl NamespaceMap {
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.bindings.insert(prefix.into(), uri.into());
        self
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }
}

/// Compile an expression.
pub fn compile(
    source: &str,
    namespaces: &NamespaceMap,
    max_predicate_depth: usize,
) -> CompileResult<CompiledExpression> {
    if source.trim().is_empty() {
        return Err(QueryCompileError::new(
            CompileErrorKind::EmptyExpression,
            0,
            "expression is empty",
        ));
    }
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        index: 0,
        end: source.len(),
        namespaces,
        max_depth: max_predicate_depth,
        depth: 0,
        nesting: 0,
    };
    let root = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        let kind = match token.tok {
            Tok::RParen | Tok::RBracket => CompileErrorKind::MismatchedGrouping,
            _ => CompileErrorKind::UnexpectedToken,
        };
        return Err(QueryCompileError::new(
            kind,
            token.pos,
            format!("unexpected {:?} after expression", token.tok),
        ));
    }
    Ok(CompiledExpression::new(source, root))
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Slash,
    DoubleSlash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Pipe,
    Plus,
    Minus,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Multiply,
    And,
    Or,
    Div,
    Mod,
    /// `*` in name-test position.
    Star,
    Literal(String),
    Number(f64),
    /// NCName or QName; `local == "*"` for `prefix:*`.
    Name {
        prefix: Option<String>,
        local: String,
    },
}

impl Tok {
    /// Whether an operator may follow this token (XPath 1.0 §3.7 rule).
    fn allows_operator(&self) -> bool {
        !matches!(
            self,
            Tok::At
                | Tok::ColonColon
                | Tok::LParen
                | Tok::LBracket
                | Tok::Comma
                | Tok::And
                | Tok::Or
                | Tok::Mod
                | Tok::Div
                | Tok::Multiply
                | Tok::Slash
                | Tok::DoubleSlash
                | Tok::Pipe
                | Tok::Plus
                | Tok::Minus
                | Tok::Eq
                | Tok::NotEq
                | Tok::Lt
                | Tok::LtEq
                | Tok::Gt
                | Tok::GtEq
        )
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    pos: usize,
}

struct Lexer<'s> {
    chars: Vec<(usize, char)>,
    index: usize,
    source: &'s str,
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl<'s> Lexer<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            chars: source.char_indices().collect(),
            index: 0,
            source,
        }
    }

    fn peek_char(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|(p, _)| *p)
            .unwrap_or(self.source.len())
    }

    fn tokenize(mut self) -> CompileResult<Vec<Token>> {
        let mut tokens: Vec<Token> = Vec::new();
        while let Some(c) = self.peek_char(0) {
            if c.is_whitespace() {
                self.index += 1;
                continue;
            }
            let pos = self.offset();
            let operator_ok = tokens.last().map(|t| t.tok.allows_operator()).unwrap_or(false);
            let tok = match c {
                '/' if self.peek_char(1) == Some('/') => self.take(2, Tok::DoubleSlash),
                '/' => self.take(1, Tok::Slash),
                '(' => self.take(1, Tok::LParen),
                ')' => self.take(1, Tok::RParen),
                '[' => self.take(1, Tok::LBracket),
                ']' => self.take(1, Tok::RBracket),
                '@' => self.take(1, Tok::At),
                ',' => self.take(1, Tok::Comma),
                '|' => self.take(1, Tok::Pipe),
                '+' => self.take(1, Tok::Plus),
                '-' => self.take(1, Tok::Minus),
                '=' => self.take(1, Tok::Eq),
                ':' if self.peek_char(1) == Some(':') => self.take(2, Tok::ColonColon),
                '!' if self.peek_char(1) == Some('=') => self.take(2, Tok::NotEq),
                '<' if self.peek_char(1) == Some('=') => self.take(2, Tok::LtEq),
                '<' => self.take(1, Tok::Lt),
                '>' if self.peek_char(1) == Some('=') => self.take(2, Tok::GtEq),
                '>' => self.take(1, Tok::Gt),
                '*' if operator_ok => self.take(1, Tok::Multiply),
                '*' => self.take(1, Tok::Star),
                '.' if self.peek_char(1) == Some('.') => self.take(2, Tok::DotDot),
                '.' if self.peek_char(1).is_some_and(|d| d.is_ascii_digit()) => {
                    self.number(pos)?
                }
                '.' => self.take(1, Tok::Dot),
                '"' | '\'' => self.literal(c, pos)?,
                d if d.is_ascii_digit() => self.number(pos)?,
                n if is_name_start(n) => self.name(operator_ok),
                other => {
                    return Err(QueryCompileError::new(
                        CompileErrorKind::UnexpectedToken,
                        pos,
                        format!("unexpected character '{}'", other),
                    ))
                }
            };
            tokens.push(Token { tok, pos });
        }
        Ok(tokens)
    }

    fn take(&mut self, width: usize, tok: Tok) -> Tok {
        self.index += width;
        tok
    }

    fn literal(&mut self, quote: char, pos: usize) -> CompileResult<Tok> {
        self.index += 1;
        let mut text = String::new();
        loop {
            match self.peek_char(0) {
                Some(c) if c == quote => {
                    self.index += 1;
                    return Ok(Tok::Literal(text));
                }
                Some(c) => {
                    text.push(c);
                    self.index += 1;
                }
                None => {
                    return Err(QueryCompileError::new(
                        CompileErrorKind::InvalidLiteral,
                        pos,
                        "unterminated string literal",
                    ))
                }
            }
        }
    }

    fn number(&mut self, pos: usize) -> CompileResult<Tok> {
        let mut text = String::new();
        let mut seen_dot = false;
        while let Some(c) = self.peek_char(0) {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' && !seen_dot && self.peek_char(1) != Some('.') {
                seen_dot = true;
                text.push(c);
            } else {
                break;
            }
            self.index += 1;
        }
        if self.peek_char(0).is_some_and(|c| c == '.' || is_name_start(c)) {
            return Err(QueryCompileError::new(
                CompileErrorKind::InvalidNumber,
                pos,
                format!("malformed number starting with '{}'", text),
            ));
        }
        text.parse::<f64>().map(Tok::Number).map_err(|_| {
            QueryCompileError::new(
                CompileErrorKind::InvalidNumber,
                pos,
                format!("malformed number '{}'", text),
            )
        })
    }

    fn ncname(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek_char(0) {
            if !is_name_char(c) {
                break;
            }
            name.push(c);
            self.index += 1;
        }
        name
    }

    fn name(&mut self, operator_ok: bool) -> Tok {
        let first = self.ncname();
        if operator_ok {
            match first.as_str() {
                "and" => return Tok::And,
                "or" => return Tok::Or,
                "div" => return Tok::Div,
                "mod" => return Tok::Mod,
                _ => {}
            }
        }
        if self.peek_char(0) == Some(':') && self.peek_char(1) != Some(':') {
            match self.peek_char(1) {
                Some('*') => {
                    self.index += 2;
                    return Tok::Name {
                        prefix: Some(first),
                        local: "*".to_string(),
                    };
                }
                Some(c) if is_name_start(c) => {
                    self.index += 1;
                    let local = self.ncname();
                    return Tok::Name {
                        prefix: Some(first),
                        local,
                    };
                }
                _ => {}
            }
        }
        Tok::Name {
            prefix: None,
            local: first,
        }
    }
}

struct Parser<'n> {
    tokens: Vec<Token>,
    index: usize,
    end: usize,
    namespaces: &'n NamespaceMap,
    max_depth: usize,
    depth: usize,
    nesting: usize,
}

/// Deepest grouping, negation or call nesting the compiler accepts.
const MAX_EXPRESSION_NESTING: usize = 64;

const NODE_TYPES: [&str; 4] = ["node", "text", "comment", "processing-instruction"];

impl<'n> Parser<'n> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek_tok(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.index + ahead).map(|t| &t.tok)
    }

    fn position(&self) -> usize {
        self.peek().map(|t| t.pos).unwrap_or(self.end)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek_tok(0) == Some(tok) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, what: &str) -> QueryCompileError {
        match self.peek() {
            Some(token) => QueryCompileError::new(
                CompileErrorKind::UnexpectedToken,
                token.pos,
                format!("expected {}, found {:?}", what, token.tok),
            ),
            None => QueryCompileError::new(
                CompileErrorKind::UnexpectedEnd,
                self.end,
                format!("expected {}, found end of expression", what),
            ),
        }
    }

    fn expect_close(&mut self, close: Tok) -> CompileResult<()> {
        if self.eat(&close) {
            return Ok(());
        }
        Err(QueryCompileError::new(
            CompileErrorKind::MismatchedGrouping,
            self.position(),
            format!("expected {:?}", close),
        ))
    }

    /// Track one level of grouping, negation or call nesting.
    fn nest(&mut self, pos: usize) -> CompileResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_EXPRESSION_NESTING {
            return Err(QueryCompileError::new(
                CompileErrorKind::ExcessiveExpressionNesting,
                pos,
                format!("expression nested deeper than {}", MAX_EXPRESSION_NESTING),
            ));
        }
        Ok(())
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_or(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let right = self.parse_and()?;
            left = Self::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&Tok::And) {
            let right = self.parse_equality()?;
            left = Self::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_tok(0) {
                Some(Tok::Eq) => BinaryOp::Eq,
                Some(Tok::NotEq) => BinaryOp::NotEq,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.parse_relational()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_relational(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_tok(0) {
                Some(Tok::Lt) => BinaryOp::Lt,
                Some(Tok::LtEq) => BinaryOp::LtEq,
                Some(Tok::Gt) => BinaryOp::Gt,
                Some(Tok::GtEq) => BinaryOp::GtEq,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_tok(0) {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_tok(0) {
                Some(Tok::Multiply) => BinaryOp::Mul,
                Some(Tok::Div) => BinaryOp::Div,
                Some(Tok::Mod) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let pos = self.position();
        if self.eat(&Tok::Minus) {
            self.nest(pos)?;
            let inner = self.parse_unary()?;
            self.nesting -= 1;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_path_expr()?;
        while self.eat(&Tok::Pipe) {
            let right = self.parse_path_expr()?;
            left = Self::binary(BinaryOp::Union, left, right);
        }
        Ok(left)
    }

    fn starts_primary(&self) -> bool {
        match self.peek_tok(0) {
            Some(Tok::Literal(_)) | Some(Tok::Number(_)) | Some(Tok::LParen) => true,
            Some(Tok::Name { prefix, local }) => {
                self.peek_tok(1) == Some(&Tok::LParen)
                    && !(prefix.is_none() && NODE_TYPES.contains(&local.as_str()))
            }
            _ => false,
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek_tok(0),
            Some(Tok::Dot)
                | Some(Tok::DotDot)
                | Some(Tok::At)
                | Some(Tok::Star)
                | Some(Tok::Name { .. })
        )
    }

    fn parse_path_expr(&mut self) -> CompileResult<Expr> {
        if !self.starts_primary() {
            return self.parse_location_path().map(Expr::Path);
        }
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let mut steps = Vec::new();
        loop {
            if self.eat(&Tok::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&Tok::DoubleSlash) {
                steps.push(descendant_or_self());
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }
        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("an expression"));
        };
        match token.tok {
            Tok::Literal(text) => {
                self.index += 1;
                Ok(Expr::Literal(text))
            }
            Tok::Number(n) => {
                self.index += 1;
                Ok(Expr::Number(n))
            }
            Tok::LParen => {
                self.index += 1;
                self.nest(token.pos)?;
                let inner = self.parse_or()?;
                self.expect_close(Tok::RParen)?;
                self.nesting -= 1;
                Ok(inner)
            }
            Tok::Name { prefix, local } => self.parse_call(prefix, local, token.pos),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_call(
        &mut self,
        prefix: Option<String>,
        local: String,
        pos: usize,
    ) -> CompileResult<Expr> {
        let function = match prefix {
            None => Function::from_name(&local),
            Some(_) => None,
        }
        .ok_or_else(|| {
            QueryCompileError::new(
                CompileErrorKind::UnsupportedFunction,
                pos,
                format!("function '{}' is not supported", local),
            )
        })?;
        // name and '('
        self.index += 2;
        self.nest(pos)?;
        let mut args = Vec::new();
        if !self.eat(&Tok::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&Tok::Comma) {
                    continue;
                }
                self.expect_close(Tok::RParen)?;
                break;
            }
        }
        self.nesting -= 1;
        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|m| args.len() > m) {
            return Err(QueryCompileError::new(
                CompileErrorKind::InvalidArgumentCount,
                pos,
                format!("'{}' called with {} arguments", local, args.len()),
            ));
        }
        Ok(Expr::Call { function, args })
    }

    fn parse_location_path(&mut self) -> CompileResult<LocationPath> {
        let mut steps = Vec::new();
        let absolute = if self.eat(&Tok::Slash) {
            if !self.starts_step() {
                return Ok(LocationPath {
                    absolute: true,
                    steps,
                });
            }
            true
        } else if self.eat(&Tok::DoubleSlash) {
            steps.push(descendant_or_self());
            true
        } else {
            false
        };
        steps.push(self.parse_step()?);
        loop {
            if self.eat(&Tok::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&Tok::DoubleSlash) {
                steps.push(descendant_or_self());
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }
        Ok(LocationPath { absolute, steps })
    }

    fn parse_step(&mut self) -> CompileResult<Step> {
        if self.eat(&Tok::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Tok::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        let axis = if self.eat(&Tok::At) {
            Axis::Attribute
        } else if self.peek_tok(1) == Some(&Tok::ColonColon) {
            self.parse_axis()?
        } else {
            Axis::Child
        };
        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_axis(&mut self) -> CompileResult<Axis> {
        let pos = self.position();
        let name = match self.peek_tok(0) {
            Some(Tok::Name {
                prefix: None,
                local,
            }) => local.clone(),
            _ => return Err(self.unexpected("an axis name")),
        };
        let axis = Axis::from_name(&name).ok_or_else(|| {
            let message = if Axis::is_known_unsupported(&name) {
                format!("axis '{}' is not supported", name)
            } else {
                format!("unknown axis '{}'", name)
            };
            QueryCompileError::new(CompileErrorKind::UnsupportedAxis, pos, message)
        })?;
        self.index += 2;
        Ok(axis)
    }

    fn parse_node_test(&mut self) -> CompileResult<NodeTest> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("a node test"));
        };
        match token.tok {
            Tok::Star => {
                self.index += 1;
                Ok(NodeTest::Wildcard { namespace: None })
            }
            Tok::Name {
                prefix: None,
                local,
            } if NODE_TYPES.contains(&local.as_str())
                && self.peek_tok(1) == Some(&Tok::LParen) =>
            {
                self.index += 2;
                if local == "processing-instruction" {
                    if let Some(Tok::Literal(_)) = self.peek_tok(0) {
                        self.index += 1;
                    }
                }
                self.expect_close(Tok::RParen)?;
                Ok(match local.as_str() {
                    "node" => NodeTest::AnyNode,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => NodeTest::ProcessingInstruction,
                })
            }
            Tok::Name { prefix, local } => {
                self.index += 1;
                let namespace = match prefix {
                    Some(p) => Some(self.resolve(&p, token.pos)?),
                    None => None,
                };
                if local == "*" {
                    Ok(NodeTest::Wildcard { namespace })
                } else {
                    Ok(NodeTest::Name { namespace, local })
                }
            }
            _ => Err(self.unexpected("a node test")),
        }
    }

    fn resolve(&self, prefix: &str, pos: usize) -> CompileResult<String> {
        self.namespaces
            .resolve(prefix)
            .map(str::to_string)
            .ok_or_else(|| {
                QueryCompileError::new(
                    CompileErrorKind::UndefinedPrefix,
                    pos,
                    format!("namespace prefix '{}' is not bound", prefix),
                )
            })
    }

    fn parse_predicates(&mut self) -> CompileResult<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.peek_tok(0) == Some(&Tok::LBracket) {
            let pos = self.position();
            self.index += 1;
            self.depth += 1;
            if self.depth > self.max_depth {
                return Err(QueryCompileError::new(
                    CompileErrorKind::ExcessivePredicateNesting,
                    pos,
                    format!("predicates nested deeper than {}", self.max_depth),
                ));
            }
            predicates.push(self.parse_or()?);
            self.expect_close(Tok::RBracket)?;
            self.depth -= 1;
        }
        Ok(predicates)
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::AnyNode,
        predicates: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> CompileResult<CompiledExpression> {
        compile(source, &NamespaceMap::default(), 8)
    }

    fn kind_of(source: &str) -> CompileErrorKind {
        parse(source).unwrap_err().kind
    }

    #[test]
    fn parses_absolute_path_with_prefixes() {
        let compiled = parse("/s12:Envelope/s12:Header/wsa:Action").unwrap();
        let Expr::Path(path) = compiled.root() else {
            panic!("expected a path");
        };
        assert!(path.absolute);
        assert_eq!(path.steps.len(), 3);
        assert_eq!(
            path.steps[2].test,
            NodeTest::Name {
                namespace: Some(ADDRESSING_NAMESPACE.to_string()),
                local: "Action".to_string(),
            }
        );
    }

    #[test]
    fn star_and_names_disambiguate_as_operators() {
        let compiled = parse("2 * 3 div 4 mod 5").unwrap();
        assert!(matches!(
            compiled.root(),
            Expr::Binary {
                op: BinaryOp::Mod,
                ..
            }
        ));

        let path = parse("//*[@and]").unwrap();
        assert!(matches!(path.root(), Expr::Path(_)));
    }

    #[test]
    fn double_slash_expands_to_descendant_or_self() {
        let compiled = parse("//Order").unwrap();
        let Expr::Path(path) = compiled.root() else {
            panic!("expected a path");
        };
        assert_eq!(path.steps[0].axis, Axis::DescendantOrSelf);
        assert_eq!(path.steps.len(), 2);
    }

    #[test]
    fn filter_expression_with_trailing_path() {
        let compiled = parse("(//a | //b)[1]/c").unwrap();
        assert!(matches!(compiled.root(), Expr::Filter { .. }));
    }

    #[test]
    fn compile_error_taxonomy() {
        assert_eq!(kind_of("   "), CompileErrorKind::EmptyExpression);
        assert_eq!(kind_of("ancestor::x"), CompileErrorKind::UnsupportedAxis);
        assert_eq!(kind_of("lang('en')"), CompileErrorKind::UnsupportedFunction);
        assert_eq!(kind_of("count()"), CompileErrorKind::InvalidArgumentCount);
        assert_eq!(kind_of("'open"), CompileErrorKind::InvalidLiteral);
        assert_eq!(kind_of("12abc"), CompileErrorKind::InvalidNumber);
        assert_eq!(kind_of("(1 + 2"), CompileErrorKind::MismatchedGrouping);
        assert_eq!(kind_of("a[1"), CompileErrorKind::MismatchedGrouping);
        assert_eq!(kind_of("1 + 2)"), CompileErrorKind::MismatchedGrouping);
        assert_eq!(kind_of("foo:bar"), CompileErrorKind::UndefinedPrefix);
        assert_eq!(kind_of("1 +"), CompileErrorKind::UnexpectedEnd);
        assert_eq!(kind_of("1 2"), CompileErrorKind::UnexpectedToken);
    }

    #[test]
    fn predicate_nesting_is_bounded() {
        assert!(compile("a[b[c]]", &NamespaceMap::default(), 2).is_ok());
        let err = compile("a[b[c[d]]]", &NamespaceMap::default(), 2).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::ExcessivePredicateNesting);
    }

    #[test]
    fn deep_grouping_is_a_compile_error() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(kind_of(&deep), CompileErrorKind::ExcessiveExpressionNesting);

        let negations = format!("{}1", "-".repeat(10_000));
        assert_eq!(kind_of(&negations), CompileErrorKind::ExcessiveExpressionNesting);

        let calls = format!("{}1{}", "not(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(kind_of(&calls), CompileErrorKind::ExcessiveExpressionNesting);

        let limit = MAX_EXPRESSION_NESTING;
        let shallow = format!("{}1{}", "(".repeat(limit), ")".repeat(limit));
        assert!(parse(&shallow).is_ok());
    }

    #[test]
    fn custom_prefixes_resolve() {
        let ns = NamespaceMap::empty().with_prefix("o", "urn:orders");
        let compiled = compile("o:*", &ns, 8).unwrap();
        let Expr::Path(path) = compiled.root() else {
            panic!("expected a path");
        };
        assert_eq!(
            path.steps[0].test,
            NodeTest::Wildcard {
                namespace: Some("urn:orders".to_string())
            }
        );
    }
}
