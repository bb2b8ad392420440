//! The "opaque evaluator" mentioned in spec.md §9: a marker expression is
//! parsed once (at dependency-edge ingestion time) and evaluated against an
//! environment of `{python_version, extra}`, mirroring
//! `packaging.markers.Marker.evaluate(environment=...)`.
//!
//! Only the two variables the resolver ever binds are supported —
//! `python_version` and `extra` — since every other PEP 508 marker variable
//! (`sys_platform`, `os_name`, ...) is evaluated by the knowledge graph at
//! candidate-discovery time, before a dependency edge ever reaches the
//! resolver (see `envpin-kg`'s `DependencyEdge` contract).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::specifier::{Operator, VersionSpecifier};
use crate::version::Version;
use envpin_normalize::ExtraName;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{0}` is not a supported marker expression")]
pub struct MarkerParseError(pub String);

/// The environment a marker is evaluated against.
#[derive(Debug, Clone)]
pub struct MarkerEnvironment {
    pub python_version: Version,
    pub extra: Option<ExtraName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Atom {
    PythonVersion(Operator, Version),
    Extra(bool, ExtraName),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Atom(Atom),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

/// A parsed marker expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    root: Node,
    text: String,
}

impl Marker {
    pub fn evaluate(&self, env: &MarkerEnvironment) -> bool {
        Self::eval_node(&self.root, env)
    }

    fn eval_node(node: &Node, env: &MarkerEnvironment) -> bool {
        match node {
            Node::Atom(Atom::PythonVersion(op, v)) => {
                VersionSpecifier::new(*op, v.clone()).contains(&env.python_version)
            }
            Node::Atom(Atom::Extra(expect_eq, name)) => {
                let matches = env.extra.as_ref() == Some(name);
                if *expect_eq {
                    matches
                } else {
                    !matches
                }
            }
            Node::And(a, b) => Self::eval_node(a, env) && Self::eval_node(b, env),
            Node::Or(a, b) => Self::eval_node(a, env) || Self::eval_node(b, env),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Marker {
    type Err = MarkerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            tokens: tokenize(s),
            pos: 0,
            original: s,
        };
        let root = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(MarkerParseError(s.to_string()));
        }
        Ok(Marker {
            root,
            text: s.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Op(String),
    LParen,
    RParen,
    And,
    Or,
    Not,
    In,
}

fn tokenize(s: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '\'' || c == '"' {
            let quote = c;
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != quote {
                j += 1;
            }
            tokens.push(Token::Str(chars[start..j].iter().collect()));
            i = j + 1;
        } else if "<>=!~".contains(c) {
            let start = i;
            let mut j = i + 1;
            while j < chars.len() && "=<>~".contains(chars[j]) {
                j += 1;
            }
            tokens.push(Token::Op(chars[start..j].iter().collect()));
            i = j;
        } else {
            let start = i;
            let mut j = i;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
                j += 1;
            }
            if j == start {
                // unrecognized character: skip it defensively rather than
                // looping forever on malformed input from the KG.
                i += 1;
                continue;
            }
            let word: String = chars[start..j].iter().collect();
            match word.as_str() {
                "and" => tokens.push(Token::And),
                "or" => tokens.push(Token::Or),
                "not" => tokens.push(Token::Not),
                "in" => tokens.push(Token::In),
                _ => tokens.push(Token::Ident(word)),
            }
            i = j;
        }
    }
    tokens
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    original: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn err(&self) -> MarkerParseError {
        MarkerParseError(self.original.to_string())
    }

    fn parse_or(&mut self) -> Result<Node, MarkerParseError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node, MarkerParseError> {
        let mut lhs = self.parse_atom()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.bump();
            let rhs = self.parse_atom()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_atom(&mut self) -> Result<Node, MarkerParseError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.bump();
            let inner = self.parse_or()?;
            if !matches!(self.bump(), Some(Token::RParen)) {
                return Err(self.err());
            }
            return Ok(inner);
        }

        let lhs = self.bump().ok_or_else(|| self.err())?;

        // `extra` can appear on either side: `extra == "x"` or `"x" == extra`.
        let (var, op, value) = match lhs {
            Token::Ident(name) => {
                let op = self.bump().ok_or_else(|| self.err())?;
                let value = self.bump().ok_or_else(|| self.err())?;
                (name, op, value)
            }
            Token::Str(s) => {
                let op = self.bump().ok_or_else(|| self.err())?;
                let value = self.bump().ok_or_else(|| self.err())?;
                match value {
                    Token::Ident(name) => (name, op, Token::Str(s)),
                    _ => return Err(self.err()),
                }
            }
            _ => return Err(self.err()),
        };

        match var.as_str() {
            "extra" => {
                let expect_eq = match op {
                    Token::Op(o) if o == "==" => true,
                    Token::Op(o) if o == "!=" => false,
                    _ => return Err(self.err()),
                };
                let name = match value {
                    Token::Str(s) => ExtraName::new(s),
                    _ => return Err(self.err()),
                };
                Ok(Node::Atom(Atom::Extra(expect_eq, name)))
            }
            "python_version" | "python_full_version" => {
                let operator = match op {
                    Token::Op(o) => Operator::from_marker_str(&o).ok_or_else(|| self.err())?,
                    _ => return Err(self.err()),
                };
                let version = match value {
                    Token::Str(s) => Version::parse(&s).map_err(|_| self.err())?,
                    _ => return Err(self.err()),
                };
                Ok(Node::Atom(Atom::PythonVersion(operator, version)))
            }
            _ => Err(self.err()),
        }
    }
}

impl Operator {
    fn from_marker_str(s: &str) -> Option<Self> {
        Some(match s {
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            "~=" => Self::Compatible,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(py: &str, extra: Option<&str>) -> MarkerEnvironment {
        MarkerEnvironment {
            python_version: Version::parse(py).unwrap(),
            extra: extra.map(ExtraName::new),
        }
    }

    #[test]
    fn simple_python_version() {
        let m = Marker::from_str("python_version >= '3.8'").unwrap();
        assert!(m.evaluate(&env("3.9", None)));
        assert!(!m.evaluate(&env("3.7", None)));
    }

    #[test]
    fn extra_equality() {
        let m = Marker::from_str("extra == 'test'").unwrap();
        assert!(m.evaluate(&env("3.9", Some("test"))));
        assert!(!m.evaluate(&env("3.9", Some("docs"))));
        assert!(!m.evaluate(&env("3.9", None)));
    }

    #[test]
    fn and_or_and_parens() {
        let m = Marker::from_str("python_version >= '3.8' and (extra == 'a' or extra == 'b')").unwrap();
        assert!(m.evaluate(&env("3.9", Some("a"))));
        assert!(m.evaluate(&env("3.9", Some("b"))));
        assert!(!m.evaluate(&env("3.9", Some("c"))));
        assert!(!m.evaluate(&env("3.7", Some("a"))));
    }
}
