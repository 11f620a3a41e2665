// (C) Copyright 2025 flagcore contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The simple comparison DSL.
//!
//! Infix comparisons over dotted attribute paths, combined with `and`/`or`
//! (`and` binds tighter) and parentheses:
//!
//! ```text
//! email eq "foo@example.com" and (company.size gt 100 or plan in ["pro", "enterprise"])
//! ```
//!
//! Operators: `eq ne gt lt ge le in`. Literals: double- or single-quoted
//! strings, bare numbers, `true`/`false`. A missing attribute never matches,
//! whatever the operator.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::utils::get_nested_field_value;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum ParseError {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of query")]
    UnexpectedEnd,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Num(n) => write!(f, "{n}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp {
        path: String,
        op: CmpOp,
        literal: Literal,
    },
    In {
        path: String,
        literals: Vec<Literal>,
    },
}

/// Parses a query into an expression tree. Used both by evaluation and by
/// the ahead-of-time validation of the flag linter.
pub(crate) fn parse(query: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(query)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ParseError::UnexpectedToken(token.to_string())),
    }
}

/// Evaluates a query against the context map. Any parse failure is "no match".
pub(crate) fn evaluate(query: &str, context: &HashMap<String, Value>) -> bool {
    match parse(query) {
        Ok(expr) => eval_expr(&expr, context),
        Err(err) => {
            log::warn!("ignoring malformed query '{query}': {err}");
            false
        }
    }
}

fn tokenize(query: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        None => return Err(ParseError::UnterminatedString),
                        Some(c) if c == quote => break,
                        Some('\\') => match chars.next() {
                            None => return Err(ParseError::UnterminatedString),
                            Some(escaped) => literal.push(escaped),
                        },
                        Some(c) => literal.push(c),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            '-' | '0'..='9' => {
                let mut raw = String::new();
                raw.push(c);
                chars.next();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        raw.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = raw
                    .parse::<f64>()
                    .map_err(|_| ParseError::InvalidNumber(raw.clone()))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(ParseError::UnexpectedCharacter(other)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token.ok_or(ParseError::UnexpectedEnd)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(word)) if word == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_primary()?;
        while self.eat_keyword("and") {
            let right = self.parse_primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            let inner = self.parse_or()?;
            match self.next()? {
                Token::RParen => Ok(inner),
                token => Err(ParseError::UnexpectedToken(token.to_string())),
            }
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let path = match self.next()? {
            Token::Ident(path) => path,
            token => return Err(ParseError::UnexpectedToken(token.to_string())),
        };
        let operator = match self.next()? {
            Token::Ident(op) => op,
            token => return Err(ParseError::UnexpectedToken(token.to_string())),
        };
        match operator.as_str() {
            "eq" | "ne" | "gt" | "lt" | "ge" | "le" => {
                let op = match operator.as_str() {
                    "eq" => CmpOp::Eq,
                    "ne" => CmpOp::Ne,
                    "gt" => CmpOp::Gt,
                    "lt" => CmpOp::Lt,
                    "ge" => CmpOp::Ge,
                    _ => CmpOp::Le,
                };
                let literal = self.parse_literal()?;
                Ok(Expr::Cmp { path, op, literal })
            }
            "in" => {
                match self.next()? {
                    Token::LBracket => {}
                    token => return Err(ParseError::UnexpectedToken(token.to_string())),
                }
                let mut literals = Vec::new();
                if matches!(self.peek(), Some(Token::RBracket)) {
                    self.pos += 1;
                    return Ok(Expr::In { path, literals });
                }
                loop {
                    literals.push(self.parse_literal()?);
                    match self.next()? {
                        Token::Comma => continue,
                        Token::RBracket => break,
                        token => return Err(ParseError::UnexpectedToken(token.to_string())),
                    }
                }
                Ok(Expr::In { path, literals })
            }
            other => Err(ParseError::UnexpectedToken(other.to_string())),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        match self.next()? {
            Token::Str(s) => Ok(Literal::Str(s)),
            Token::Num(n) => Ok(Literal::Num(n)),
            Token::Ident(word) if word == "true" => Ok(Literal::Bool(true)),
            Token::Ident(word) if word == "false" => Ok(Literal::Bool(false)),
            token => Err(ParseError::UnexpectedToken(token.to_string())),
        }
    }
}

fn eval_expr(expr: &Expr, context: &HashMap<String, Value>) -> bool {
    match expr {
        Expr::And(left, right) => eval_expr(left, context) && eval_expr(right, context),
        Expr::Or(left, right) => eval_expr(left, context) || eval_expr(right, context),
        Expr::Cmp { path, op, literal } => match lookup(path, context) {
            Some(value) => compare(value, *op, literal),
            None => false,
        },
        Expr::In { path, literals } => match lookup(path, context) {
            Some(value) => literals.iter().any(|literal| equals(value, literal)),
            None => false,
        },
    }
}

fn lookup<'a>(path: &str, context: &'a HashMap<String, Value>) -> Option<&'a Value> {
    get_nested_field_value(context, path).ok()
}

fn compare(value: &Value, op: CmpOp, literal: &Literal) -> bool {
    match op {
        CmpOp::Eq => equals(value, literal),
        CmpOp::Ne => !equals(value, literal),
        CmpOp::Gt | CmpOp::Lt | CmpOp::Ge | CmpOp::Le => ordered(value, op, literal),
    }
}

fn equals(value: &Value, literal: &Literal) -> bool {
    match (value, literal) {
        (Value::String(s), Literal::Str(l)) => s == l,
        (Value::Bool(b), Literal::Bool(l)) => b == l,
        (Value::Number(_), Literal::Num(l)) => value.as_f64() == Some(*l),
        _ => false,
    }
}

fn ordered(value: &Value, op: CmpOp, literal: &Literal) -> bool {
    // Numbers compare numerically (numeric strings are parsed); strings
    // compare lexicographically.
    match literal {
        Literal::Num(expected) => {
            let actual = match value {
                Value::Number(_) => value.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            match actual {
                Some(actual) => match op {
                    CmpOp::Gt => actual > *expected,
                    CmpOp::Lt => actual < *expected,
                    CmpOp::Ge => actual >= *expected,
                    CmpOp::Le => actual <= *expected,
                    _ => unreachable!(),
                },
                None => false,
            }
        }
        Literal::Str(expected) => match value {
            Value::String(actual) => match op {
                CmpOp::Gt => actual > expected,
                CmpOp::Lt => actual < expected,
                CmpOp::Ge => actual >= expected,
                CmpOp::Le => actual <= expected,
                _ => unreachable!(),
            },
            _ => false,
        },
        Literal::Bool(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn context() -> HashMap<String, Value> {
        HashMap::from([
            ("targetingKey".to_string(), json!("user-key")),
            ("email".to_string(), json!("foo@example.com")),
            ("admin".to_string(), json!(true)),
            ("age".to_string(), json!(27)),
            ("score".to_string(), json!("42.5")),
            ("company".to_string(), json!({"id": "company-456", "size": 250})),
        ])
    }

    #[rstest]
    #[case(r#"email eq "foo@example.com""#, true)]
    #[case(r#"email eq 'foo@example.com'"#, true)]
    #[case(r#"email ne "bar@example.com""#, true)]
    #[case(r#"email eq "bar@example.com""#, false)]
    #[case("admin eq true", true)]
    #[case("admin eq false", false)]
    #[case("age eq 27", true)]
    #[case("age gt 18", true)]
    #[case("age ge 27", true)]
    #[case("age lt 27", false)]
    #[case("age le 27", true)]
    #[case("score gt 42", true)]
    #[case(r#"targetingKey eq "user-key""#, true)]
    fn test_comparisons(#[case] query: &str, #[case] expected: bool) {
        assert_eq!(evaluate(query, &context()), expected);
    }

    #[rstest]
    #[case(r#"company.id eq "company-456""#, true)]
    #[case("company.size gt 100", true)]
    #[case(r#"company.name eq "anything""#, false)]
    fn test_dotted_paths(#[case] query: &str, #[case] expected: bool) {
        assert_eq!(evaluate(query, &context()), expected);
    }

    #[rstest]
    #[case(r#"email in ["foo@example.com", "bar@example.com"]"#, true)]
    #[case(r#"email in ["bar@example.com"]"#, false)]
    #[case("age in [26, 27]", true)]
    #[case("age in []", false)]
    fn test_in_operator(#[case] query: &str, #[case] expected: bool) {
        assert_eq!(evaluate(query, &context()), expected);
    }

    #[rstest]
    #[case("age gt 18 and admin eq true", true)]
    #[case("age gt 30 or admin eq true", true)]
    #[case("age gt 30 and admin eq true", false)]
    // `and` binds tighter than `or`: (false and false) or true
    #[case(r#"age gt 30 and admin eq false or email eq "foo@example.com""#, true)]
    #[case(r#"age gt 30 and (admin eq false or email eq "foo@example.com")"#, false)]
    fn test_boolean_combinations(#[case] query: &str, #[case] expected: bool) {
        assert_eq!(evaluate(query, &context()), expected);
    }

    #[rstest]
    #[case("missing eq 1")]
    #[case("missing ne 1")]
    #[case(r#"missing in ["a"]"#)]
    fn test_missing_attribute_never_matches(#[case] query: &str) {
        assert!(!evaluate(query, &context()));
    }

    #[rstest]
    #[case("email eq")]
    #[case("eq email")]
    #[case(r#"email like "foo""#)]
    #[case(r#"email eq "unterminated"#)]
    #[case("age in [1, 2")]
    #[case("(age gt 1")]
    #[case("age gt 1 extra")]
    #[case("@ eq 1")]
    fn test_parse_errors(#[case] query: &str) {
        assert!(parse(query).is_err());
        // And a malformed query is simply no match:
        assert!(!evaluate(query, &context()));
    }

    #[test]
    fn test_type_confusion_is_no_match() {
        // A string attribute compared against a number never matches.
        assert!(!evaluate("email gt 3", &context()));
        assert!(!evaluate(r#"age eq "27""#, &context()));
    }
}
