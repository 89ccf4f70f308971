//! Condition expressions.
//!
//! Steps may carry a boolean condition evaluated against the context just
//! before dispatch. The language is deliberately small: `${...}` references,
//! scalar literals, list literals, equality/inequality, `in` containment,
//! `&&`, `||`, `!`, and parentheses. It is a comparison evaluator, not a
//! scripting language.
//!
//! Conditions are parsed once when a run is prepared; parse failures abort
//! the run before any step executes, while evaluation failures (an
//! unresolved reference, a non-boolean result) are step failures.

use serde_json::Value;

use crate::context::ContextStore;
use crate::error::{EngineError, Result};

use super::value::{lookup, StaticScope};

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    Literal(Value),
    Reference(String),
    List(Vec<CondExpr>),
    Not(Box<CondExpr>),
    And(Box<CondExpr>, Box<CondExpr>),
    Or(Box<CondExpr>, Box<CondExpr>),
    Eq(Box<CondExpr>, Box<CondExpr>),
    Ne(Box<CondExpr>, Box<CondExpr>),
    In(Box<CondExpr>, Box<CondExpr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Reference(String),
    Literal(Value),
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn parse_error(input: &str, message: impl Into<String>) -> EngineError {
    EngineError::Condition {
        message: format!("{} in condition '{}'", message.into(), input),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '$' => {
                chars.next();
                if chars.peek() != Some(&'{') {
                    return Err(parse_error(input, "expected '{' after '$'"));
                }
                chars.next();
                let mut path = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => path.push(c),
                        None => return Err(parse_error(input, "unterminated reference")),
                    }
                }
                tokens.push(Token::Reference(path.trim().to_string()));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => text.push(c),
                        None => return Err(parse_error(input, "unterminated string literal")),
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
            }
            '=' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(parse_error(input, "expected '==' "));
                }
                tokens.push(Token::EqEq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '&' => {
                chars.next();
                if chars.next() != Some('&') {
                    return Err(parse_error(input, "expected '&&'"));
                }
                tokens.push(Token::AndAnd);
            }
            '|' => {
                chars.next();
                if chars.next() != Some('|') {
                    return Err(parse_error(input, "expected '||'"));
                }
                tokens.push(Token::OrOr);
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
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number: serde_json::Number = text
                    .parse::<i64>()
                    .map(serde_json::Number::from)
                    .or_else(|_| {
                        text.parse::<f64>().map_err(|_| ()).and_then(|f| {
                            serde_json::Number::from_f64(f).ok_or(())
                        })
                    })
                    .map_err(|_| parse_error(input, format!("invalid number '{}'", text)))?;
                tokens.push(Token::Literal(Value::Number(number)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "true" => tokens.push(Token::Literal(Value::Bool(true))),
                    "false" => tokens.push(Token::Literal(Value::Bool(false))),
                    "null" => tokens.push(Token::Literal(Value::Null)),
                    "in" => tokens.push(Token::In),
                    other => {
                        return Err(parse_error(
                            input,
                            format!("unexpected word '{}' (references use ${{...}})", other),
                        ))
                    }
                }
            }
            other => {
                return Err(parse_error(input, format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.advance().as_ref() == Some(&token) {
            Ok(())
        } else {
            Err(parse_error(self.input, format!("expected {}", what)))
        }
    }

    // expr := and ("||" and)*
    fn expr(&mut self) -> Result<CondExpr> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.advance();
            let right = self.and()?;
            left = CondExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // and := cmp ("&&" cmp)*
    fn and(&mut self) -> Result<CondExpr> {
        let mut left = self.cmp()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.advance();
            let right = self.cmp()?;
            left = CondExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // cmp := unary (("==" | "!=" | "in") unary)?
    fn cmp(&mut self) -> Result<CondExpr> {
        let left = self.unary()?;
        let op = match self.peek() {
            Some(Token::EqEq) => Token::EqEq,
            Some(Token::NotEq) => Token::NotEq,
            Some(Token::In) => Token::In,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.unary()?;
        Ok(match op {
            Token::EqEq => CondExpr::Eq(Box::new(left), Box::new(right)),
            Token::NotEq => CondExpr::Ne(Box::new(left), Box::new(right)),
            Token::In => CondExpr::In(Box::new(left), Box::new(right)),
            _ => unreachable!(),
        })
    }

    // unary := "!" unary | atom
    fn unary(&mut self) -> Result<CondExpr> {
        if self.peek() == Some(&Token::Bang) {
            self.advance();
            return Ok(CondExpr::Not(Box::new(self.unary()?)));
        }
        self.atom()
    }

    // atom := "(" expr ")" | "[" (unary ("," unary)*)? "]" | literal | reference
    fn atom(&mut self) -> Result<CondExpr> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.advance();
                    return Ok(CondExpr::List(items));
                }
                loop {
                    items.push(self.unary()?);
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        _ => return Err(parse_error(self.input, "expected ',' or ']'")),
                    }
                }
                Ok(CondExpr::List(items))
            }
            Some(Token::Literal(value)) => Ok(CondExpr::Literal(value)),
            Some(Token::Reference(path)) => Ok(CondExpr::Reference(path)),
            _ => Err(parse_error(self.input, "expected a value")),
        }
    }
}

impl CondExpr {
    /// Parse a condition string into an expression tree.
    pub fn parse(input: &str) -> Result<CondExpr> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(parse_error(input, "empty condition"));
        }
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
        };
        let expr = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parse_error(input, "trailing tokens"));
        }
        Ok(expr)
    }

    /// Evaluate to a boolean against the scope and context.
    ///
    /// The final value must be a boolean (`null` counts as false); anything
    /// else is a condition error rather than a silent coercion.
    pub fn evaluate(&self, scope: &StaticScope, context: &ContextStore) -> Result<bool> {
        match self.eval_value(scope, context)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(EngineError::Condition {
                message: format!("condition evaluated to non-boolean value {}", other),
            }),
        }
    }

    fn eval_value(&self, scope: &StaticScope, context: &ContextStore) -> Result<Value> {
        Ok(match self {
            CondExpr::Literal(value) => value.clone(),
            CondExpr::Reference(path) => lookup(path, scope, context)?,
            CondExpr::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.eval_value(scope, context))
                    .collect::<Result<_>>()?,
            ),
            CondExpr::Not(inner) => {
                let value = inner.eval_value(scope, context)?;
                match value {
                    Value::Bool(b) => Value::Bool(!b),
                    Value::Null => Value::Bool(true),
                    other => {
                        return Err(EngineError::Condition {
                            message: format!("cannot negate non-boolean value {}", other),
                        })
                    }
                }
            }
            CondExpr::And(left, right) => {
                let left = left.evaluate(scope, context)?;
                // Short-circuit: the right side is only evaluated when needed.
                Value::Bool(left && right.evaluate(scope, context)?)
            }
            CondExpr::Or(left, right) => {
                let left = left.evaluate(scope, context)?;
                Value::Bool(left || right.evaluate(scope, context)?)
            }
            CondExpr::Eq(left, right) => Value::Bool(values_equal(
                &left.eval_value(scope, context)?,
                &right.eval_value(scope, context)?,
            )),
            CondExpr::Ne(left, right) => Value::Bool(!values_equal(
                &left.eval_value(scope, context)?,
                &right.eval_value(scope, context)?,
            )),
            CondExpr::In(needle, haystack) => {
                let needle = needle.eval_value(scope, context)?;
                let haystack = haystack.eval_value(scope, context)?;
                match &haystack {
                    Value::Array(items) => {
                        Value::Bool(items.iter().any(|item| values_equal(item, &needle)))
                    }
                    Value::String(text) => match &needle {
                        Value::String(sub) => Value::Bool(text.contains(sub.as_str())),
                        other => {
                            return Err(EngineError::Condition {
                                message: format!(
                                    "'in' over a string requires a string needle, got {}",
                                    other
                                ),
                            })
                        }
                    },
                    other => {
                        return Err(EngineError::Condition {
                            message: format!("'in' requires a list or string, got {}", other),
                        })
                    }
                }
            }
        })
    }
}

/// Equality with numeric normalization: `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}
