//! `WHERE` filter conditions for aggregate functions
//!
//! An aggregate argument may carry a filter after the `WHERE` keyword:
//!
//! - `SUM(amount WHERE status = "active")`
//! - `AVG(rate WHERE days_past_due >= 30 AND grade <> "D")`
//! - `COUNT(* WHERE balance > 0)`
//!
//! A condition is one or more comparisons `field op literal` joined by `AND`.
//! Operators are `=`, `<>`, `>`, `<`, `>=`, `<=`; literals are numbers or
//! quoted strings. String literals only support `=` and `<>`, and compare
//! case-insensitively unless both sides are numeric text.
//!
//! Values that cannot be compared with the literal (null, absent, or text
//! against a number) never match, whatever the operator.

use crate::error::{EvalResult, ParseError};
use crate::evaluator::EvaluationContext;
use crate::token::{Operator, Token};
use metrica_core::{FieldValue, Record};
use std::cmp::Ordering;
use std::fmt;

/// Keyword introducing a filter condition
pub const WHERE: &str = "WHERE";

/// Keyword joining comparisons in a condition
pub const AND: &str = "AND";

/// Check whether a word is reserved (never a field reference)
pub fn is_reserved(word: &str) -> bool {
    word.eq_ignore_ascii_case(WHERE) || word.eq_ignore_ascii_case(AND)
}

/// Split an argument at its top-level `WHERE` into (value, condition)
pub fn split_where(arg: &[Token]) -> Option<(&[Token], &[Token])> {
    let mut depth = 0usize;
    for (i, token) in arg.iter().enumerate() {
        match token {
            Token::Operator(Operator::LeftParen) => depth += 1,
            Token::Operator(Operator::RightParen) => depth = depth.saturating_sub(1),
            _ if depth == 0 && token.is_keyword(WHERE) => {
                return Some((&arg[..i], &arg[i + 1..]));
            }
            _ => {}
        }
    }
    None
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl ComparisonOp {
    /// Read a comparison operator from the start of a token slice
    ///
    /// Returns the operator and the number of tokens it spans: `>=`, `<=` and
    /// `<>` are two single-character operator tokens.
    pub fn from_tokens(tokens: &[Token]) -> Option<(ComparisonOp, usize)> {
        let first = tokens.first()?.operator()?;
        let second = tokens.get(1).and_then(Token::operator);
        let op = match (first, second) {
            (Operator::Greater, Some(Operator::Equal)) => return Some((ComparisonOp::GreaterEqual, 2)),
            (Operator::Less, Some(Operator::Equal)) => return Some((ComparisonOp::LessEqual, 2)),
            (Operator::Less, Some(Operator::Greater)) => return Some((ComparisonOp::NotEqual, 2)),
            (Operator::Greater, _) => ComparisonOp::GreaterThan,
            (Operator::Less, _) => ComparisonOp::LessThan,
            (Operator::Equal, _) => ComparisonOp::Equal,
            _ => return None,
        };
        Some((op, 1))
    }

    /// Whether an ordering satisfies the operator
    pub fn test(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ordering == Ordering::Equal,
            ComparisonOp::NotEqual => ordering != Ordering::Equal,
            ComparisonOp::LessThan => ordering == Ordering::Less,
            ComparisonOp::LessEqual => ordering != Ordering::Greater,
            ComparisonOp::GreaterThan => ordering == Ordering::Greater,
            ComparisonOp::GreaterEqual => ordering != Ordering::Less,
        }
    }

    /// `=` and `<>`
    pub fn is_equality(self) -> bool {
        matches!(self, ComparisonOp::Equal | ComparisonOp::NotEqual)
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessEqual => "<=",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterEqual => ">=",
        };
        f.write_str(s)
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

/// `field op literal`
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub op: ComparisonOp,
    pub literal: Literal,
}

impl Comparison {
    /// Test a field value against the literal
    pub fn matches_value(&self, value: &FieldValue) -> bool {
        let ordering = match (&self.literal, value) {
            (Literal::Number(n), value) => value.as_number().and_then(|v| v.partial_cmp(n)),
            (Literal::Text(s), FieldValue::Text(t)) => match (value.as_number(), numeric_text(s)) {
                (Some(v), Some(n)) => v.partial_cmp(&n),
                _ => Some(t.to_lowercase().cmp(&s.to_lowercase())),
            },
            (Literal::Text(s), FieldValue::Number(v)) => numeric_text(s).and_then(|n| v.partial_cmp(&n)),
            (Literal::Text(_), FieldValue::Null) => None,
        };
        ordering.map_or(false, |o| self.op.test(o))
    }
}

/// A parsed `WHERE` condition: comparisons joined by `AND`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    comparisons: Vec<Comparison>,
}

impl Condition {
    /// Parse the tokens following `WHERE`
    pub fn parse(tokens: &[Token]) -> Result<Self, ParseError> {
        if tokens.is_empty() {
            return Err(ParseError::InvalidCondition("empty condition".into()));
        }

        let mut comparisons = Vec::new();
        let mut i = 0;
        loop {
            let field = match tokens.get(i) {
                Some(Token::Field(name)) if !is_reserved(name) => name.clone(),
                Some(token) => {
                    return Err(ParseError::InvalidCondition(format!(
                        "expected a field name, found '{}'",
                        token
                    )))
                }
                None => {
                    return Err(ParseError::InvalidCondition(
                        "expected a field name after AND".into(),
                    ))
                }
            };
            i += 1;

            let (op, width) = ComparisonOp::from_tokens(&tokens[i..]).ok_or_else(|| {
                ParseError::InvalidCondition(format!(
                    "expected a comparison operator after '{}'",
                    field
                ))
            })?;
            i += width;

            let (literal, width) = read_literal(&tokens[i..]).ok_or_else(|| {
                ParseError::InvalidCondition(format!(
                    "expected a number or quoted string after '{} {}'",
                    field, op
                ))
            })?;
            i += width;

            if matches!(literal, Literal::Text(_)) && !op.is_equality() {
                return Err(ParseError::InvalidCondition(format!(
                    "'{}' cannot compare text on field '{}'",
                    op, field
                )));
            }

            comparisons.push(Comparison { field, op, literal });

            match tokens.get(i) {
                None => break,
                Some(token) if token.is_keyword(AND) => i += 1,
                Some(token) => {
                    return Err(ParseError::InvalidCondition(format!(
                        "unexpected '{}' after comparison",
                        token
                    )))
                }
            }
        }

        Ok(Self { comparisons })
    }

    /// Comparisons in source order
    pub fn comparisons(&self) -> &[Comparison] {
        &self.comparisons
    }

    /// Check whether a record passes every comparison
    pub fn matches(&self, record: &Record, ctx: &EvaluationContext<'_>) -> EvalResult<bool> {
        for comparison in &self.comparisons {
            let value = ctx.lookup(record, &comparison.field)?;
            if !comparison.matches_value(value.unwrap_or(&FieldValue::Null)) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn numeric_text(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A number (optionally signed) or a string literal
fn read_literal(tokens: &[Token]) -> Option<(Literal, usize)> {
    match tokens {
        [Token::Number(n), ..] => Some((Literal::Number(*n), 1)),
        [Token::String(s), ..] => Some((Literal::Text(s.clone()), 1)),
        [Token::Operator(Operator::Minus), Token::Number(n), ..] => {
            Some((Literal::Number(-n), 2))
        }
        [Token::Operator(Operator::Plus), Token::Number(n), ..] => Some((Literal::Number(*n), 2)),
        _ => None,
    }
}
