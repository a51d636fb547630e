//! Formula evaluator
//!
//! Evaluation runs in two passes over the token list of a [`ParsedFormula`]:
//!
//! 1. **Function resolution**: every call, left to right, is dispatched through
//!    the function registry and its whole `NAME(...)` span collapses into one
//!    value. Nested calls are resolved when their enclosing function evaluates
//!    its arguments.
//! 2. **Arithmetic**: innermost parenthesis groups are reduced first, then
//!    the flat remainder by repeated leftmost-highest-precedence reduction:
//!    `* /`, then `+ -`, then comparisons.
//!
//! Evaluation is pure: records are borrowed immutably and nothing is cached
//! between calls.

use crate::config::EvaluationOptions;
use crate::error::{EvalError, EvalResult, ParseError};
use crate::functions::criteria::{self, ComparisonOp};
use crate::functions::FunctionRegistry;
use crate::parser::{function_call_at, is_call_start, FunctionCall, ParsedFormula};
use crate::token::{Operator, Token};
use metrica_core::{FieldValue, Record, RecordInput, Schema};
use std::fmt;
use std::sync::OnceLock;

/// Global function registry (lazily initialized)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

/// The shared function registry
pub fn get_function_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// A null or absent field, before arithmetic turns it into 0
    Null,
}

impl FormulaValue {
    /// Convert to number, if the value is numeric
    ///
    /// Null is not numeric here, so aggregates can skip it.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(true) => Some(1.0),
            FormulaValue::Boolean(false) => Some(0.0),
            FormulaValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            FormulaValue::Null => None,
        }
    }

    /// Force conversion to number for arithmetic (null reads as 0)
    pub fn to_number(&self) -> EvalResult<f64> {
        match self {
            FormulaValue::Null => Ok(0.0),
            _ => self.as_number().ok_or_else(|| {
                EvalError::TypeMismatch(format!("'{}' is not a number", self.as_string()))
            }),
        }
    }

    /// Truthiness for `IF` conditions
    pub fn is_truthy(&self) -> bool {
        match self {
            FormulaValue::Boolean(b) => *b,
            FormulaValue::Number(n) => *n != 0.0,
            FormulaValue::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) => n != 0.0,
                Err(_) => !s.is_empty(),
            },
            FormulaValue::Null => false,
        }
    }

    /// Check if this is null
    pub fn is_null(&self) -> bool {
        matches!(self, FormulaValue::Null)
    }

    /// Null becomes 0; anything else is unchanged
    pub fn or_zero(self) -> Self {
        match self {
            FormulaValue::Null => FormulaValue::Number(0.0),
            other => other,
        }
    }

    /// Convert to string
    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            FormulaValue::Text(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Null => String::new(),
        }
    }

    /// Get the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FormulaValue::Number(_) => "number",
            FormulaValue::Text(_) => "text",
            FormulaValue::Boolean(_) => "boolean",
            FormulaValue::Null => "null",
        }
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<&FieldValue> for FormulaValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => FormulaValue::Null,
            FieldValue::Number(n) => FormulaValue::Number(*n),
            FieldValue::Text(s) => FormulaValue::Text(s.clone()),
        }
    }
}

impl From<f64> for FormulaValue {
    fn from(n: f64) -> Self {
        FormulaValue::Number(n)
    }
}

/// Resolves a field name against a record
pub trait FieldResolver: Send + Sync {
    fn resolve<'r>(&self, record: &'r Record, field: &str) -> Option<&'r FieldValue>;
}

/// Plain lookup by exact field name
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectResolver;

impl FieldResolver for DirectResolver {
    fn resolve<'r>(&self, record: &'r Record, field: &str) -> Option<&'r FieldValue> {
        record.get(field)
    }
}

/// Lookup honouring the schema's aliases
impl FieldResolver for Schema {
    fn resolve<'r>(&self, record: &'r Record, field: &str) -> Option<&'r FieldValue> {
        self.lookup(record, field)
    }
}

/// Context for formula evaluation
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Records the formula runs against
    pub data: RecordInput<'a>,
    /// Field lookup strategy
    pub resolver: &'a dyn FieldResolver,
    /// Evaluation options
    pub options: EvaluationOptions,
}

impl<'a> EvaluationContext<'a> {
    /// Create a new evaluation context with direct field lookup
    pub fn new(data: impl Into<RecordInput<'a>>) -> Self {
        Self {
            data: data.into(),
            resolver: &DirectResolver,
            options: EvaluationOptions::default(),
        }
    }

    /// Create a simple context over no records (for testing)
    pub fn simple() -> Self {
        Self::new(RecordInput::Many(&[]))
    }

    /// Use a different field resolver
    pub fn with_resolver(mut self, resolver: &'a dyn FieldResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use different options
    pub fn with_options(mut self, options: EvaluationOptions) -> Self {
        self.options = options;
        self
    }

    /// Records an aggregate runs over
    pub fn records(&self) -> &'a [Record] {
        self.data.records()
    }

    /// The same context narrowed to one record
    pub fn for_record(&self, record: &'a Record) -> EvaluationContext<'a> {
        EvaluationContext {
            data: RecordInput::Single(record),
            ..*self
        }
    }

    /// Look a field up in a record
    ///
    /// Absent fields are `Ok(None)`, or [`EvalError::MissingField`] in strict
    /// mode.
    pub fn lookup<'r>(&self, record: &'r Record, field: &str) -> EvalResult<Option<&'r FieldValue>> {
        match self.resolver.resolve(record, field) {
            Some(value) => Ok(Some(value)),
            None if self.options.strict_fields => Err(EvalError::MissingField(field.to_string())),
            None => Ok(None),
        }
    }

    /// Value of a bare field reference
    pub fn field_value(&self, field: &str) -> EvalResult<FormulaValue> {
        let record = self
            .data
            .record()
            .ok_or_else(|| EvalError::NoRecordContext(field.to_string()))?;
        Ok(self
            .lookup(record, field)?
            .map_or(FormulaValue::Null, FormulaValue::from))
    }

    /// Evaluate a token list (a function argument) in this context
    pub fn evaluate(&self, tokens: &[Token]) -> EvalResult<FormulaValue> {
        evaluate_tokens(tokens, self)
    }

    /// Evaluate a token list to a number
    pub fn evaluate_number(&self, tokens: &[Token]) -> EvalResult<f64> {
        self.evaluate(tokens)?.to_number()
    }
}

/// Evaluate a parsed formula against a record or a record list
///
/// # Example
/// ```rust
/// use metrica_core::Record;
/// use metrica_formula::{execute, parse, FormulaValue};
///
/// let records = vec![
///     Record::new().with("amount", 100.0).with("status", "active"),
///     Record::new().with("amount", 50.0).with("status", "closed"),
/// ];
/// let formula = parse("SUM(amount WHERE status = \"active\")").unwrap();
/// assert_eq!(execute(&formula, &records).unwrap(), FormulaValue::Number(100.0));
/// ```
pub fn execute<'a>(
    formula: &ParsedFormula,
    data: impl Into<RecordInput<'a>>,
) -> EvalResult<FormulaValue> {
    execute_with(formula, &EvaluationContext::new(data))
}

/// Evaluate a parsed formula in a prepared context
///
/// A null result (a formula that is just a null field) comes back as 0.
pub fn execute_with(formula: &ParsedFormula, ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let result = evaluate_tokens(formula.tokens(), ctx).map(FormulaValue::or_zero);
    match &result {
        Ok(value) => tracing::debug!(
            expression = formula.expression(),
            records = ctx.data.len(),
            %value,
            "evaluated formula"
        ),
        Err(error) => tracing::debug!(
            expression = formula.expression(),
            %error,
            "formula evaluation failed"
        ),
    }
    result
}

/// Evaluate a token list
pub fn evaluate_tokens(tokens: &[Token], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let terms = resolve_functions(tokens, ctx)?;
    reduce(terms)
}

/// A value or an operator left after function resolution
#[derive(Debug, Clone, PartialEq)]
enum Term {
    Value(FormulaValue),
    Op(Operator),
}

fn resolve_functions(tokens: &[Token], ctx: &EvaluationContext<'_>) -> EvalResult<Vec<Term>> {
    let mut terms = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        if is_call_start(tokens, i) {
            let call = function_call_at(tokens, i)?;
            terms.push(Term::Value(evaluate_function(&call, ctx)?));
            i = call.end + 1;
            continue;
        }

        let term = match &tokens[i] {
            Token::Number(n) => Term::Value(FormulaValue::Number(*n)),
            Token::String(s) => Term::Value(FormulaValue::Text(s.clone())),
            Token::Field(name) if criteria::is_reserved(name) => {
                return Err(ParseError::UnexpectedToken(name.clone()).into())
            }
            Token::Field(name) => Term::Value(ctx.field_value(name)?),
            Token::Function(name) => {
                return Err(ParseError::IncompleteExpression(format!(
                    "function {} must be followed by '('",
                    name
                ))
                .into())
            }
            Token::Operator(op) => Term::Op(*op),
        };
        terms.push(term);
        i += 1;
    }

    Ok(terms)
}

/// Evaluate a function call
fn evaluate_function(call: &FunctionCall, ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let registry = get_function_registry();

    let func = registry
        .get(&call.name)
        .ok_or_else(|| EvalError::UnsupportedFunction(call.name.clone()))?;

    func.check_arity(call.args.len())?;

    tracing::trace!(function = func.name, args = call.args.len(), "dispatching function");
    (func.implementation)(&call.args, ctx)
}

/// Reduce parenthesis groups innermost first, then the flat remainder
fn reduce(mut terms: Vec<Term>) -> EvalResult<FormulaValue> {
    while let Some(close) = terms
        .iter()
        .position(|t| *t == Term::Op(Operator::RightParen))
    {
        let open = terms[..close]
            .iter()
            .rposition(|t| *t == Term::Op(Operator::LeftParen))
            .ok_or(ParseError::UnbalancedParentheses)?;

        let mut group: Vec<Term> = terms.drain(open..=close).collect();
        group.pop();
        group.remove(0);
        if group.is_empty() {
            return Err(ParseError::EmptyGroup.into());
        }
        terms.insert(open, Term::Value(reduce_flat(group)?));
    }

    if terms.contains(&Term::Op(Operator::LeftParen)) {
        return Err(ParseError::UnbalancedParentheses.into());
    }

    reduce_flat(terms)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Compare(ComparisonOp),
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div => 2,
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Compare(_) => 0,
        }
    }
}

/// Reduce a parenthesis-free term list to one value
fn reduce_flat(terms: Vec<Term>) -> EvalResult<FormulaValue> {
    if terms.is_empty() {
        return Err(ParseError::Empty.into());
    }

    let mut operands: Vec<FormulaValue> = Vec::new();
    let mut ops: Vec<BinaryOp> = Vec::new();
    let mut iter = terms.into_iter().peekable();

    loop {
        // Unary signs
        let mut negate = false;
        loop {
            match iter.peek() {
                Some(Term::Op(Operator::Plus)) => {}
                Some(Term::Op(Operator::Minus)) => negate = !negate,
                _ => break,
            }
            iter.next();
        }

        let value = match iter.next() {
            Some(Term::Value(value)) => value,
            Some(Term::Op(op)) => {
                return Err(ParseError::IncompleteExpression(format!(
                    "missing operand before '{}'",
                    op
                ))
                .into())
            }
            None => {
                return Err(ParseError::IncompleteExpression(
                    "expression ends with an operator".into(),
                )
                .into())
            }
        };
        operands.push(if negate {
            FormulaValue::Number(-value.to_number()?)
        } else {
            value
        });

        let op = match iter.next() {
            None => break,
            Some(Term::Op(op)) => op,
            Some(Term::Value(value)) => {
                return Err(ParseError::UnexpectedToken(value.to_string()).into())
            }
        };

        let binary = match op {
            Operator::Plus => BinaryOp::Add,
            Operator::Minus => BinaryOp::Sub,
            Operator::Star => BinaryOp::Mul,
            Operator::Slash => BinaryOp::Div,
            Operator::Equal => BinaryOp::Compare(ComparisonOp::Equal),
            Operator::Greater | Operator::Less => {
                let next = match iter.peek() {
                    Some(Term::Op(next)) => Some(*next),
                    _ => None,
                };
                let (cmp, compound) = match (op, next) {
                    (Operator::Greater, Some(Operator::Equal)) => (ComparisonOp::GreaterEqual, true),
                    (Operator::Less, Some(Operator::Equal)) => (ComparisonOp::LessEqual, true),
                    (Operator::Less, Some(Operator::Greater)) => (ComparisonOp::NotEqual, true),
                    (Operator::Greater, _) => (ComparisonOp::GreaterThan, false),
                    _ => (ComparisonOp::LessThan, false),
                };
                if compound {
                    iter.next();
                }
                BinaryOp::Compare(cmp)
            }
            other => return Err(ParseError::UnexpectedToken(other.to_string()).into()),
        };
        ops.push(binary);
    }

    for level in [2, 1, 0] {
        while let Some(pos) = ops.iter().position(|op| op.precedence() == level) {
            let op = ops.remove(pos);
            let right = operands.remove(pos + 1);
            let left = std::mem::replace(&mut operands[pos], FormulaValue::Null);
            operands[pos] = apply(op, left, right)?;
        }
    }

    operands
        .pop()
        .ok_or_else(|| ParseError::IncompleteExpression("nothing to evaluate".into()).into())
}

fn apply(op: BinaryOp, left: FormulaValue, right: FormulaValue) -> EvalResult<FormulaValue> {
    let value = match op {
        BinaryOp::Add => left.to_number()? + right.to_number()?,
        BinaryOp::Sub => left.to_number()? - right.to_number()?,
        BinaryOp::Mul => left.to_number()? * right.to_number()?,
        BinaryOp::Div => {
            let divisor = right.to_number()?;
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            left.to_number()? / divisor
        }
        BinaryOp::Compare(cmp) => return compare(cmp, &left, &right),
    };
    Ok(FormulaValue::Number(value))
}

fn compare(op: ComparisonOp, left: &FormulaValue, right: &FormulaValue) -> EvalResult<FormulaValue> {
    // Numeric text compares as a number
    let ordering = match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left, right) {
            (FormulaValue::Text(a), FormulaValue::Text(b)) => {
                Some(a.to_lowercase().cmp(&b.to_lowercase()))
            }
            _ => match (left.to_number(), right.to_number()) {
                (Ok(a), Ok(b)) => a.partial_cmp(&b),
                _ => None,
            },
        },
    };

    match ordering {
        Some(ordering) => Ok(FormulaValue::Boolean(op.test(ordering))),
        // Incomparable values are simply unequal
        None if op.is_equality() => Ok(FormulaValue::Boolean(op == ComparisonOp::NotEqual)),
        None => Err(EvalError::TypeMismatch(format!(
            "cannot compare {} '{}' with {} '{}' using '{}'",
            left.type_name(),
            left,
            right.type_name(),
            right,
            op
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn record() -> Record {
        Record::new()
            .with("amount", 250.0)
            .with("rate", 0.5)
            .with("zero", 0.0)
            .with("status", "active")
            .with("balance_text", "12.5")
            .with("note", FieldValue::Null)
    }

    fn eval(formula: &str) -> EvalResult<FormulaValue> {
        let parsed = parse(formula).unwrap();
        execute(&parsed, &record())
    }

    fn num(formula: &str) -> f64 {
        match eval(formula) {
            Ok(FormulaValue::Number(n)) => n,
            other => panic!("expected a number for {:?}, got {:?}", formula, other),
        }
    }

    #[test]
    fn test_evaluate_precedence() {
        assert_eq!(num("2 + 3 * 4"), 14.0);
        assert_eq!(num("(2 + 3) * 4"), 20.0);
        assert_eq!(num("10 - 4 - 3"), 3.0);
        assert_eq!(num("8 / 4 / 2"), 1.0);
        assert_eq!(num("2 * (3 + (4 - 1)) / 3"), 4.0);
    }

    #[test]
    fn test_evaluate_unary_signs() {
        assert_eq!(num("-3 + 5"), 2.0);
        assert_eq!(num("2 * -3"), -6.0);
        assert_eq!(num("2 - -3"), 5.0);
        assert_eq!(num("-(2 + 3)"), -5.0);
        assert_eq!(num("+4"), 4.0);
    }

    #[test]
    fn test_evaluate_fields() {
        assert_eq!(num("amount * rate"), 125.0);
        assert_eq!(num("balance_text + 1"), 13.5);
        assert_eq!(num("missing + 1"), 1.0);
        assert_eq!(num("note + 1"), 1.0);
        assert_eq!(eval("note").unwrap(), FormulaValue::Number(0.0));
        assert_eq!(eval("status").unwrap(), FormulaValue::Text("active".into()));
    }

    #[test]
    fn test_evaluate_comparisons() {
        assert_eq!(eval("3 > 2").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("amount >= 250").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("amount <> 250").unwrap(), FormulaValue::Boolean(false));
        assert_eq!(eval("amount * 2 > 400").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("rate < -1").unwrap(), FormulaValue::Boolean(false));
        assert_eq!(
            eval("status = \"ACTIVE\"").unwrap(),
            FormulaValue::Boolean(true)
        );
        assert_eq!(eval("status = 5").unwrap(), FormulaValue::Boolean(false));
        assert!(matches!(eval("status > 5"), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn test_compare_numeric_text() {
        let record = Record::new()
            .with("balance", "100")
            .with("limit", "9")
            .with("a", "5")
            .with("b", "5.0")
            .with("grade", "b");
        let eval = |formula: &str| execute(&parse(formula).unwrap(), &record);

        assert_eq!(eval("balance > limit"), Ok(FormulaValue::Boolean(true)));
        assert_eq!(eval("IF(balance > limit, 1, 0)"), Ok(FormulaValue::Number(1.0)));
        assert_eq!(eval("a = b"), Ok(FormulaValue::Boolean(true)));
        assert_eq!(eval("a < \"10\""), Ok(FormulaValue::Boolean(true)));
        assert_eq!(eval("grade = \"B\""), Ok(FormulaValue::Boolean(true)));
        assert_eq!(eval("grade < \"c\""), Ok(FormulaValue::Boolean(true)));
    }

    #[test]
    fn test_constant_formula_without_records() {
        let parsed = parse("(2 + 3) * 4 > 19").unwrap();
        assert_eq!(
            execute_with(&parsed, &EvaluationContext::simple()),
            Ok(FormulaValue::Boolean(true))
        );
        assert_eq!(
            execute_with(&parse("COUNT(*)").unwrap(), &EvaluationContext::simple()),
            Ok(FormulaValue::Number(0.0))
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("amount / zero"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("amount / missing"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_type_mismatch() {
        assert!(matches!(eval("status * 2"), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn test_strict_fields() {
        let parsed = parse("missing + 1").unwrap();
        let record = record();
        let ctx = EvaluationContext::new(&record).with_options(EvaluationOptions::strict());
        assert_eq!(
            execute_with(&parsed, &ctx),
            Err(EvalError::MissingField("missing".into()))
        );
    }

    #[test]
    fn test_bare_field_over_record_list() {
        let parsed = parse("amount + 1").unwrap();
        let records = vec![record(), record()];
        assert_eq!(
            execute(&parsed, &records),
            Err(EvalError::NoRecordContext("amount".into()))
        );
    }

    #[test]
    fn test_unsupported_function() {
        assert_eq!(
            eval("custom(amount)"),
            Err(EvalError::UnsupportedFunction("CUSTOM".into()))
        );
    }

    #[test]
    fn test_schema_resolver() {
        let schema = Schema::from_fields(["outstanding_balance"]).unwrap();
        let record = Record::new().with("outstanding_balance", 40.0);
        let parsed = parse("amount * 2").unwrap();

        let ctx = EvaluationContext::new(&record).with_resolver(&schema);
        assert_eq!(execute_with(&parsed, &ctx).unwrap(), FormulaValue::Number(80.0));

        assert_eq!(execute(&parsed, &record).unwrap(), FormulaValue::Number(0.0));
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let parsed = parse("amount * rate + 1").unwrap();
        let record = record();
        let first = execute(&parsed, &record).unwrap();
        let second = execute(&parsed, &record).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(FormulaValue::Null.to_number(), Ok(0.0));
        assert_eq!(FormulaValue::Null.as_number(), None);
        assert_eq!(FormulaValue::Boolean(true).to_number(), Ok(1.0));
        assert_eq!(FormulaValue::Text(" 3.5 ".into()).to_number(), Ok(3.5));
        assert!(FormulaValue::Text("abc".into()).to_number().is_err());

        assert!(FormulaValue::Text("yes".into()).is_truthy());
        assert!(!FormulaValue::Text("0".into()).is_truthy());
        assert!(!FormulaValue::Null.is_truthy());

        assert_eq!(FormulaValue::Number(3.0).as_string(), "3");
        assert_eq!(FormulaValue::Number(2.5).as_string(), "2.5");
        assert_eq!(FormulaValue::Boolean(false).to_string(), "FALSE");
    }
}
