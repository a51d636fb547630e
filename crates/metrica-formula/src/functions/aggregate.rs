//! Aggregate functions
//!
//! An aggregate evaluates its value expression once per record that passes
//! the optional `WHERE` filter, then reduces the per-record values. A single
//! record behaves as a one-element list.

use super::argument;
use super::criteria::{self, Condition};
use crate::error::{EvalError, EvalResult};
use crate::evaluator::{EvaluationContext, FormulaValue};
use crate::token::{Operator, Token};
use metrica_core::Record;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// A value expression and its optional filter
struct AggregateArg<'t> {
    value: &'t [Token],
    condition: Option<Condition>,
}

impl<'t> AggregateArg<'t> {
    fn parse(tokens: &'t [Token]) -> EvalResult<Self> {
        match criteria::split_where(tokens) {
            Some((value, condition)) => Ok(Self {
                value,
                condition: Some(Condition::parse(condition)?),
            }),
            None => Ok(Self {
                value: tokens,
                condition: None,
            }),
        }
    }

    /// `*`, or nothing before `WHERE`
    fn is_wildcard(&self) -> bool {
        matches!(self.value, [] | [Token::Operator(Operator::Star)])
    }

    /// Records passing the filter
    fn matching<'a>(&self, ctx: &EvaluationContext<'a>) -> EvalResult<Vec<&'a Record>> {
        let mut matched = Vec::new();
        for record in ctx.records() {
            match &self.condition {
                Some(condition) if !condition.matches(record, ctx)? => {}
                _ => matched.push(record),
            }
        }
        Ok(matched)
    }

    /// Per-record values of the value expression
    fn values(&self, function: &str, ctx: &EvaluationContext<'_>) -> EvalResult<Vec<FormulaValue>> {
        if self.is_wildcard() {
            return Err(EvalError::InvalidArgument {
                function: function.to_string(),
                message: "expects a value expression, not '*'".into(),
            });
        }
        self.matching(ctx)?
            .into_iter()
            .map(|record| ctx.for_record(record).evaluate(self.value))
            .collect()
    }

    /// Per-record values that are numeric; null and non-numeric text are skipped
    fn numbers(&self, function: &str, ctx: &EvaluationContext<'_>) -> EvalResult<Vec<f64>> {
        Ok(self
            .values(function, ctx)?
            .iter()
            .filter_map(FormulaValue::as_number)
            .collect())
    }
}

/// Sum in decimal arithmetic when every value converts, in f64 otherwise
fn decimal_sum(values: &[f64]) -> f64 {
    let mut total = Decimal::ZERO;
    for &value in values {
        match Decimal::from_f64(value).and_then(|d| total.checked_add(d)) {
            Some(sum) => total = sum,
            None => return values.iter().sum(),
        }
    }
    total.to_f64().unwrap_or_else(|| values.iter().sum())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        decimal_sum(values) / values.len() as f64
    }
}

/// SUM function
pub fn fn_sum(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let arg = AggregateArg::parse(argument(args, 0, "SUM")?)?;
    let values = arg.numbers("SUM", ctx)?;
    Ok(FormulaValue::Number(decimal_sum(&values)))
}

/// AVG function
pub fn fn_avg(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let arg = AggregateArg::parse(argument(args, 0, "AVG")?)?;
    let values = arg.numbers("AVG", ctx)?;
    Ok(FormulaValue::Number(mean(&values)))
}

/// COUNT function
pub fn fn_count(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let tokens = match args.first() {
        Some(tokens) => tokens,
        None => return Ok(FormulaValue::Number(ctx.records().len() as f64)),
    };

    let arg = AggregateArg::parse(tokens)?;
    let matched = arg.matching(ctx)?;

    let count = if arg.is_wildcard() {
        matched.len()
    } else {
        let mut count = 0;
        for record in matched {
            if !ctx.for_record(record).evaluate(arg.value)?.is_null() {
                count += 1;
            }
        }
        count
    };

    Ok(FormulaValue::Number(count as f64))
}

/// MIN function
pub fn fn_min(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let arg = AggregateArg::parse(argument(args, 0, "MIN")?)?;
    let min = arg
        .numbers("MIN", ctx)?
        .into_iter()
        .reduce(f64::min)
        .unwrap_or(0.0);
    Ok(FormulaValue::Number(min))
}

/// MAX function
pub fn fn_max(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let arg = AggregateArg::parse(argument(args, 0, "MAX")?)?;
    let max = arg
        .numbers("MAX", ctx)?
        .into_iter()
        .reduce(f64::max)
        .unwrap_or(0.0);
    Ok(FormulaValue::Number(max))
}

/// MOVING_AVG function
///
/// Mean of the last `window` numeric values in record order; 0 while fewer
/// than `window` values exist.
pub fn fn_moving_avg(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let arg = AggregateArg::parse(argument(args, 0, "MOVING_AVG")?)?;
    let window = ctx.evaluate_number(argument(args, 1, "MOVING_AVG")?)?;

    if !(window.is_finite() && window >= 1.0 && window.fract() == 0.0) {
        return Err(EvalError::InvalidArgument {
            function: "MOVING_AVG".into(),
            message: format!("window must be a positive integer, got {}", window),
        });
    }
    let window = window as usize;

    let values = arg.numbers("MOVING_AVG", ctx)?;
    if values.len() < window {
        return Ok(FormulaValue::Number(0.0));
    }
    Ok(FormulaValue::Number(mean(&values[values.len() - window..])))
}
