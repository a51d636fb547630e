//! Financial ratio functions
//!
//! Each returns 0 instead of failing when its denominator is 0; a raw `/`
//! in the expression still reports division by zero.

use super::argument;
use crate::error::EvalResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use crate::token::Token;

fn two_numbers(
    args: &[Vec<Token>],
    function: &str,
    ctx: &EvaluationContext<'_>,
) -> EvalResult<(f64, f64)> {
    let a = ctx.evaluate_number(argument(args, 0, function)?)?;
    let b = ctx.evaluate_number(argument(args, 1, function)?)?;
    Ok((a, b))
}

/// RATIO function
pub fn fn_ratio(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let (numerator, denominator) = two_numbers(args, "RATIO", ctx)?;
    if denominator == 0.0 {
        return Ok(FormulaValue::Number(0.0));
    }
    Ok(FormulaValue::Number(numerator / denominator))
}

/// PERCENTAGE function
pub fn fn_percentage(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let (part, whole) = two_numbers(args, "PERCENTAGE", ctx)?;
    if whole == 0.0 {
        return Ok(FormulaValue::Number(0.0));
    }
    Ok(FormulaValue::Number(part / whole * 100.0))
}

/// GROWTH_RATE function
pub fn fn_growth_rate(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let (current, previous) = two_numbers(args, "GROWTH_RATE", ctx)?;
    if previous == 0.0 {
        return Ok(FormulaValue::Number(0.0));
    }
    Ok(FormulaValue::Number((current - previous) / previous * 100.0))
}
