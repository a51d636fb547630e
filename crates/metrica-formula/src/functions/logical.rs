//! Logical functions

use super::argument;
use crate::error::EvalResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use crate::token::Token;

/// IF function
///
/// Only the selected branch is evaluated, so `IF(COUNT(*) > 0, SUM(a) /
/// COUNT(*), 0)` never divides by zero.
pub fn fn_if(args: &[Vec<Token>], ctx: &EvaluationContext<'_>) -> EvalResult<FormulaValue> {
    let condition = ctx.evaluate(argument(args, 0, "IF")?)?;

    let branch = if condition.is_truthy() { 1 } else { 2 };
    ctx.evaluate(argument(args, branch, "IF")?)
}

#[cfg(test)]
mod tests {
    use crate::error::EvalError;
    use crate::evaluator::{execute, FormulaValue};
    use crate::parser::parse;
    use metrica_core::Record;
    use pretty_assertions::assert_eq;

    fn eval(formula: &str, record: &Record) -> Result<FormulaValue, EvalError> {
        execute(&parse(formula).unwrap(), record)
    }

    #[test]
    fn test_if_comparison() {
        let record = Record::new().with("dpd", 45.0).with("amount", 100.0);
        assert_eq!(
            eval("IF(dpd > 30, amount, 0)", &record),
            Ok(FormulaValue::Number(100.0))
        );
        assert_eq!(
            eval("IF(dpd >= 90, amount, 0)", &record),
            Ok(FormulaValue::Number(0.0))
        );
        assert_eq!(
            eval("IF(dpd > 30, \"late\", \"current\")", &record),
            Ok(FormulaValue::Text("late".into()))
        );
    }

    #[test]
    fn test_if_truthy_scalar() {
        let record = Record::new().with("flag", 1.0).with("label", "");
        assert_eq!(eval("IF(flag, 10, 20)", &record), Ok(FormulaValue::Number(10.0)));
        assert_eq!(eval("IF(label, 10, 20)", &record), Ok(FormulaValue::Number(20.0)));
        assert_eq!(eval("IF(missing, 10, 20)", &record), Ok(FormulaValue::Number(20.0)));
    }

    #[test]
    fn test_if_is_lazy() {
        let record = Record::new().with("loan_count", 0.0).with("total", 50.0);
        assert_eq!(
            eval("IF(loan_count > 0, total / loan_count, 0)", &record),
            Ok(FormulaValue::Number(0.0))
        );
        assert_eq!(
            eval("IF(loan_count = 0, total / loan_count, 0)", &record),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_if_inside_aggregate() {
        let records = vec![
            Record::new().with("amount", 100.0).with("dpd", 10.0),
            Record::new().with("amount", 200.0).with("dpd", 60.0),
            Record::new().with("amount", 300.0).with("dpd", 95.0),
        ];
        let parsed = parse("SUM(IF(dpd > 30, amount, 0))").unwrap();
        assert_eq!(execute(&parsed, &records), Ok(FormulaValue::Number(500.0)));
    }

    #[test]
    fn test_if_arity() {
        let record = Record::new();
        assert_eq!(
            eval("IF(1, 2)", &record),
            Err(EvalError::ArgumentCount {
                function: "IF".into(),
                expected: "exactly 3".into(),
                actual: 2,
            })
        );
    }
}
