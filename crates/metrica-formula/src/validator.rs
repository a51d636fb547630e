//! Semantic validation
//!
//! Unlike [`parse`](crate::parse), validation never stops at the first
//! problem: it runs every check it can and reports all errors and warnings,
//! so an editor can show the full list at once. Warnings never make a formula
//! invalid.

use crate::config::FormulaLimits;
use crate::evaluator::get_function_registry;
use crate::error::{EvalError, ParseError};
use crate::parser::{check_structure, extract_field_references, function_calls};
use crate::security::{paren_depth, security_issues_with};
use crate::token::{tokenize, Token};
use metrica_core::Schema;
use std::collections::BTreeMap;

/// Outcome of validating an expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationResult {
    /// `true` when there are no errors
    pub is_valid: bool,
    /// Problems that prevent the formula from being used
    pub errors: Vec<String>,
    /// Advisory notes
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Check if any warnings were raised
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn finish(mut self) -> Self {
        self.is_valid = self.errors.is_empty();
        self
    }
}

/// Validate an expression with the default limits
///
/// ```rust
/// use metrica_core::Schema;
/// use metrica_formula::validate;
///
/// let schema = Schema::from_fields(["amount", "status"]).unwrap();
/// let result = validate("SUM(amount) / COUNT(balance)", Some(&schema));
/// assert!(!result.is_valid);
/// assert_eq!(
///     result.errors,
///     vec!["Field 'balance' does not exist in product schema".to_string()]
/// );
/// ```
pub fn validate(expression: &str, schema: Option<&Schema>) -> ValidationResult {
    let validator = FormulaValidator::new();
    match schema {
        Some(schema) => validator.with_schema(schema).validate(expression),
        None => validator.validate(expression),
    }
}

/// Configurable validator
#[derive(Debug, Clone, Default)]
pub struct FormulaValidator<'s> {
    schema: Option<&'s Schema>,
    limits: FormulaLimits,
}

impl<'s> FormulaValidator<'s> {
    /// Create a validator with default limits and no schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Check field references against a schema
    pub fn with_schema(mut self, schema: &'s Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Use different limits
    pub fn with_limits(mut self, limits: FormulaLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The limits in use
    pub fn limits(&self) -> &FormulaLimits {
        &self.limits
    }

    /// Validate an expression, collecting every error and warning
    pub fn validate(&self, expression: &str) -> ValidationResult {
        let result = self.run(expression).finish();
        tracing::debug!(
            expression,
            valid = result.is_valid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "validated formula"
        );
        result
    }

    fn run(&self, expression: &str) -> ValidationResult {
        let mut result = ValidationResult::default();

        if expression.trim().is_empty() {
            result.error(ParseError::Empty.to_string());
            return result;
        }

        // Security (also covers the nesting cap and raw parenthesis balance)
        for issue in security_issues_with(expression, &self.limits) {
            result.error(issue.to_string());
        }

        let depth = paren_depth(expression);
        let tokens = match tokenize(expression) {
            Ok(tokens) => tokens,
            Err(error) => {
                result.error(error.to_string());
                return result;
            }
        };

        // Structure; needs balanced parentheses to mean anything
        if depth.is_some() {
            for error in check_structure(&tokens) {
                result.error(error.to_string());
            }
        }

        let fields = extract_field_references(&tokens);
        if let Some(schema) = self.schema {
            let mut names: Vec<&String> = fields.iter().collect();
            names.sort_unstable();
            for name in names {
                if !schema.contains(name) {
                    result.error(format!("Field '{}' does not exist in product schema", name));
                }
            }
        }

        self.check_complexity(&tokens, depth.unwrap_or(0), fields.len(), &mut result);
        self.check_functions(&tokens, &mut result);

        result
    }

    fn check_complexity(
        &self,
        tokens: &[Token],
        depth: usize,
        field_count: usize,
        result: &mut ValidationResult,
    ) {
        let limits = &self.limits;

        if tokens.len() > limits.max_tokens {
            result.error(format!(
                "Formula is too complex: {} tokens (max {})",
                tokens.len(),
                limits.max_tokens
            ));
        } else if tokens.len() > limits.warn_tokens {
            result.warn(format!(
                "Formula is complex: {} tokens; consider splitting it",
                tokens.len()
            ));
        }

        // Depth above the maximum is already a security error
        if depth > limits.warn_nesting_depth && depth <= limits.max_nesting_depth {
            result.warn(format!(
                "Parentheses are nested {} levels deep; consider simplifying",
                depth
            ));
        }

        if field_count > limits.max_fields {
            result.error(format!(
                "Formula references too many fields: {} (max {})",
                field_count, limits.max_fields
            ));
        } else if field_count > limits.warn_fields {
            result.warn(format!("Formula references {} distinct fields", field_count));
        }
    }

    fn check_functions(&self, tokens: &[Token], result: &mut ValidationResult) {
        let registry = get_function_registry();
        let mut uses: BTreeMap<String, usize> = BTreeMap::new();

        for call in function_calls(tokens) {
            match registry.get(&call.name) {
                Some(def) => {
                    if let Err(error) = def.check_arity(call.arg_count) {
                        result.error(error.to_string());
                    }
                }
                None => result.error(EvalError::UnsupportedFunction(call.name.clone()).to_string()),
            }
            *uses.entry(call.name).or_default() += 1;
        }

        for (name, count) in uses {
            if count > self.limits.warn_function_repeats {
                result.warn(format!(
                    "Function {} is used {} times; consider simplifying the formula",
                    name, count
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nested(levels: usize) -> String {
        format!("{}amount{}", "(".repeat(levels), ")".repeat(levels))
    }

    fn sum_of_fields(count: usize) -> String {
        (1..=count)
            .map(|i| format!("f{}", i))
            .collect::<Vec<_>>()
            .join(" + ")
    }

    #[test]
    fn test_valid_formula() {
        let schema = Schema::from_fields(["amount", "status"]).unwrap();
        let result = validate("SUM(amount WHERE status = \"active\") / COUNT(*)", Some(&schema));
        assert_eq!(
            result,
            ValidationResult {
                is_valid: true,
                errors: vec![],
                warnings: vec![],
            }
        );
    }

    #[test]
    fn test_empty_expression() {
        let result = validate("  ", None);
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["Formula expression cannot be empty".to_string()]);
    }

    #[test]
    fn test_security_errors_are_reported() {
        let result = validate("SUM(amount); system('rm')", None);
        assert!(!result.is_valid);
        assert!(result
            .errors
            .contains(&"Expression contains forbidden pattern: system".to_string()));
        assert!(result
            .errors
            .contains(&"Expression contains forbidden character: ';'".to_string()));
    }

    #[test]
    fn test_unknown_fields() {
        let schema = Schema::from_fields(["outstanding_balance", "status"]).unwrap();
        let result = validate("SUM(amount) + SUM(rate) + COUNT(grade)", Some(&schema));
        assert_eq!(
            result.errors,
            vec![
                "Field 'grade' does not exist in product schema".to_string(),
                "Field 'rate' does not exist in product schema".to_string(),
            ]
        );
    }

    #[test]
    fn test_fields_not_checked_without_schema() {
        assert!(validate("SUM(anything)", None).is_valid);
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let result = validate("SUM(amount", None);
        assert_eq!(
            result.errors,
            vec!["Expression has unbalanced parentheses".to_string()]
        );
    }

    #[test]
    fn test_unterminated_string_stops_validation() {
        let result = validate("COUNT(* WHERE status = \"open)", None);
        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.starts_with("Unterminated string literal")));
    }

    #[test]
    fn test_nesting_boundary() {
        let ok = validate(&nested(10), None);
        assert!(ok.is_valid, "{:?}", ok.errors);
        assert_eq!(ok.warnings.len(), 1);

        let too_deep = validate(&nested(11), None);
        assert!(!too_deep.is_valid);
        assert_eq!(
            too_deep.errors,
            vec!["Parentheses nested too deeply: 11 levels (max 10)".to_string()]
        );

        assert!(!validate(&nested(5), None).has_warnings());
        assert!(validate(&nested(6), None).has_warnings());
    }

    #[test]
    fn test_field_count_boundary() {
        let twenty = validate(&sum_of_fields(20), None);
        assert!(twenty.is_valid, "{:?}", twenty.errors);
        assert_eq!(
            twenty.warnings,
            vec!["Formula references 20 distinct fields".to_string()]
        );

        let twenty_one = validate(&sum_of_fields(21), None);
        assert!(!twenty_one.is_valid);
        assert_eq!(
            twenty_one.errors,
            vec!["Formula references too many fields: 21 (max 20)".to_string()]
        );

        assert!(!validate(&sum_of_fields(10), None).has_warnings());
    }

    #[test]
    fn test_token_count_limits() {
        let terms = |n: usize| vec!["1"; n].join(" + ");

        let warned = validate(&terms(26), None);
        assert!(warned.is_valid);
        assert_eq!(
            warned.warnings,
            vec!["Formula is complex: 51 tokens; consider splitting it".to_string()]
        );

        let rejected = validate(&terms(51), None);
        assert_eq!(
            rejected.errors,
            vec!["Formula is too complex: 101 tokens (max 100)".to_string()]
        );
    }

    #[test]
    fn test_function_arity_and_unknown_functions() {
        let result = validate("IF(amount > 1, 2) + custom(amount) + MOVING_AVG(amount)", None);
        assert_eq!(
            result.errors,
            vec![
                "Wrong number of arguments for IF: expected exactly 3, got 2".to_string(),
                "Unsupported function: CUSTOM".to_string(),
                "Wrong number of arguments for MOVING_AVG: expected exactly 2, got 1".to_string(),
            ]
        );
    }

    #[test]
    fn test_where_outside_aggregates() {
        let result = validate("RATIO(amount WHERE status = \"a\", 2)", None);
        assert!(!result.is_valid);
        assert_eq!(
            result.errors,
            vec![
                "Invalid WHERE condition: WHERE is only allowed in aggregate functions, not RATIO"
                    .to_string()
            ]
        );
        assert!(validate("RATIO(SUM(amount WHERE status = \"a\"), 2)", None).is_valid);
    }

    #[test]
    fn test_split_comparison_operator() {
        let result = validate("IF(amount > = 1, 1, 0)", None);
        assert_eq!(
            result.errors,
            vec!["Comparison operator '>=' must not contain whitespace".to_string()]
        );
    }

    #[test]
    fn test_repeated_function_warning() {
        let five = vec!["SUM(a)"; 5].join(" + ");
        assert!(!validate(&five, None).has_warnings());

        let six = vec!["SUM(a)"; 6].join(" + ");
        let result = validate(&six, None);
        assert!(result.is_valid);
        assert_eq!(
            result.warnings,
            vec!["Function SUM is used 6 times; consider simplifying the formula".to_string()]
        );
    }

    #[test]
    fn test_collects_every_error() {
        let schema = Schema::from_fields(["amount"]).unwrap();
        let result = validate("RATIO(, balance) * / 2", Some(&schema));
        assert_eq!(
            result.errors,
            vec![
                "Function RATIO has a leading comma".to_string(),
                "Consecutive operators '*' and '/'".to_string(),
                "Field 'balance' does not exist in product schema".to_string(),
            ]
        );
    }

    #[test]
    fn test_custom_limits() {
        let limits = FormulaLimits {
            max_fields: 2,
            warn_fields: 1,
            ..FormulaLimits::default()
        };
        let result = FormulaValidator::new()
            .with_limits(limits)
            .validate("a + b + c");
        assert_eq!(
            result.errors,
            vec!["Formula references too many fields: 3 (max 2)".to_string()]
        );
    }

    #[test]
    fn test_validation_is_idempotent() {
        let schema = Schema::from_fields(["amount"]).unwrap();
        let validator = FormulaValidator::new().with_schema(&schema);
        let first = validator.validate("SUM(amount) + IF(x, 1)");
        let second = validator.validate("SUM(amount) + IF(x, 1)");
        assert_eq!(first, second);
        assert!(!first.is_valid);
    }
}
