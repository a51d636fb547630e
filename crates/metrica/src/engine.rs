//! Formula engine
//!
//! [`FormulaEngine`] bundles a product schema with limits and evaluation
//! options, and runs the whole pipeline (screen, parse, validate, evaluate)
//! behind one call. It also evaluates one formula over many record batches,
//! in parallel when the `parallel` feature is enabled.
//!
//! # Example
//!
//! ```rust
//! use metrica::prelude::*;
//!
//! let engine = FormulaEngine::new();
//! let formula = engine.parse("SUM(amount) / COUNT(*)").unwrap();
//!
//! let batches = vec![
//!     vec![Record::new().with("amount", 10.0), Record::new().with("amount", 30.0)],
//!     vec![Record::new().with("amount", 5.0)],
//! ];
//! let (results, stats) = engine.evaluate_batches(&formula, &batches);
//! assert_eq!(results[0], Ok(FormulaValue::Number(20.0)));
//! assert_eq!(stats.records, 3);
//! ```

use metrica_core::{Record, RecordInput, Schema};
use metrica_formula::{
    execute_with, parse_with, DirectResolver, EvalResult, EvaluationContext, EvaluationOptions,
    FieldResolver, FormulaError, FormulaLimits, FormulaResult, FormulaValidator, FormulaValue,
    ParsedFormula, ValidationResult,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Options for a formula engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Limits for the security screen and the validator
    pub limits: FormulaLimits,
    /// Options passed to every evaluation
    pub evaluation: EvaluationOptions,
    /// Run semantic validation before [`FormulaEngine::execute`] (default: true)
    pub validate_before_execute: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            limits: FormulaLimits::default(),
            evaluation: EvaluationOptions::default(),
            validate_before_execute: true,
        }
    }
}

/// Statistics from a batch evaluation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    /// Number of batches evaluated
    pub batches: usize,
    /// Total number of records across all batches
    pub records: usize,
    /// Number of batches that produced a value
    pub succeeded: usize,
    /// Number of batches that failed
    pub failed: usize,
}

/// Schema-aware front end to the formula pipeline
#[derive(Debug, Clone, Default)]
pub struct FormulaEngine {
    options: EngineOptions,
    schema: Option<Schema>,
}

impl FormulaEngine {
    /// Create an engine with default options and no schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with custom options
    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            options,
            schema: None,
        }
    }

    /// Validate field references against `schema` and resolve them through
    /// its aliases
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Engine options
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The product schema, if one is set
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Screen and parse an expression
    pub fn parse(&self, expression: &str) -> FormulaResult<ParsedFormula> {
        parse_with(expression, &self.options.limits)
    }

    /// Validate an expression, collecting every error and warning
    pub fn validate(&self, expression: &str) -> ValidationResult {
        let validator = FormulaValidator::new().with_limits(self.options.limits.clone());
        match &self.schema {
            Some(schema) => validator.with_schema(schema).validate(expression),
            None => validator.validate(expression),
        }
    }

    /// Evaluate a parsed formula
    ///
    /// When `validate_before_execute` is set, a formula with validation errors
    /// is refused with [`FormulaError::Invalid`] before any record is read.
    pub fn execute<'a>(
        &self,
        formula: &ParsedFormula,
        data: impl Into<RecordInput<'a>>,
    ) -> FormulaResult<FormulaValue> {
        if self.options.validate_before_execute {
            let validation = self.validate(formula.expression());
            if !validation.is_valid {
                tracing::debug!(
                    expression = formula.expression(),
                    errors = validation.errors.len(),
                    "refusing invalid formula"
                );
                return Err(FormulaError::Invalid(validation.errors));
            }
        }
        self.run(formula, data.into()).map_err(FormulaError::from)
    }

    /// Parse and evaluate an expression in one step
    pub fn evaluate<'a>(
        &self,
        expression: &str,
        data: impl Into<RecordInput<'a>>,
    ) -> FormulaResult<FormulaValue> {
        let formula = self.parse(expression)?;
        self.execute(&formula, data)
    }

    /// Evaluate a parsed formula, substituting `default` on any failure
    ///
    /// The error is logged at `warn` level.
    pub fn execute_or_default<'a>(
        &self,
        formula: &ParsedFormula,
        data: impl Into<RecordInput<'a>>,
        default: FormulaValue,
    ) -> FormulaValue {
        match self.execute(formula, data) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(
                    expression = formula.expression(),
                    %error,
                    %default,
                    "formula evaluation failed; using default"
                );
                default
            }
        }
    }

    /// Evaluate one formula over each record batch
    ///
    /// Results come back in batch order. Validation is not repeated per
    /// batch; call [`FormulaEngine::validate`] first if the formula is
    /// untrusted.
    pub fn evaluate_batches(
        &self,
        formula: &ParsedFormula,
        batches: &[Vec<Record>],
    ) -> (Vec<EvalResult<FormulaValue>>, EvaluationStats) {
        #[cfg(feature = "parallel")]
        let results: Vec<EvalResult<FormulaValue>> = batches
            .par_iter()
            .map(|batch| self.run(formula, RecordInput::from(batch)))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let results: Vec<EvalResult<FormulaValue>> = batches
            .iter()
            .map(|batch| self.run(formula, RecordInput::from(batch)))
            .collect();

        let succeeded = results.iter().filter(|result| result.is_ok()).count();
        let stats = EvaluationStats {
            batches: batches.len(),
            records: batches.iter().map(Vec::len).sum(),
            succeeded,
            failed: results.len() - succeeded,
        };
        tracing::debug!(
            expression = formula.expression(),
            batches = stats.batches,
            failed = stats.failed,
            "evaluated formula batches"
        );
        (results, stats)
    }

    fn resolver(&self) -> &dyn FieldResolver {
        match &self.schema {
            Some(schema) => schema,
            None => &DirectResolver,
        }
    }

    fn run(&self, formula: &ParsedFormula, data: RecordInput<'_>) -> EvalResult<FormulaValue> {
        let ctx = EvaluationContext::new(data)
            .with_resolver(self.resolver())
            .with_options(self.options.evaluation);
        execute_with(formula, &ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrica_formula::EvalError;
    use pretty_assertions::assert_eq;

    fn portfolio() -> Vec<Record> {
        vec![
            Record::new()
                .with("outstanding_balance", 1000.0)
                .with("dpd", 0.0)
                .with("status", "active"),
            Record::new()
                .with("outstanding_balance", 500.0)
                .with("dpd", 95.0)
                .with("status", "active"),
            Record::new()
                .with("outstanding_balance", 500.0)
                .with("dpd", 30.0)
                .with("status", "closed"),
        ]
    }

    fn engine() -> FormulaEngine {
        let schema = Schema::from_fields(["outstanding_balance", "dpd", "status"]).unwrap();
        FormulaEngine::new().with_schema(schema)
    }

    #[test]
    fn test_default_options() {
        let options = EngineOptions::default();
        assert!(options.validate_before_execute);
        assert!(!options.evaluation.strict_fields);
        assert_eq!(options.limits, FormulaLimits::default());
    }

    #[test]
    fn test_evaluate_resolves_aliases() {
        let value = engine()
            .evaluate("SUM(amount WHERE dpd > 90)", &portfolio())
            .unwrap();
        assert_eq!(value, FormulaValue::Number(500.0));
    }

    #[test]
    fn test_execute_refuses_unknown_fields() {
        let engine = engine();
        let formula = engine.parse("SUM(principal)").unwrap();
        assert_eq!(
            engine.execute(&formula, &portfolio()),
            Err(FormulaError::Invalid(vec![
                "Field 'principal' does not exist in product schema".to_string()
            ]))
        );
    }

    #[test]
    fn test_execute_without_validation() {
        let engine = FormulaEngine::with_options(EngineOptions {
            validate_before_execute: false,
            ..Default::default()
        });
        let formula = engine.parse("SUM(principal)").unwrap();
        assert_eq!(
            engine.execute(&formula, &portfolio()),
            Ok(FormulaValue::Number(0.0))
        );
    }

    #[test]
    fn test_strict_fields() {
        let engine = FormulaEngine::with_options(EngineOptions {
            evaluation: EvaluationOptions::strict(),
            validate_before_execute: false,
            ..Default::default()
        });
        assert_eq!(
            engine.evaluate("SUM(principal)", &portfolio()),
            Err(FormulaError::Evaluation(EvalError::MissingField(
                "principal".to_string()
            )))
        );
    }

    #[test]
    fn test_parse_uses_engine_limits() {
        let engine = FormulaEngine::with_options(EngineOptions {
            limits: FormulaLimits {
                max_length: 10,
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(matches!(
            engine.parse("SUM(outstanding_balance)"),
            Err(FormulaError::Security(_))
        ));
    }

    #[test]
    fn test_execute_or_default() {
        let engine = engine();
        let records = portfolio();

        let ok = engine.parse("COUNT(*)").unwrap();
        assert_eq!(
            engine.execute_or_default(&ok, &records, FormulaValue::Null),
            FormulaValue::Number(3.0)
        );

        let failing = engine.parse("SUM(outstanding_balance) / 0").unwrap();
        assert_eq!(
            engine.execute_or_default(&failing, &records, FormulaValue::Number(-1.0)),
            FormulaValue::Number(-1.0)
        );
    }

    #[test]
    fn test_evaluate_batches() {
        let engine = engine();
        let formula = engine
            .parse("SUM(outstanding_balance WHERE status = \"active\") / COUNT(*)")
            .unwrap();

        let batches = vec![portfolio(), Vec::new(), portfolio()[..1].to_vec()];
        let (results, stats) = engine.evaluate_batches(&formula, &batches);

        assert_eq!(
            results,
            vec![
                Ok(FormulaValue::Number(500.0)),
                Err(EvalError::DivisionByZero),
                Ok(FormulaValue::Number(1000.0)),
            ]
        );
        assert_eq!(
            stats,
            EvaluationStats {
                batches: 3,
                records: 4,
                succeeded: 2,
                failed: 1,
            }
        );
    }
}
