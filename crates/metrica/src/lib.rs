//! # metrica
//!
//! A small, safe formula language for financial metrics over tabular records.
//!
//! Formulas are text such as `PERCENTAGE(SUM(amount WHERE dpd > 90), SUM(amount))`.
//! They are screened for injection patterns, tokenized and parsed, validated
//! against a product schema, and evaluated against a single record or a list
//! of records. Nothing in the pipeline executes host code.
//!
//! ## Features
//!
//! - Aggregates with `WHERE` filters: SUM, AVG, COUNT, MIN, MAX, MOVING_AVG
//! - Scalar helpers: IF, RATIO, PERCENTAGE, GROWTH_RATE
//! - Semantic validation with errors and warnings
//! - Batch evaluation, fanned out with rayon behind the `parallel` feature
//!
//! ## Example
//!
//! ```rust
//! use metrica::prelude::*;
//!
//! let schema = Schema::from_fields(["amount", "dpd", "status"]).unwrap();
//! let engine = FormulaEngine::new().with_schema(schema);
//!
//! let records = vec![
//!     Record::new().with("amount", 1000.0).with("dpd", 0.0),
//!     Record::new().with("amount", 250.0).with("dpd", 120.0),
//! ];
//!
//! let value = engine
//!     .evaluate("RATIO(SUM(amount WHERE dpd > 90), SUM(amount))", &records)
//!     .unwrap();
//! assert_eq!(value, FormulaValue::Number(0.2));
//!
//! let result = engine.validate("SUM(balance)");
//! assert!(!result.is_valid);
//! ```

pub mod engine;
pub mod prelude;

// Re-export engine types
pub use engine::{EngineOptions, EvaluationStats, FormulaEngine};

// Re-export core types
pub use metrica_core::{is_valid_field_name, FieldValue, Record, RecordInput, Schema};

// Re-export formula types
pub use metrica_formula::{
    execute, execute_with, parse, validate, validate_security, EvalError, EvalResult,
    EvaluationContext, EvaluationOptions, FormulaError, FormulaLimits, FormulaResult,
    FormulaValidator, FormulaValue, FunctionDef, FunctionRegistry, ParseError, ParsedFormula,
    SecurityError, ValidationResult,
};
