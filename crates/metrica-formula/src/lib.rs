//! # metrica-formula
//!
//! Formula language for financial metrics over records.
//!
//! This crate provides:
//! - Security screening of untrusted expression text
//! - Tokenizing and structural parsing (text → [`ParsedFormula`])
//! - Semantic validation against a product schema
//! - Evaluation over a single record or a record list
//! - Built-in functions: SUM, AVG, COUNT, MIN, MAX, MOVING_AVG, IF, RATIO,
//!   PERCENTAGE, GROWTH_RATE
//!
//! ## Example
//!
//! ```rust
//! use metrica_core::Record;
//! use metrica_formula::{execute, parse, FormulaValue};
//!
//! let records = vec![
//!     Record::new().with("amount", 1200.0).with("dpd", 0.0),
//!     Record::new().with("amount", 800.0).with("dpd", 95.0),
//! ];
//!
//! let formula = parse("PERCENTAGE(SUM(amount WHERE dpd > 90), SUM(amount))").unwrap();
//! assert_eq!(execute(&formula, &records).unwrap(), FormulaValue::Number(40.0));
//! ```

pub mod config;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod security;
pub mod token;
pub mod validator;

pub use config::{EvaluationOptions, FormulaLimits};
pub use error::{EvalError, EvalResult, FormulaError, FormulaResult, ParseError, SecurityError};
pub use evaluator::{
    execute, execute_with, get_function_registry, DirectResolver, EvaluationContext,
    FieldResolver, FormulaValue,
};
pub use functions::{FunctionDef, FunctionMode, FunctionRegistry};
pub use parser::{parse, parse_with, ParsedFormula};
pub use security::{security_issues, validate_security};
pub use token::{tokenize, Operator, Token, TokenKind};
pub use validator::{validate, FormulaValidator, ValidationResult};
