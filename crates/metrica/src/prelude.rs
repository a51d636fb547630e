//! Prelude module - common imports for metrica users
//!
//! ```rust
//! use metrica::prelude::*;
//! ```

pub use crate::{
    // Engine types
    EngineOptions,
    // Error types
    EvalError,
    EvalResult,
    EvaluationOptions,
    EvaluationStats,
    // Data types
    FieldValue,
    FormulaEngine,
    FormulaError,
    FormulaLimits,
    FormulaResult,
    // Formula types
    FormulaValue,
    ParsedFormula,
    Record,
    RecordInput,
    Schema,
    ValidationResult,
};
