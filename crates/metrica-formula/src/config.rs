//! Limits and evaluation options

/// Size and complexity limits applied by the security screen and the validator
///
/// The hard limits bound the CPU cost of a single evaluation, so callers never
/// need to cancel one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FormulaLimits {
    /// Maximum expression length in characters (default: 1000)
    pub max_length: usize,
    /// Maximum parenthesis nesting depth (default: 10)
    pub max_nesting_depth: usize,
    /// Nesting depth above which a warning is issued (default: 5)
    pub warn_nesting_depth: usize,
    /// Maximum token count (default: 100)
    pub max_tokens: usize,
    /// Token count above which a warning is issued (default: 50)
    pub warn_tokens: usize,
    /// Maximum number of distinct field references (default: 20)
    pub max_fields: usize,
    /// Distinct field count above which a warning is issued (default: 10)
    pub warn_fields: usize,
    /// Uses of one function above which a warning is issued (default: 5)
    pub warn_function_repeats: usize,
}

impl Default for FormulaLimits {
    fn default() -> Self {
        Self {
            max_length: 1000,
            max_nesting_depth: 10,
            warn_nesting_depth: 5,
            max_tokens: 100,
            warn_tokens: 50,
            max_fields: 20,
            warn_fields: 10,
            warn_function_repeats: 5,
        }
    }
}

/// Options for a single evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EvaluationOptions {
    /// Fail with [`EvalError::MissingField`](crate::EvalError::MissingField)
    /// when a record lacks a referenced field, instead of reading it as 0
    pub strict_fields: bool,
}

impl EvaluationOptions {
    /// Options with strict field resolution
    pub fn strict() -> Self {
        Self {
            strict_fields: true,
        }
    }
}
