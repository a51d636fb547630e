//! Built-in metric functions

pub mod aggregate;
pub mod criteria;
pub mod financial;
pub mod logical;

use crate::error::{EvalError, EvalResult};
use crate::evaluator::{get_function_registry, EvaluationContext, FormulaValue};
use crate::token::Token;
use std::collections::HashMap;

/// Function implementation signature
///
/// Functions receive their arguments as raw token lists, not values: aggregates
/// re-evaluate an argument once per record, and `IF` evaluates only the branch
/// it takes.
pub type FunctionImpl = fn(&[Vec<Token>], &EvaluationContext<'_>) -> EvalResult<FormulaValue>;

/// How a function consumes its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FunctionMode {
    /// Reduces the record list to one value
    Aggregate,
    /// Works on already-reduced values
    Scalar,
    /// Works per record inside an aggregate and on reduced values outside one
    Mixed,
}

/// Function definition
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Input mode
    pub mode: FunctionMode,
    /// One-line description for the function catalog
    pub description: &'static str,
    /// Call syntax for the function catalog
    pub syntax: &'static str,
    /// Implementation
    pub implementation: FunctionImpl,
}

impl FunctionDef {
    /// Check an argument count against the function's arity
    pub fn check_arity(&self, actual: usize) -> EvalResult<()> {
        if actual < self.min_args {
            return Err(EvalError::ArgumentCount {
                function: self.name.to_string(),
                expected: self.expected_args(),
                actual,
            });
        }

        if let Some(max) = self.max_args {
            if actual > max {
                return Err(EvalError::ArgumentCount {
                    function: self.name.to_string(),
                    expected: self.expected_args(),
                    actual,
                });
            }
        }

        Ok(())
    }

    /// Human-readable arity, e.g. "exactly 3" or "at least 1"
    pub fn expected_args(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("exactly {}", max),
            Some(max) if self.min_args == 0 => format!("at most {}", max),
            Some(max) => format!("between {} and {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }
}

/// Function registry
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };

        registry.register_aggregate_functions();
        registry.register_logical_functions();
        registry.register_financial_functions();

        registry
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_uppercase())
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    /// Every registered function, sorted by name
    pub fn definitions(&self) -> Vec<&FunctionDef> {
        let mut defs: Vec<&FunctionDef> = self.functions.values().collect();
        defs.sort_by_key(|def| def.name);
        defs
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn register_aggregate_functions(&mut self) {
        // SUM
        self.register(FunctionDef {
            name: "SUM",
            min_args: 1,
            max_args: Some(1),
            mode: FunctionMode::Aggregate,
            description: "Sum of a value over all matching records",
            syntax: "SUM(value [WHERE condition])",
            implementation: aggregate::fn_sum,
        });

        // AVG
        self.register(FunctionDef {
            name: "AVG",
            min_args: 1,
            max_args: Some(1),
            mode: FunctionMode::Aggregate,
            description: "Mean of the numeric values over all matching records",
            syntax: "AVG(value [WHERE condition])",
            implementation: aggregate::fn_avg,
        });

        // COUNT
        self.register(FunctionDef {
            name: "COUNT",
            min_args: 0,
            max_args: Some(1),
            mode: FunctionMode::Aggregate,
            description: "Number of matching records, or of non-null values",
            syntax: "COUNT([* | value] [WHERE condition])",
            implementation: aggregate::fn_count,
        });

        // MIN
        self.register(FunctionDef {
            name: "MIN",
            min_args: 1,
            max_args: Some(1),
            mode: FunctionMode::Aggregate,
            description: "Smallest numeric value over all matching records",
            syntax: "MIN(value [WHERE condition])",
            implementation: aggregate::fn_min,
        });

        // MAX
        self.register(FunctionDef {
            name: "MAX",
            min_args: 1,
            max_args: Some(1),
            mode: FunctionMode::Aggregate,
            description: "Largest numeric value over all matching records",
            syntax: "MAX(value [WHERE condition])",
            implementation: aggregate::fn_max,
        });

        // MOVING_AVG
        self.register(FunctionDef {
            name: "MOVING_AVG",
            min_args: 2,
            max_args: Some(2),
            mode: FunctionMode::Aggregate,
            description: "Mean of the last `window` numeric values, 0 if there are fewer",
            syntax: "MOVING_AVG(value [WHERE condition], window)",
            implementation: aggregate::fn_moving_avg,
        });
    }

    fn register_logical_functions(&mut self) {
        // IF
        self.register(FunctionDef {
            name: "IF",
            min_args: 3,
            max_args: Some(3),
            mode: FunctionMode::Mixed,
            description: "Choose between two values on a condition",
            syntax: "IF(condition, then, else)",
            implementation: logical::fn_if,
        });
    }

    fn register_financial_functions(&mut self) {
        // RATIO
        self.register(FunctionDef {
            name: "RATIO",
            min_args: 2,
            max_args: Some(2),
            mode: FunctionMode::Scalar,
            description: "numerator / denominator, 0 when the denominator is 0",
            syntax: "RATIO(numerator, denominator)",
            implementation: financial::fn_ratio,
        });

        // PERCENTAGE
        self.register(FunctionDef {
            name: "PERCENTAGE",
            min_args: 2,
            max_args: Some(2),
            mode: FunctionMode::Scalar,
            description: "part / whole * 100, 0 when the whole is 0",
            syntax: "PERCENTAGE(part, whole)",
            implementation: financial::fn_percentage,
        });

        // GROWTH_RATE
        self.register(FunctionDef {
            name: "GROWTH_RATE",
            min_args: 2,
            max_args: Some(2),
            mode: FunctionMode::Scalar,
            description: "(current - previous) / previous * 100, 0 when previous is 0",
            syntax: "GROWTH_RATE(current, previous)",
            implementation: financial::fn_growth_rate,
        });
    }
}

/// The argument at `index`
pub(crate) fn argument<'t>(
    args: &'t [Vec<Token>],
    index: usize,
    function: &str,
) -> EvalResult<&'t [Token]> {
    args.get(index)
        .map(Vec::as_slice)
        .ok_or_else(|| EvalError::ArgumentCount {
            function: function.to_string(),
            expected: format!("at least {}", index + 1),
            actual: args.len(),
        })
}

/// Check whether an upper-cased word names a catalog function
pub fn is_function_name(upper: &str) -> bool {
    get_function_registry().get(upper).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalog_contents() {
        let registry = FunctionRegistry::new();
        let names: Vec<&str> = registry.definitions().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "AVG",
                "COUNT",
                "GROWTH_RATE",
                "IF",
                "MAX",
                "MIN",
                "MOVING_AVG",
                "PERCENTAGE",
                "RATIO",
                "SUM",
            ]
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = FunctionRegistry::new();
        assert!(registry.get("sum").is_some());
        assert!(registry.get("Moving_Avg").is_some());
        assert!(registry.get("MEDIAN").is_none());
    }

    #[test]
    fn test_check_arity() {
        let registry = FunctionRegistry::new();
        let if_def = registry.get("IF").unwrap();
        assert!(if_def.check_arity(3).is_ok());
        assert_eq!(
            if_def.check_arity(2),
            Err(EvalError::ArgumentCount {
                function: "IF".into(),
                expected: "exactly 3".into(),
                actual: 2,
            })
        );

        let count = registry.get("COUNT").unwrap();
        assert!(count.check_arity(0).is_ok());
        assert_eq!(count.expected_args(), "at most 1");
    }

    #[test]
    fn test_is_function_name() {
        assert!(is_function_name("SUM"));
        assert!(is_function_name("GROWTH_RATE"));
        assert!(!is_function_name("AMOUNT"));
    }
}
