//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Result type for evaluation
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Expression text rejected before tokenization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// Expression longer than the configured maximum
    #[error("Expression is too long: {length} characters (max {max})")]
    TooLong { length: usize, max: usize },

    /// Expression matches a code-execution signature
    #[error("Expression contains forbidden pattern: {0}")]
    ForbiddenPattern(String),

    /// Expression contains a character outside the whitelist
    #[error("Expression contains forbidden character: '{0}'")]
    ForbiddenCharacter(char),

    /// Parentheses nested deeper than the configured maximum
    #[error("Parentheses nested too deeply: {depth} levels (max {max})")]
    NestingTooDeep { depth: usize, max: usize },

    /// A `)` without its `(`, or an unclosed `(`
    #[error("Expression has unbalanced parentheses")]
    UnbalancedParentheses,
}

/// Structural problems found while tokenizing or parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Nothing but whitespace
    #[error("Formula expression cannot be empty")]
    Empty,

    /// Unmatched parenthesis
    #[error("Unbalanced parentheses")]
    UnbalancedParentheses,

    /// String literal without its closing quote
    #[error("Unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    /// `> =`, `< =` or `< >`: a two-character comparison split by whitespace
    #[error("Comparison operator '{0}' must not contain whitespace")]
    SplitOperator(String),

    /// `F()` for a function that requires arguments
    #[error("Function {0} called without arguments")]
    EmptyCall(String),

    /// `F(, x)`
    #[error("Function {0} has a leading comma")]
    LeadingComma(String),

    /// `F(x, )`
    #[error("Function {0} has a trailing comma")]
    TrailingComma(String),

    /// `F(x, , y)`
    #[error("Function {0} has an empty argument")]
    EmptyArgument(String),

    /// Two binary operators in a row
    #[error("Consecutive operators '{0}' and '{1}'")]
    ConsecutiveOperators(String, String),

    /// Expression starts or ends with a binary operator, or misses an operand
    #[error("Incomplete expression: {0}")]
    IncompleteExpression(String),

    /// `()` used for grouping
    #[error("Empty parentheses")]
    EmptyGroup,

    /// A token that cannot appear where it was found
    #[error("Unexpected token '{0}'")]
    UnexpectedToken(String),

    /// Malformed `WHERE` condition
    #[error("Invalid WHERE condition: {0}")]
    InvalidCondition(String),
}

/// Errors raised while evaluating a parsed formula
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// `x / 0` in the arithmetic pass
    #[error("Division by zero")]
    DivisionByZero,

    /// Function name outside the catalog
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),

    /// Non-numeric value where a number is required, or incomparable values
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Field absent from the record (strict mode only)
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Bare field reference while evaluating over a record list
    #[error("Field '{0}' referenced outside an aggregate function while evaluating a record list")]
    NoRecordContext(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Argument value out of range
    #[error("Invalid argument for {function}: {message}")]
    InvalidArgument { function: String, message: String },

    /// Structural problem surfaced during evaluation
    #[error(transparent)]
    Syntax(#[from] ParseError),
}

/// Any error produced by the formula pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Rejected by the security screen
    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    /// Rejected by the tokenizer or parser
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Failed during evaluation
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvalError),

    /// Semantic validation reported errors
    #[error("Invalid formula: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
