//! Security screening of raw expression text
//!
//! Formulas are user-authored and untrusted. Before an expression is tokenized
//! it must pass four checks: a length cap, a scan for code-execution
//! signatures, a character whitelist and a parenthesis nesting cap.

use crate::config::FormulaLimits;
use crate::error::SecurityError;
use once_cell::sync::Lazy;
use regex::Regex;

/// A named code-execution signature
struct CodePattern {
    name: &'static str,
    regex: Regex,
}

static CODE_PATTERNS: Lazy<Vec<CodePattern>> = Lazy::new(|| {
    // Call forms match anywhere, so `my_eval(` is caught too; bare words only
    // match whole, so fields like `system_balance` stay legal
    [
        ("exec", r"(?i)(?:\b(?:shell_)?exec\b|exec\s*\()"),
        ("system", r"(?i)(?:\bsystem\b|system\s*\()"),
        ("process spawning", r"(?i)(?:passthru|popen|proc_open|subprocess)"),
        ("eval", r"(?i)(?:\beval\b|eval\s*\()"),
        ("assert", r"(?i)(?:\bassert\b|assert\s*\()"),
        ("file inclusion", r"(?i)(?:include|require)"),
        ("module import", r"(?i)(?:__import__|\bimport\b|import\s*\()"),
        ("dynamic call", r"(?i)(?:create_function|call_user_func)"),
        ("variable function call", r"\$\w+\s*\("),
        ("object construction", r"(?i)\bnew\s+[a-z_\\]"),
        ("class definition", r"(?i)\bclass\s+[a-z_]"),
        ("function definition", r"(?i)(?:function\s*\(|\blambda\b)"),
    ]
    .into_iter()
    .map(|(name, pattern)| CodePattern {
        name,
        regex: Regex::new(pattern).expect("code pattern must compile"),
    })
    .collect()
});

/// Characters allowed anywhere in an expression, besides ASCII letters,
/// digits and whitespace
const ALLOWED_SYMBOLS: &[char] = &[
    '+', '-', '*', '/', '(', ')', ',', '.', '>', '<', '=', '_', '"', '\'',
];

/// Check an expression with the default limits
///
/// ```rust
/// use metrica_formula::validate_security;
///
/// assert!(validate_security("SUM(amount) / COUNT(*)").is_ok());
/// assert!(validate_security("SUM(amount); system('rm -rf /')").is_err());
/// ```
pub fn validate_security(expression: &str) -> Result<(), SecurityError> {
    validate_security_with(expression, &FormulaLimits::default())
}

/// Check an expression, returning the first problem found
pub fn validate_security_with(
    expression: &str,
    limits: &FormulaLimits,
) -> Result<(), SecurityError> {
    match security_issues_with(expression, limits).into_iter().next() {
        Some(issue) => {
            tracing::debug!(%issue, "expression rejected by security screen");
            Err(issue)
        }
        None => Ok(()),
    }
}

/// Every security problem in an expression, with the default limits
pub fn security_issues(expression: &str) -> Vec<SecurityError> {
    security_issues_with(expression, &FormulaLimits::default())
}

/// Every security problem in an expression
pub fn security_issues_with(expression: &str, limits: &FormulaLimits) -> Vec<SecurityError> {
    let mut issues = Vec::new();

    let length = expression.chars().count();
    if length > limits.max_length {
        issues.push(SecurityError::TooLong {
            length,
            max: limits.max_length,
        });
    }

    for pattern in CODE_PATTERNS.iter() {
        if pattern.regex.is_match(expression) {
            issues.push(SecurityError::ForbiddenPattern(pattern.name.to_string()));
        }
    }

    if let Some(c) = expression.chars().find(|c| !is_allowed_char(*c)) {
        issues.push(SecurityError::ForbiddenCharacter(c));
    }

    match paren_depth(expression) {
        Some(depth) if depth > limits.max_nesting_depth => {
            issues.push(SecurityError::NestingTooDeep {
                depth,
                max: limits.max_nesting_depth,
            });
        }
        Some(_) => {}
        None => issues.push(SecurityError::UnbalancedParentheses),
    }

    issues
}

/// Check a character against the whitelist
pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_whitespace() || ALLOWED_SYMBOLS.contains(&c)
}

/// Maximum parenthesis nesting depth of the raw text
///
/// Returns `None` when parentheses are unbalanced: a `)` arriving before its
/// `(`, or a `(` never closed. Parentheses inside quoted strings are ignored.
pub fn paren_depth(expression: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut max_depth = 0usize;
    let mut quote: Option<char> = None;

    for c in expression.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => {
                    depth += 1;
                    max_depth = max_depth.max(depth);
                }
                ')' => depth = depth.checked_sub(1)?,
                _ => {}
            },
        }
    }

    (depth == 0).then_some(max_depth)
}
