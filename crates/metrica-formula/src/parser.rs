//! Formula parser
//!
//! Parsing is a gate, not a tree builder: the expression passes the security
//! screen, is tokenized, and the token list is checked for structural
//! problems. The result, a [`ParsedFormula`], keeps the tokens for the
//! evaluator and the set of fields the expression reads.

use crate::config::FormulaLimits;
use crate::error::{FormulaResult, ParseError};
use crate::evaluator::get_function_registry;
use crate::functions::criteria::{self, Condition};
use crate::functions::FunctionMode;
use crate::security::validate_security_with;
use crate::token::{tokenize, Operator, Token};
use ahash::AHashSet;

/// A tokenized, structurally valid expression
///
/// Immutable once built; share it behind an `Arc` to evaluate the same
/// formula from several threads.
#[derive(Debug, Clone)]
pub struct ParsedFormula {
    expression: String,
    tokens: Vec<Token>,
    field_references: AHashSet<String>,
}

impl ParsedFormula {
    /// The source text
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Tokens in source order
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Distinct field names the expression reads
    pub fn field_references(&self) -> &AHashSet<String> {
        &self.field_references
    }

    /// Distinct field names, sorted
    pub fn sorted_field_references(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.field_references.iter().map(String::as_str).collect();
        fields.sort_unstable();
        fields
    }

    /// Check whether the expression reads a field
    pub fn references_field(&self, name: &str) -> bool {
        self.field_references.contains(name)
    }

    /// Every function call, nested calls included
    pub fn function_calls(&self) -> Vec<CallSite> {
        function_calls(&self.tokens)
    }
}

/// Parse an expression with the default limits
///
/// # Example
/// ```rust
/// use metrica_formula::parse;
///
/// let formula = parse("SUM(amount WHERE status = \"active\") / COUNT(*)").unwrap();
/// assert_eq!(formula.sorted_field_references(), vec!["amount", "status"]);
/// ```
pub fn parse(expression: &str) -> FormulaResult<ParsedFormula> {
    parse_with(expression, &FormulaLimits::default())
}

/// Parse an expression
///
/// Fails on the first problem: security, then tokenization, then structure.
pub fn parse_with(expression: &str, limits: &FormulaLimits) -> FormulaResult<ParsedFormula> {
    if expression.trim().is_empty() {
        return Err(ParseError::Empty.into());
    }

    validate_security_with(expression, limits)?;
    let tokens = tokenize(expression)?;

    if let Some(error) = check_structure(&tokens).into_iter().next() {
        tracing::debug!(expression, %error, "formula failed structural checks");
        return Err(error.into());
    }

    let field_references = extract_field_references(&tokens);
    tracing::debug!(
        expression,
        tokens = tokens.len(),
        fields = field_references.len(),
        "parsed formula"
    );

    Ok(ParsedFormula {
        expression: expression.to_string(),
        tokens,
        field_references,
    })
}

/// Field names read by a token list
///
/// Keywords (`WHERE`, `AND`) and names directly followed by `(` are not field
/// references.
pub fn extract_field_references(tokens: &[Token]) -> AHashSet<String> {
    tokens
        .iter()
        .enumerate()
        .filter_map(|(i, token)| match token {
            Token::Field(name) if !criteria::is_reserved(name) && !is_call_start(tokens, i) => {
                Some(name.clone())
            }
            _ => None,
        })
        .collect()
}

/// A function call located in a token list
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Upper-cased function name
    pub name: String,
    /// Argument token lists
    pub args: Vec<Vec<Token>>,
    /// Index of the closing `)`
    pub end: usize,
}

/// A function call and its argument count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub name: String,
    pub arg_count: usize,
}

/// Check whether the token at `index` starts a call: a name followed by `(`
pub fn is_call_start(tokens: &[Token], index: usize) -> bool {
    let named = match tokens.get(index) {
        Some(Token::Function(_)) => true,
        Some(Token::Field(name)) => !criteria::is_reserved(name),
        _ => false,
    };
    named
        && tokens
            .get(index + 1)
            .map_or(false, |t| t.is_op(Operator::LeftParen))
}

/// Read the call starting at `index`
///
/// Commas at the call's own depth split arguments; `F()` has no arguments,
/// while `F(a,)` has two, the second empty.
pub fn function_call_at(tokens: &[Token], index: usize) -> Result<FunctionCall, ParseError> {
    let name = match tokens.get(index) {
        Some(Token::Function(name)) => name.clone(),
        Some(Token::Field(name)) => name.to_ascii_uppercase(),
        Some(token) => return Err(ParseError::UnexpectedToken(token.to_string())),
        None => return Err(ParseError::IncompleteExpression("missing function name".into())),
    };
    if !tokens
        .get(index + 1)
        .map_or(false, |t| t.is_op(Operator::LeftParen))
    {
        return Err(ParseError::IncompleteExpression(format!(
            "function {} must be followed by '('",
            name
        )));
    }

    let mut depth = 0usize;
    let mut args: Vec<Vec<Token>> = Vec::new();
    let mut current: Vec<Token> = Vec::new();

    for (offset, token) in tokens[index + 1..].iter().enumerate() {
        match token {
            Token::Operator(Operator::LeftParen) => {
                depth += 1;
                if depth > 1 {
                    current.push(token.clone());
                }
            }
            Token::Operator(Operator::RightParen) => {
                depth -= 1;
                if depth == 0 {
                    if !current.is_empty() || !args.is_empty() {
                        args.push(current);
                    }
                    return Ok(FunctionCall {
                        name,
                        args,
                        end: index + 1 + offset,
                    });
                }
                current.push(token.clone());
            }
            Token::Operator(Operator::Comma) if depth == 1 => {
                args.push(std::mem::take(&mut current));
            }
            _ => current.push(token.clone()),
        }
    }

    Err(ParseError::UnbalancedParentheses)
}

/// Argument token lists of the call starting at `index`
pub fn extract_function_arguments(
    tokens: &[Token],
    index: usize,
) -> Result<Vec<Vec<Token>>, ParseError> {
    function_call_at(tokens, index).map(|call| call.args)
}

/// Every well-formed call in a token list, outer calls before the calls
/// nested in them
pub fn function_calls(tokens: &[Token]) -> Vec<CallSite> {
    (0..tokens.len())
        .filter(|&i| is_call_start(tokens, i))
        .filter_map(|i| function_call_at(tokens, i).ok())
        .map(|call| CallSite {
            arg_count: call.args.len(),
            name: call.name,
        })
        .collect()
}

/// Every structural problem in a token list
pub fn check_structure(tokens: &[Token]) -> Vec<ParseError> {
    let mut errors = Vec::new();

    if tokens.is_empty() {
        errors.push(ParseError::Empty);
        return errors;
    }

    if !parens_balanced(tokens) {
        errors.push(ParseError::UnbalancedParentheses);
        return errors;
    }

    for i in 0..tokens.len() {
        if !is_call_start(tokens, i) {
            continue;
        }
        match function_call_at(tokens, i) {
            Ok(call) => check_call(&call, &mut errors),
            Err(error) => errors.push(error),
        }
    }

    check_sequence(tokens, &mut errors);
    errors
}

fn parens_balanced(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::Operator(Operator::LeftParen) => depth += 1,
            Token::Operator(Operator::RightParen) => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0
}

fn check_call(call: &FunctionCall, errors: &mut Vec<ParseError>) {
    let def = get_function_registry().get(&call.name);

    if call.args.is_empty() {
        let needs_args = def.map_or(false, |def| def.min_args > 0);
        if needs_args {
            errors.push(ParseError::EmptyCall(call.name.clone()));
        }
        return;
    }

    let last = call.args.len() - 1;
    for (i, arg) in call.args.iter().enumerate() {
        if arg.is_empty() {
            let error = if i == 0 {
                ParseError::LeadingComma(call.name.clone())
            } else if i == last {
                ParseError::TrailingComma(call.name.clone())
            } else {
                ParseError::EmptyArgument(call.name.clone())
            };
            errors.push(error);
            continue;
        }

        if let Some((value, condition)) = criteria::split_where(arg) {
            if !def.map_or(false, |def| def.mode == FunctionMode::Aggregate) {
                errors.push(ParseError::InvalidCondition(format!(
                    "WHERE is only allowed in aggregate functions, not {}",
                    call.name
                )));
                continue;
            }
            if value.is_empty() && call.name != "COUNT" {
                errors.push(ParseError::InvalidCondition(format!(
                    "{} needs a value before WHERE",
                    call.name
                )));
            }
            if let Err(error) = Condition::parse(condition) {
                errors.push(error);
            }
        }
    }
}

/// What the previous token left the scan expecting
#[derive(Debug, Clone, Copy, PartialEq)]
enum Prev {
    /// Start of an expression: beginning, after `(` or after `,`
    Start,
    /// A complete operand
    Operand,
    /// A binary operator; `true` once it has absorbed a second character
    Op(Operator, bool),
}

/// Paren kinds on the scan stack
#[derive(Debug, Clone, Copy, PartialEq)]
enum Frame {
    Call { name_is_count: bool },
    Group,
}

fn check_sequence(tokens: &[Token], errors: &mut Vec<ParseError>) {
    let mut frames: Vec<Frame> = Vec::new();
    let mut prev = Prev::Start;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];

        // A WHERE condition runs to the end of its argument; Condition::parse
        // checks it
        if token.is_keyword(criteria::WHERE) {
            if !matches!(frames.last(), Some(Frame::Call { .. })) {
                errors.push(ParseError::InvalidCondition(
                    "WHERE is only allowed inside a function call".into(),
                ));
            }
            i = end_of_argument(tokens, i + 1);
            prev = Prev::Operand;
            continue;
        }

        match token {
            Token::Operator(Operator::LeftParen) => {
                let is_call = i > 0 && is_call_start(tokens, i - 1);
                if !is_call {
                    if prev == Prev::Operand {
                        errors.push(ParseError::UnexpectedToken("(".into()));
                    }
                    if tokens
                        .get(i + 1)
                        .map_or(false, |t| t.is_op(Operator::RightParen))
                    {
                        errors.push(ParseError::EmptyGroup);
                    }
                }
                frames.push(if is_call {
                    Frame::Call {
                        name_is_count: matches!(&tokens[i - 1], Token::Function(n) if n == "COUNT"),
                    }
                } else {
                    Frame::Group
                });
                prev = Prev::Start;
            }
            Token::Operator(Operator::RightParen) => {
                if let Prev::Op(op, _) = prev {
                    errors.push(ParseError::IncompleteExpression(format!(
                        "'{}' before ')'",
                        op
                    )));
                }
                frames.pop();
                prev = Prev::Operand;
            }
            Token::Operator(Operator::Comma) => {
                if !matches!(frames.last(), Some(Frame::Call { .. })) {
                    errors.push(ParseError::UnexpectedToken(",".into()));
                }
                if let Prev::Op(op, _) = prev {
                    errors.push(ParseError::IncompleteExpression(format!(
                        "'{}' before ','",
                        op
                    )));
                }
                prev = Prev::Start;
            }
            Token::Operator(Operator::Dot) => {
                errors.push(ParseError::UnexpectedToken(".".into()));
            }
            Token::Operator(op) => {
                prev = check_operator(tokens, i, *op, prev, frames.last(), errors);
            }
            Token::Function(name) => {
                if prev == Prev::Operand {
                    errors.push(ParseError::UnexpectedToken(name.clone()));
                }
                if !is_call_start(tokens, i) {
                    errors.push(ParseError::IncompleteExpression(format!(
                        "function {} must be followed by '('",
                        name
                    )));
                }
                prev = Prev::Operand;
            }
            _ => {
                if token.is_keyword(criteria::AND) || prev == Prev::Operand {
                    errors.push(ParseError::UnexpectedToken(token.to_string()));
                }
                prev = Prev::Operand;
            }
        }

        i += 1;
    }

    if let Prev::Op(op, _) = prev {
        errors.push(ParseError::IncompleteExpression(format!(
            "expression ends with '{}'",
            op
        )));
    }
}

fn check_operator(
    tokens: &[Token],
    index: usize,
    op: Operator,
    prev: Prev,
    frame: Option<&Frame>,
    errors: &mut Vec<ParseError>,
) -> Prev {
    let is_sign = matches!(op, Operator::Plus | Operator::Minus);

    match prev {
        Prev::Operand => Prev::Op(op, false),
        Prev::Start => {
            // COUNT(*)
            let wildcard = op == Operator::Star
                && matches!(frame, Some(Frame::Call { name_is_count: true }))
                && index > 0
                && tokens[index - 1].is_op(Operator::LeftParen)
                && ends_argument(tokens.get(index + 1));
            if wildcard {
                return Prev::Operand;
            }
            if !is_sign {
                errors.push(ParseError::IncompleteExpression(format!(
                    "expression starts with '{}'",
                    op
                )));
            }
            Prev::Op(op, false)
        }
        Prev::Op(previous, compound) => {
            let pairs = matches!(
                (previous, op),
                (Operator::Greater, Operator::Equal)
                    | (Operator::Less, Operator::Equal)
                    | (Operator::Less, Operator::Greater)
            );
            if pairs && !compound {
                return Prev::Op(op, true);
            }
            if !is_sign {
                errors.push(ParseError::ConsecutiveOperators(
                    previous.to_string(),
                    op.to_string(),
                ));
            }
            Prev::Op(op, false)
        }
    }
}

/// `,`, `)`, or `WHERE` closes the value part of an argument
fn ends_argument(token: Option<&Token>) -> bool {
    match token {
        Some(Token::Operator(Operator::RightParen | Operator::Comma)) => true,
        Some(token) => token.is_keyword(criteria::WHERE),
        None => false,
    }
}

/// Index of the `,` or `)` closing the argument that contains `start`
fn end_of_argument(tokens: &[Token], start: usize) -> usize {
    let mut depth = 0usize;
    for (offset, token) in tokens[start..].iter().enumerate() {
        match token {
            Token::Operator(Operator::LeftParen) => depth += 1,
            Token::Operator(Operator::RightParen) => {
                if depth == 0 {
                    return start + offset;
                }
                depth -= 1;
            }
            Token::Operator(Operator::Comma) if depth == 0 => return start + offset,
            _ => {}
        }
    }
    tokens.len()
}
