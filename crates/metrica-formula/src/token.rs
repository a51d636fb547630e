//! Formula tokenizer
//!
//! A single left-to-right scan turning an expression into a flat list of
//! [`Token`]s. The scan tracks whether it is inside a quoted string and
//! whether whitespace preceded the current character. Characters outside strings accumulate in a buffer; whitespace and operator
//! characters flush it, and the flushed word is classified as a function name,
//! a number, or a field reference.

use crate::error::ParseError;
use crate::functions;
use std::fmt;

/// Single-character operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
    Comma,
    Dot,
    Greater,
    Less,
    Equal,
}

impl Operator {
    /// Map a character to its operator
    pub fn from_char(c: char) -> Option<Self> {
        let op = match c {
            '+' => Operator::Plus,
            '-' => Operator::Minus,
            '*' => Operator::Star,
            '/' => Operator::Slash,
            '(' => Operator::LeftParen,
            ')' => Operator::RightParen,
            ',' => Operator::Comma,
            '.' => Operator::Dot,
            '>' => Operator::Greater,
            '<' => Operator::Less,
            '=' => Operator::Equal,
            _ => return None,
        };
        Some(op)
    }

    /// The operator's character
    pub fn as_char(self) -> char {
        match self {
            Operator::Plus => '+',
            Operator::Minus => '-',
            Operator::Star => '*',
            Operator::Slash => '/',
            Operator::LeftParen => '(',
            Operator::RightParen => ')',
            Operator::Comma => ',',
            Operator::Dot => '.',
            Operator::Greater => '>',
            Operator::Less => '<',
            Operator::Equal => '=',
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Token category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    String,
    Field,
    Function,
    Operator,
}

/// A lexical unit of an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Numeric literal
    Number(f64),
    /// Quoted string literal (quotes stripped)
    String(String),
    /// Field reference or keyword, as written
    Field(String),
    /// Catalog function, upper-cased
    Function(String),
    /// Operator or punctuation
    Operator(Operator),
}

impl Token {
    /// Token category
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Number(_) => TokenKind::Number,
            Token::String(_) => TokenKind::String,
            Token::Field(_) => TokenKind::Field,
            Token::Function(_) => TokenKind::Function,
            Token::Operator(_) => TokenKind::Operator,
        }
    }

    /// Check for a specific operator
    pub fn is_op(&self, op: Operator) -> bool {
        matches!(self, Token::Operator(o) if *o == op)
    }

    /// The operator, if this is one
    pub fn operator(&self) -> Option<Operator> {
        match self {
            Token::Operator(op) => Some(*op),
            _ => None,
        }
    }

    /// Check for a keyword (a field token matching case-insensitively)
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Field(name) if name.eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Field(name) | Token::Function(name) => write!(f, "{}", name),
            Token::Operator(op) => write!(f, "{}", op),
        }
    }
}

/// Split an expression into tokens
///
/// Fails on an unterminated string literal, and on `>=`, `<=` or `<>` with
/// whitespace between its two characters.
///
/// # Example
/// ```rust
/// use metrica_formula::{tokenize, Operator, Token};
///
/// let tokens = tokenize("SUM(amount) * 1.5").unwrap();
/// assert_eq!(tokens[0], Token::Function("SUM".into()));
/// assert_eq!(tokens[4], Token::Operator(Operator::Star));
/// assert_eq!(tokens[5], Token::Number(1.5));
/// ```
pub fn tokenize(expression: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let mut chars = expression.char_indices().peekable();
    let mut spaced = false;

    while let Some((pos, c)) = chars.next() {
        // String literal: everything up to the matching quote, verbatim
        if c == '"' || c == '\'' {
            flush(&mut buffer, &mut tokens);
            let mut literal = String::new();
            let mut closed = false;
            for (_, ch) in chars.by_ref() {
                if ch == c {
                    closed = true;
                    break;
                }
                literal.push(ch);
            }
            if !closed {
                return Err(ParseError::UnterminatedString(pos));
            }
            tokens.push(Token::String(literal));
            continue;
        }

        if c.is_whitespace() {
            flush(&mut buffer, &mut tokens);
            spaced = true;
            continue;
        }

        if let Some(op) = Operator::from_char(c) {
            // Decimal point: "12.5" and ".5" stay one number
            if op == Operator::Dot {
                if is_digits(&buffer) {
                    buffer.push('.');
                    continue;
                }
                if buffer.is_empty() && chars.peek().map_or(false, |(_, n)| n.is_ascii_digit()) {
                    buffer.push_str("0.");
                    continue;
                }
            }
            flush(&mut buffer, &mut tokens);
            if spaced {
                if let Some(Token::Operator(prev)) = tokens.last() {
                    if let Some(pair) = compound_comparison(*prev, op) {
                        return Err(ParseError::SplitOperator(pair.to_string()));
                    }
                }
            }
            tokens.push(Token::Operator(op));
            spaced = false;
            continue;
        }

        buffer.push(c);
    }

    flush(&mut buffer, &mut tokens);
    Ok(tokens)
}

/// `>=`, `<=` and `<>`, written as two operator characters
fn compound_comparison(first: Operator, second: Operator) -> Option<&'static str> {
    match (first, second) {
        (Operator::Greater, Operator::Equal) => Some(">="),
        (Operator::Less, Operator::Equal) => Some("<="),
        (Operator::Less, Operator::Greater) => Some("<>"),
        _ => None,
    }
}

fn flush(buffer: &mut String, tokens: &mut Vec<Token>) {
    if buffer.is_empty() {
        return;
    }
    tokens.push(classify(buffer));
    buffer.clear();
}

fn classify(word: &str) -> Token {
    let upper = word.to_ascii_uppercase();
    if functions::is_function_name(&upper) {
        return Token::Function(upper);
    }
    if let Some(n) = parse_number(word) {
        return Token::Number(n);
    }
    Token::Field(word.to_string())
}

fn parse_number(word: &str) -> Option<f64> {
    if !word.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    word.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
