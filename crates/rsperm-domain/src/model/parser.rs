//! Parser for permission rule text.
//!
//! Parses rules such as `"is owner OR (is editor AND NOT is suspended)"` into
//! [`RuleExpr`] trees.
//!
//! Grammar:
//! ```text
//! rule    := or_expr
//! or_expr := and_expr ("OR" and_expr)*
//! and_expr:= unary ("AND" unary)*
//! unary   := "NOT" unary | "(" or_expr ")" | check
//! check   := word (whitespace word)*
//! ```
//!
//! Keywords are upper-case only, so check names may contain the lower-case
//! words `and`, `or` and `not`. Both binary operators are left-associative.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, cut, map, not, verify},
    error::{context, ContextError, ParseError, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, terminated},
    IResult,
};

use super::RuleExpr;

/// Parser error type with context for better error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl ParserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn with_position(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "{} at position {}", self.message, pos)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ParserError {}

/// Result type for parser operations.
pub type ParserResult<T> = Result<T, ParserError>;

// ============ Helper Parsers ============

/// Reserved operator keywords
const KEYWORDS: &[&str] = &["AND", "OR", "NOT"];

fn is_keyword(s: &str) -> bool {
    KEYWORDS.contains(&s)
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')'
}

/// Parse one word of a check name (anything but whitespace and parentheses)
fn word<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, &'a str, E> {
    verify(take_while1(is_word_char), |w: &str| !is_keyword(w))(input)
}

/// Parse a keyword that is not the prefix of a longer word
fn keyword<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    kw: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
    terminated(tag(kw), not(take_while1(is_word_char)))
}

// ============ Expression Parsers ============

/// Parse a check name made of one or more words
fn check_reference<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RuleExpr, E> {
    context(
        "check name",
        map(separated_list1(multispace1, word), |words: Vec<&str>| {
            RuleExpr::Check(words.join(" "))
        }),
    )(input)
}

/// Parse "( expr )"
fn parenthesised<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RuleExpr, E> {
    context(
        "parenthesised expression",
        delimited(
            char('('),
            cut(parse_or_level),
            cut(preceded(multispace0, char(')'))),
        ),
    )(input)
}

/// Parse "NOT unary" (highest precedence)
fn negation<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RuleExpr, E> {
    context(
        "negation",
        map(preceded(keyword("NOT"), cut(parse_unary)), RuleExpr::negate),
    )(input)
}

fn parse_unary<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RuleExpr, E> {
    preceded(multispace0, alt((parenthesised, negation, check_reference)))(input)
}

/// Parse AND level (binds tighter than OR)
fn parse_and_level<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RuleExpr, E> {
    let (rest, first) = parse_unary(input)?;

    let (rest, operands) = many0(preceded(
        preceded(multispace0, keyword("AND")),
        cut(parse_unary),
    ))(rest)?;

    Ok((rest, operands.into_iter().fold(first, RuleExpr::and)))
}

/// Parse OR level (lowest precedence)
fn parse_or_level<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RuleExpr, E> {
    let (rest, first) = parse_and_level(input)?;

    let (rest, operands) = many0(preceded(
        preceded(multispace0, keyword("OR")),
        cut(parse_and_level),
    ))(rest)?;

    Ok((rest, operands.into_iter().fold(first, RuleExpr::or)))
}

// ============ Error Reporting ============

fn describe_failure(input: &str, error: &VerboseError<&str>) -> ParserError {
    let remaining = error
        .errors
        .first()
        .map(|(rest, _)| *rest)
        .unwrap_or(input)
        .trim_start();
    let position = input.len() - remaining.len();

    let expected_close = error
        .errors
        .iter()
        .any(|(_, kind)| matches!(kind, VerboseErrorKind::Char(')')));

    let message = if expected_close {
        "unbalanced parentheses: expected ')'".to_string()
    } else if remaining.is_empty() {
        "missing operand".to_string()
    } else if remaining.starts_with(')') {
        "unbalanced parentheses: unexpected ')'".to_string()
    } else if let Some(kw) = KEYWORDS
        .iter()
        .copied()
        .find(|kw| keyword::<VerboseError<&str>>(*kw)(remaining).is_ok())
    {
        format!("missing operand before '{kw}'")
    } else {
        format!("unexpected input '{}'", remaining.chars().take(20).collect::<String>())
    };

    ParserError::with_position(message, position)
}

// ============ Public API ============

/// Parse permission rule text into a [`RuleExpr`].
///
/// # Example
///
/// ```ignore
/// let rule = parse_rule("is owner OR NOT is suspended")?;
/// ```
pub fn parse_rule(input: &str) -> ParserResult<RuleExpr> {
    if input.trim().is_empty() {
        return Err(ParserError::new("empty permission expression"));
    }

    match all_consuming(terminated(
        parse_or_level::<VerboseError<&str>>,
        multispace0,
    ))(input)
    {
        Ok((_, rule)) => Ok(rule),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(describe_failure(input, &e)),
        Err(nom::Err::Incomplete(_)) => Err(ParserError::new("incomplete input")),
    }
}
