//! S-expression reader
//!
//! Turns source text into [`Syntax`] trees for [`crate::parse`]. The grammar:
//!
//! - integers with an optional sign (`42`, `-7`) or `#x` hexadecimal (`#x1A`)
//! - rational literals `n/d`, kept as written (`2/4`); normalization happens in the parser
//! - `#t` and `#f`
//! - strings with `\n \t \r \\ \"` escapes
//! - lists, including `'x` as shorthand for `(quote x)`
//! - symbols: any other run of characters up to whitespace or one of `( ) ' " ;`
//!   that does not start with `#` (a lone `.` is the symbol `.`)
//! - `;` line comments, when enabled in [`ParseConfig`]

use nom::{
    IResult, Parser,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{all_consuming, opt, recognize},
    error::ErrorKind,
    sequence::{pair, preceded, separated_pair},
};

use crate::ast::Syntax;
use crate::environment::Environment;
use crate::evaluator::eval;
use crate::expr::Expr;
use crate::number::NumberType;
use crate::parser::parse;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters that end a symbol or number token
const DELIMITERS: &str = "()'\";";

/// Reader configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseConfig {
    /// Skip `;` line comments
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

fn failure<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, kind)))
}

/// Convert nom parsing errors to structured reader errors
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    let (nom::Err::Error(e) | nom::Err::Failure(e)) = error else {
        return Error::ParseError(ParseError::from_message(
            ParseErrorKind::Incomplete,
            "Incomplete input",
        ));
    };
    let position = input.len().saturating_sub(e.input.len());
    let offset = input[..position].chars().count();
    let found = e.input.chars().next().map(String::from);
    let (kind, message) = match e.code {
        ErrorKind::TooLarge => (
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        ErrorKind::Eof => (
            ParseErrorKind::Incomplete,
            "Unexpected end of input".to_owned(),
        ),
        ErrorKind::Digit => (
            ParseErrorKind::InvalidSyntax,
            format!("Integer literal out of range at position {offset}"),
        ),
        ErrorKind::Char => (
            ParseErrorKind::InvalidSyntax,
            format!("Invalid escape sequence at position {offset}"),
        ),
        _ => (
            ParseErrorKind::InvalidSyntax,
            format!("Invalid syntax at position {offset}"),
        ),
    };
    Error::ParseError(ParseError::with_context(kind, message, input, offset, found))
}

/// Skip whitespace and, if enabled, `;` comments
fn skip_whitespace(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    let mut input = input;
    loop {
        let (rest, _) = multispace0.parse(input)?;
        if config.handle_comments && rest.starts_with(';') {
            let (rest, _) = preceded(char(';'), take_till(|c: char| c == '\n')).parse(rest)?;
            input = rest;
        } else {
            return Ok((rest, ()));
        }
    }
}

fn signed_digits(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(one_of("+-")), digit1)).parse(input)
}

fn to_number<'a>(
    digits: &str,
    rest: &'a str,
) -> Result<NumberType, nom::Err<nom::error::Error<&'a str>>> {
    digits
        .parse::<NumberType>()
        .map_err(|_| nom::Err::Failure(nom::error::Error::new(rest, ErrorKind::Digit)))
}

/// Classify a delimited token as a boolean, number, rational or symbol
fn parse_atom(input: &str) -> IResult<&str, Syntax> {
    let (rest, token) =
        take_while1(|c: char| !c.is_whitespace() && !DELIMITERS.contains(c)).parse(input)?;

    if let Some(prefixed) = token.strip_prefix('#') {
        return match prefixed {
            "t" => Ok((rest, Syntax::Boolean(true))),
            "f" => Ok((rest, Syntax::Boolean(false))),
            _ => match prefixed.strip_prefix(['x', 'X']) {
                Some(hex) if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
                    match NumberType::from_str_radix(hex, 16) {
                        Ok(n) => Ok((rest, Syntax::Number(n))),
                        Err(_) => failure(input, ErrorKind::Digit),
                    }
                }
                _ => failure(input, ErrorKind::HexDigit),
            },
        };
    }

    if let Ok((_, digits)) = all_consuming(signed_digits).parse(token) {
        return Ok((rest, Syntax::Number(to_number(digits, input)?)));
    }
    if let Ok((_, (numer, denom))) =
        all_consuming(separated_pair(signed_digits, char('/'), digit1)).parse(token)
    {
        return Ok((
            rest,
            Syntax::Rational(to_number(numer, input)?, to_number(denom, input)?),
        ));
    }

    Ok((rest, Syntax::Symbol(token.to_owned())))
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Syntax> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Syntax::String(chars))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => return failure(remaining, ErrorKind::Char),
                    None => return failure(char_iter.as_str(), ErrorKind::Eof),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            // Reached end of input without finding closing quote
            None => return failure(remaining, ErrorKind::Eof),
        }
    }
}

fn parse_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Syntax> {
    let (mut input, _) = char('(').parse(input)?;
    let mut elements = Vec::new();
    loop {
        let (rest, _) = skip_whitespace(input, config)?;
        if let Some(rest) = rest.strip_prefix(')') {
            return Ok((rest, Syntax::List(elements)));
        }
        if rest.is_empty() {
            return failure(rest, ErrorKind::Eof);
        }
        let (rest, element) = parse_sexpr(rest, config, depth + 1)?;
        elements.push(element);
        input = rest;
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Syntax> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_sexpr(input, config, depth + 1)?;
    Ok((
        input,
        Syntax::List(vec![Syntax::Symbol("quote".to_owned()), expr]),
    ))
}

fn parse_sexpr(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Syntax> {
    if depth >= MAX_PARSE_DEPTH {
        return failure(input, ErrorKind::TooLarge);
    }
    let (input, _) = skip_whitespace(input, config)?;
    match input.chars().next() {
        None => failure(input, ErrorKind::Eof),
        Some('\'') => parse_quote(input, config, depth),
        Some('(') => parse_list(input, config, depth),
        Some('"') => parse_string(input),
        Some(_) => parse_atom(input),
    }
}

/// Read exactly one datum from `input`
pub fn read(input: &str) -> Result<Syntax, Error> {
    let config = ParseConfig::default();
    let (rest, datum) = parse_sexpr(input, config, 0).map_err(|e| to_parse_error(input, e))?;
    let (rest, _) = skip_whitespace(rest, config).map_err(|e| to_parse_error(input, e))?;
    if rest.is_empty() {
        Ok(datum)
    } else {
        let offset = input[..input.len() - rest.len()].chars().count();
        Err(Error::ParseError(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input: '{rest}'"),
            input,
            offset,
            rest.chars().next().map(String::from),
        )))
    }
}

/// Read every datum in `input`
pub fn read_all(input: &str, config: ParseConfig) -> Result<Vec<Syntax>, Error> {
    let mut data = Vec::new();
    let mut remaining = input;
    loop {
        let (rest, _) = skip_whitespace(remaining, config).map_err(|e| to_parse_error(input, e))?;
        if rest.is_empty() {
            return Ok(data);
        }
        let (rest, datum) = parse_sexpr(rest, config, 0).map_err(|e| to_parse_error(input, e))?;
        data.push(datum);
        remaining = rest;
    }
}

/// Read, parse and evaluate every form in `input`, returning the last value
pub fn run_source(input: &str, env: &Environment) -> Result<Expr, Error> {
    let mut result = Expr::Void;
    for datum in read_all(input, ParseConfig::default())? {
        let expr = parse(&datum, env)?;
        result = eval(&expr, env)?;
    }
    Ok(result)
}
