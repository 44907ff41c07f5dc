//! S-expression reader.
//!
//! Turns source text into [`Value`] trees. The reader knows nothing about evaluation:
//! `(define x 1)` reads as a plain three-element list.
//!
//! | Syntax                     | Reads as                          |
//! |----------------------------|-----------------------------------|
//! | `42`, `-7`, `#x1F`         | [`Value::Integer`]                |
//! | `2.5`, `-0.5`, `2e3`       | [`Value::Float`]                  |
//! | `#\a`, `#\space`           | [`Value::Char`]                   |
//! | `"text\n"`                 | [`Value::String`]                 |
//! | `t`, `#t`                  | [`Value::True`]                   |
//! | `nil`, `()`, `#f`          | [`Value::Nil`]                    |
//! | `:int`                     | [`Value::Type`] (a reference)     |
//! | `'x`                       | [`Value::Quoted`]                 |
//! | `(a b . c)`                | a chain of pairs                  |
//! | `; to end of line`         | ignored                           |

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, hex_digit1, multispace1, one_of},
    combinator::{cut, opt, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded},
};

use crate::ast::Value;
use crate::types::TypeTag;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters allowed in symbols besides alphanumerics
pub const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$&^~.\\";

const NAMED_CHARS: [(&str, char); 3] = [("space", ' '), ("newline", '\n'), ("tab", '\t')];

type ReadResult<'a> = IResult<&'a str, Value>;

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Symbols cannot look like numbers, and a lone `.` is the dotted-pair marker
fn is_valid_symbol(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match (chars.next(), chars.next()) {
        (Some(first), _) if first.is_ascii_digit() => false,
        (Some('+' | '-' | '.'), Some(second)) if second.is_ascii_digit() => false,
        _ => candidate != ".",
    }
}

fn fail(input: &str, kind: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Stop trying alternatives: the input is recognized but unacceptable
fn reject(input: &str, kind: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, kind))
}

/// A token must not run straight into symbol characters (`123abc`, `#tx`)
fn delimited_token<'a>(rest: &'a str, start: &'a str, token: Value) -> ReadResult<'a> {
    if rest.starts_with(is_symbol_char) {
        Err(fail(start, ErrorKind::Alpha))
    } else {
        Ok((rest, token))
    }
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_while(|c| c != '\n'))).parse(input)
}

/// Whitespace and comments
fn skip(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, comment)))).parse(input)
}

/// Parse a decimal integer or float
fn parse_number(input: &str) -> ReadResult<'_> {
    let (rest, text) = recognize((
        opt(one_of("+-")),
        digit1,
        opt(pair(char('.'), digit1)),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)?;

    let is_float = text.contains(['.', 'e', 'E']);
    let number = if is_float {
        match text.parse::<f64>() {
            Ok(x) => Value::Float(x),
            Err(_) => return Err(fail(input, ErrorKind::Float)),
        }
    } else {
        match text.parse::<i64>() {
            Ok(n) => Value::Integer(n),
            // Only overflow gets here; digits were already matched
            Err(_) => return Err(reject(input, ErrorKind::Digit)),
        }
    };
    delimited_token(rest, input, number)
}

/// Parse a hexadecimal integer (#x or #X prefix)
fn parse_hexadecimal(input: &str) -> ReadResult<'_> {
    let (rest, digits) = preceded(alt((tag("#x"), tag("#X"))), hex_digit1).parse(input)?;
    match i64::from_str_radix(digits, 16) {
        Ok(n) => delimited_token(rest, input, Value::Integer(n)),
        Err(_) => Err(reject(input, ErrorKind::Digit)),
    }
}

/// Parse `#t` or `#f`
fn parse_bool(input: &str) -> ReadResult<'_> {
    let (rest, truth) = alt((value(Value::True, tag("#t")), value(Value::Nil, tag("#f")))).parse(input)?;
    delimited_token(rest, input, truth)
}

/// Parse a character literal: `#\a`, `#\space`, `#\newline`, `#\tab`
fn parse_char(input: &str) -> ReadResult<'_> {
    let (rest, _) = tag("#\\").parse(input)?;
    for (name, ch) in NAMED_CHARS {
        if let Some(after) = rest.strip_prefix(name)
            && !after.starts_with(is_symbol_char)
        {
            return Ok((after, Value::Char(ch)));
        }
    }
    let mut chars = rest.chars();
    match chars.next() {
        Some(ch) => delimited_token(chars.as_str(), input, Value::Char(ch)),
        None => Err(reject(rest, ErrorKind::Eof)),
    }
}

/// Parse a string literal
fn parse_string(input: &str) -> ReadResult<'_> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::string(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(_) => return Err(reject(remaining, ErrorKind::Escaped)),
                    // Backslash at end of input
                    None => return Err(reject(char_iter.as_str(), ErrorKind::Eof)),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            None => return Err(reject(remaining, ErrorKind::Eof)),
        }
    }
}

/// Parse a type reference such as `:number`
fn parse_type(input: &str) -> ReadResult<'_> {
    let (rest, name) = recognize(pair(char(':'), take_while1(is_symbol_char))).parse(input)?;
    Ok((rest, Value::Type(TypeTag::reference(name))))
}

/// Parse a symbol, or one of the constant names `t` and `nil`
fn parse_symbol(input: &str) -> ReadResult<'_> {
    let (rest, candidate) = take_while1(is_symbol_char).parse(input)?;
    if !is_valid_symbol(candidate) {
        return Err(fail(input, ErrorKind::Alpha));
    }
    let symbol = match candidate {
        "t" => Value::True,
        "nil" => Value::Nil,
        name => Value::symbol(name),
    };
    Ok((rest, symbol))
}

/// Anything else starting with `#` is syntax this reader does not know
fn parse_unknown_dispatch(input: &str) -> ReadResult<'_> {
    let (_, _) = char('#').parse(input)?;
    Err(reject(input, ErrorKind::Tag))
}

/// Parse a list, including dotted tails
fn parse_list(input: &str, depth: usize) -> ReadResult<'_> {
    let (mut input, _) = char('(').parse(input)?;
    let mut items = Vec::new();
    let mut tail = Value::Nil;

    loop {
        (input, _) = skip(input)?;
        if let Some(rest) = input.strip_prefix(')') {
            input = rest;
            break;
        }
        if !items.is_empty()
            && let Some(rest) = input.strip_prefix('.')
            && !rest.starts_with(is_symbol_char)
        {
            (input, tail) = cut(|i| parse_sexpr(i, depth + 1)).parse(rest)?;
            (input, _) = skip(input)?;
            (input, _) = cut(char(')')).parse(input)?;
            break;
        }
        let item;
        (input, item) = cut(|i| parse_sexpr(i, depth + 1)).parse(input)?;
        items.push(item);
    }

    let list = items
        .into_iter()
        .rev()
        .fold(tail, |cdr, car| Value::cons(car, cdr));
    Ok((input, list))
}

/// Parse `'expr` as a quoted value
fn parse_quote(input: &str, depth: usize) -> ReadResult<'_> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = cut(|i| parse_sexpr(i, depth + 1)).parse(input)?;
    Ok((input, Value::quoted(expr)))
}

/// Parse one S-expression, skipping leading whitespace and comments
fn parse_sexpr(input: &str, depth: usize) -> ReadResult<'_> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(reject(input, ErrorKind::TooLarge));
    }
    preceded(
        skip,
        alt((
            |input| parse_quote(input, depth),
            |input| parse_list(input, depth),
            parse_char,
            parse_hexadecimal,
            parse_bool,
            parse_unknown_dispatch,
            parse_number,
            parse_string,
            parse_type,
            parse_symbol,
        )),
    )
    .parse(input)
}

/// Convert nom parsing errors to structured parse errors
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    use ParseErrorKind::{ImplementationLimit, Incomplete, InvalidSyntax, TooDeeplyNested, Unsupported};

    let e = match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => return ParseError::from_message(Incomplete, "incomplete input"),
    };
    let offset = input.len().saturating_sub(e.input.len());
    let found: Option<String> = e.input.chars().next().map(String::from);
    let (kind, message) = match e.code {
        ErrorKind::TooLarge => (
            TooDeeplyNested,
            format!("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        ErrorKind::Digit => (ImplementationLimit, format!("integer literal out of range at position {offset}")),
        ErrorKind::Tag if found.as_deref() == Some("#") => {
            (Unsupported, format!("unsupported # syntax at position {offset}"))
        }
        ErrorKind::Escaped => (InvalidSyntax, format!("unknown escape sequence at position {offset}")),
        _ if e.input.trim().is_empty() => (Incomplete, "unexpected end of input".to_owned()),
        _ => (InvalidSyntax, format!("invalid syntax at position {offset}")),
    };
    ParseError::with_context(kind, message, input, offset, found)
}

/// Read exactly one expression from `input`
pub fn read(input: &str) -> Result<Value, Error> {
    let (rest, expr) = parse_sexpr(input, 0).map_err(|e| to_parse_error(input, e))?;
    let (rest, _) = skip(rest).map_err(|e| to_parse_error(input, e))?;
    if rest.is_empty() {
        Ok(expr)
    } else {
        let offset = input.len() - rest.len();
        Err(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!("unexpected remaining input: '{}'", rest.trim_end()),
            input,
            offset,
            rest.chars().next().map(String::from),
        )
        .into())
    }
}

/// Read every expression in `input`, in order
pub fn read_all(input: &str) -> Result<Vec<Value>, Error> {
    let mut exprs = Vec::new();
    let (mut rest, _) = skip(input).map_err(|e| to_parse_error(input, e))?;
    while !rest.is_empty() {
        let expr;
        (rest, expr) = parse_sexpr(rest, 0).map_err(|e| to_parse_error(input, e))?;
        exprs.push(expr);
        (rest, _) = skip(rest).map_err(|e| to_parse_error(input, e))?;
    }
    Ok(exprs)
}
