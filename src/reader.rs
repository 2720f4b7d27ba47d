// ABOUTME: The reader: text to `Value` (core §6)
//
// The original's reader is a single recursive-descent `lread` that peeks
// one character at a time off a buffered stream. This keeps that recursive
// shape but tokenizes leaf atoms (numbers, strings, bare symbols) with
// `nom` combinators the way the teacher's own parser does, rather than
// hand-rolling character classification for every token kind.

use crate::error::Fatal;
use crate::interp::Interp;
use crate::value::Value;
use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, digit1, none_of};
use nom::combinator::{map, opt, recognize};
use nom::multi::many0;
use nom::sequence::pair;
use nom::IResult;

fn signal_to_nom_err(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Fail))
}

/// Reads the first complete form from `src`, ignoring any trailing input.
pub fn read_one(interp: &mut Interp, src: &str) -> Result<Value, Fatal> {
    let rest = skip_ws_and_comments(src);
    if rest.is_empty() {
        return Err(Fatal::ReadError("unexpected end of input".to_string()));
    }
    let (_, value) = read_form(interp, rest).map_err(|e| Fatal::ReadError(format!("{e}")))?;
    Ok(value)
}

/// Reads every top-level form in `src` in order, the shape the CLI's file
/// loader and script runner need (§6: "each is loaded, read+eval to EOF").
pub fn read_all(interp: &mut Interp, src: &str) -> Result<Vec<Value>, Fatal> {
    let mut forms = Vec::new();
    let mut rest = src;
    loop {
        rest = skip_ws_and_comments(rest);
        if rest.is_empty() {
            return Ok(forms);
        }
        let (remaining, value) = read_form(interp, rest).map_err(|e| Fatal::ReadError(format!("{e}")))?;
        forms.push(value);
        rest = remaining;
    }
}

fn skip_ws_and_comments(mut input: &str) -> &str {
    loop {
        let trimmed = input.trim_start();
        if trimmed.starts_with(';') {
            match trimmed.find('\n') {
                Some(pos) => input = &trimmed[pos + 1..],
                None => return "",
            }
        } else {
            return trimmed;
        }
    }
}

fn read_form<'a>(interp: &mut Interp, input: &'a str) -> IResult<&'a str, Value> {
    let input = skip_ws_and_comments(input);
    if let Some(rest) = input.strip_prefix('(') {
        return read_list(interp, rest);
    }
    if let Some(rest) = input.strip_prefix('\'') {
        let (rest, inner) = read_form(interp, rest)?;
        let v = quote_wrap(interp, "QUOTE", inner).map_err(|_| signal_to_nom_err(input))?;
        return Ok((rest, v));
    }
    if let Some(rest) = input.strip_prefix("#'") {
        let (rest, inner) = read_form(interp, rest)?;
        let v = quote_wrap(interp, "FUNCTION", inner).map_err(|_| signal_to_nom_err(input))?;
        return Ok((rest, v));
    }
    if let Some(rest) = input.strip_prefix(",@") {
        let (rest, inner) = read_form(interp, rest)?;
        let v = quote_wrap(interp, "UNQUOTE-SPLICING", inner).map_err(|_| signal_to_nom_err(input))?;
        return Ok((rest, v));
    }
    if let Some(rest) = input.strip_prefix(',') {
        let (rest, inner) = read_form(interp, rest)?;
        let v = quote_wrap(interp, "UNQUOTE", inner).map_err(|_| signal_to_nom_err(input))?;
        return Ok((rest, v));
    }
    if let Some(rest) = input.strip_prefix('`') {
        let (rest, inner) = read_form(interp, rest)?;
        let v = quote_wrap(interp, "QUASIQUOTE", inner).map_err(|_| signal_to_nom_err(input))?;
        return Ok((rest, v));
    }
    if input.starts_with('"') {
        let (rest, s) = string_literal(input)?;
        let v = interp
            .alloc_jref(crate::heap::JrefObject::SimpleString(s))
            .map_err(|_| signal_to_nom_err(input))?;
        return Ok((rest, v));
    }
    let (rest, token) = atom_token(input)?;
    let value = interpret_token(interp, token).map_err(|_| signal_to_nom_err(input))?;
    Ok((rest, value))
}

fn quote_wrap(interp: &mut Interp, operator: &str, inner: Value) -> Result<Value, crate::error::Signal> {
    let op_sym = interp.intern(operator);
    let tail = interp.alloc_cons(inner, Value::Nil)?;
    interp.alloc_cons(Value::Iref(op_sym), tail)
}

fn read_list<'a>(interp: &mut Interp, mut input: &'a str) -> IResult<&'a str, Value> {
    let mut items = Vec::new();
    let mut tail = Value::Nil;
    loop {
        input = skip_ws_and_comments(input);
        if let Some(rest) = input.strip_prefix(')') {
            input = rest;
            break;
        }
        if input.is_empty() {
            return Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Eof)));
        }
        if let Some(rest) = input.strip_prefix('.') {
            // Only a dotted tail if '.' is followed by whitespace/paren, not
            // the start of a symbol like `.5` or `...`.
            if rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
                let (rest, value) = read_form(interp, rest)?;
                tail = value;
                let rest = skip_ws_and_comments(rest);
                let rest = rest.strip_prefix(')').ok_or_else(|| {
                    nom::Err::Failure(nom::error::Error::new(rest, nom::error::ErrorKind::Eof))
                })?;
                input = rest;
                break;
            }
        }
        let (rest, value) = read_form(interp, input)?;
        items.push(value);
        input = rest;
    }
    let mut result = tail;
    for item in items.into_iter().rev() {
        result = interp
            .alloc_cons(item, result)
            .map_err(|_| signal_to_nom_err(input))?;
    }
    Ok((input, result))
}

fn string_literal(input: &str) -> IResult<&str, String> {
    let (rest, _) = char('"')(input)?;
    let (rest, chars) = many0(alt((
        map(pair(char('\\'), none_of("")), |(_, c)| c),
        none_of("\"\\"),
    )))(rest)?;
    let (rest, _) = char('"')(rest)?;
    Ok((rest, chars.into_iter().collect()))
}

fn atom_token(input: &str) -> IResult<&str, &str> {
    recognize(take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')' && c != '"' && c != ';' && c != '\''))(input)
}

/// Matches a complete numeric literal: `[sign] digits [. digits]`, read as
/// a double and narrowed to a fixnum when lossless (§6).
fn numeric_literal(input: &str) -> IResult<&str, f64> {
    let (rest, text) = recognize(pair(
        opt(alt((char('-'), char('+')))),
        pair(digit1, opt(pair(char('.'), digit1))),
    ))(input)?;
    let value: f64 = text.parse().map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
    })?;
    Ok((rest, value))
}

fn interpret_token(interp: &mut Interp, token: &str) -> Result<Value, crate::error::Signal> {
    if let Ok((_, n)) = numeric_literal_complete(token) {
        if n.fract() == 0.0 && n.is_finite() && n.abs() < i64::MAX as f64 {
            return Ok(Value::Fixnum(n as i64));
        }
        return interp.alloc_jref(crate::heap::JrefObject::Double(n));
    }
    if token.eq_ignore_ascii_case("NIL") {
        return Ok(Value::Nil);
    }
    if let Some(name) = token.strip_prefix(':') {
        let sym = interp.intern_keyword(&name.to_uppercase());
        return Ok(Value::Iref(sym));
    }
    let sym = interp.intern(&token.to_uppercase());
    Ok(Value::Iref(sym))
}

fn numeric_literal_complete(token: &str) -> IResult<&str, f64> {
    let (rest, n) = numeric_literal(token)?;
    if rest.is_empty() {
        Ok((rest, n))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(token, nom::error::ErrorKind::Eof)))
    }
}
