// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive-descent Recon parser.
//!
//! The full expression grammar keeps its precedence chain (lambda →
//! conditional → logical → bitwise → comparison → attr-expression →
//! additive → multiplicative → prefix → invoke → primary), but the operator
//! productions are reserved: each delegates to the next tighter level and
//! never consumes an operator token. Envelope traffic only exercises
//! attr-expression → primary.

use crate::error::ReconError;
use crate::value::{bind_items, Item, Record, Value};

/// Parse a complete Recon document. Trailing non-whitespace is an error.
pub fn parse(input: &str) -> Result<Value, ReconError> {
    let mut cursor = Cursor::new(input);
    let value = parse_block(&mut cursor)?;
    cursor.skip_whitespace();
    if let Some(c) = cursor.peek() {
        return Err(cursor.error(format!("unexpected trailing input {c:?}")));
    }
    Ok(value)
}

/// Recognise a single value at the start of the input; returns the value and
/// the number of bytes consumed.
pub fn parse_prefix(input: &str) -> Result<(Value, usize), ReconError> {
    let mut cursor = Cursor::new(input);
    let value = parse_block(&mut cursor)?;
    Ok((value, cursor.pos))
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ReconError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}")))
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn error(&self, reason: impl Into<String>) -> ReconError {
        ReconError::parse(self.pos, reason)
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn starts_primary(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit() || matches!(c, '-' | '"' | '{' | '[' | '(')
}

/// Parse items separated by `,` or `;` until end of input or a closing
/// delimiter, then bind them.
fn parse_block(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    let items = parse_items(cursor)?;
    Ok(bind_items(items))
}

fn parse_items(cursor: &mut Cursor<'_>) -> Result<Vec<Item>, ReconError> {
    let mut items = Vec::new();
    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            None | Some(')' | '}' | ']') => break,
            Some(',' | ';') => {
                cursor.bump();
                continue;
            }
            Some(_) => {}
        }
        let value = parse_block_expression(cursor)?;
        cursor.skip_whitespace();
        if cursor.eat(':') {
            cursor.skip_whitespace();
            let slot_value = match cursor.peek() {
                None | Some(',' | ';' | ')' | '}' | ']') => Value::Extant,
                Some(_) => parse_block_expression(cursor)?,
            };
            items.push(Item::Slot { key: value, value: slot_value });
        } else {
            items.push(Item::Value(value));
        }
    }
    Ok(items)
}

fn parse_block_expression(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_lambda(cursor)
}

// Reserved operator productions.

fn parse_lambda(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_conditional(cursor)
}

fn parse_conditional(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_or(cursor)
}

fn parse_or(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_and(cursor)
}

fn parse_and(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_bitwise_or(cursor)
}

fn parse_bitwise_or(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_bitwise_xor(cursor)
}

fn parse_bitwise_xor(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_bitwise_and(cursor)
}

fn parse_bitwise_and(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_comparison(cursor)
}

fn parse_comparison(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_attr_expression(cursor)
}

/// An attributed value: a run of `@attr`s followed by an optional body
/// primary whose items merge into the attributed record.
fn parse_attr_expression(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    cursor.skip_whitespace();
    if cursor.peek() != Some('@') {
        return parse_additive(cursor);
    }

    let mut record = Record::new();
    while cursor.peek() == Some('@') {
        let (name, value) = parse_attr(cursor)?;
        record.push(Item::Attr { name, value });
        cursor.skip_whitespace();
    }

    if let Some(c) = cursor.peek() {
        if starts_primary(c) {
            match parse_additive(cursor)? {
                Value::Record(inner) => record.items.extend(inner.items),
                Value::Absent => {}
                value => record.push(Item::Value(value)),
            }
        }
    }

    Ok(Value::Record(record))
}

fn parse_additive(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_multiplicative(cursor)
}

fn parse_multiplicative(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_prefix_level(cursor)
}

fn parse_prefix_level(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_invoke(cursor)
}

fn parse_invoke(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    parse_primary(cursor)
}

fn parse_primary(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    cursor.skip_whitespace();
    match cursor.peek() {
        None => Err(cursor.error("unexpected end of input")),
        Some('(') => {
            cursor.bump();
            let value = parse_block(cursor)?;
            cursor.skip_whitespace();
            cursor.expect(')')?;
            Ok(value)
        }
        Some('{') => {
            cursor.bump();
            let items = parse_items(cursor)?;
            cursor.skip_whitespace();
            cursor.expect('}')?;
            Ok(Value::Record(Record::from_items(items)))
        }
        Some('[') => parse_markup(cursor),
        Some('"') => parse_string(cursor),
        Some(c) if c == '-' || c.is_ascii_digit() => parse_number(cursor),
        Some(c) if is_ident_start(c) => parse_ident_value(cursor),
        Some(c) => Err(cursor.error(format!("unexpected character {c:?}"))),
    }
}

/// `@ident` with an optional parenthesised argument block. A missing or
/// empty argument list carries `Extant`.
fn parse_attr(cursor: &mut Cursor<'_>) -> Result<(String, Value), ReconError> {
    cursor.expect('@')?;
    let name = parse_ident(cursor)?;
    if !cursor.eat('(') {
        return Ok((name, Value::Extant));
    }
    cursor.skip_whitespace();
    if cursor.eat(')') {
        return Ok((name, Value::Extant));
    }
    let value = parse_block(cursor)?;
    cursor.skip_whitespace();
    cursor.expect(')')?;
    Ok((name, value))
}

fn parse_ident(cursor: &mut Cursor<'_>) -> Result<String, ReconError> {
    match cursor.peek() {
        Some(c) if is_ident_start(c) => {}
        _ => return Err(cursor.error("expected identifier")),
    }
    let mut ident = String::new();
    while let Some(c) = cursor.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        cursor.bump();
    }
    Ok(ident)
}

fn parse_ident_value(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    let ident = parse_ident(cursor)?;
    Ok(match ident.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Text(ident),
    })
}

fn parse_string(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    cursor.expect('"')?;
    let mut text = String::new();
    loop {
        match cursor.bump() {
            None => return Err(cursor.error("unterminated string")),
            Some('"') => break,
            Some('\\') => text.push(parse_escape(cursor)?),
            Some(c) => text.push(c),
        }
    }
    Ok(Value::Text(text))
}

fn parse_escape(cursor: &mut Cursor<'_>) -> Result<char, ReconError> {
    match cursor.bump() {
        None => Err(cursor.error("unterminated escape")),
        Some(c @ ('"' | '\\' | '/')) => Ok(c),
        Some('b') => Ok('\u{8}'),
        Some('f') => Ok('\u{c}'),
        Some('n') => Ok('\n'),
        Some('r') => Ok('\r'),
        Some('t') => Ok('\t'),
        Some('u') => {
            let mut code = 0u32;
            for _ in 0..4 {
                let digit = cursor
                    .bump()
                    .and_then(|c| c.to_digit(16))
                    .ok_or_else(|| cursor.error("expected four hex digits after \\u"))?;
                code = code * 16 + digit;
            }
            char::from_u32(code).ok_or_else(|| cursor.error("invalid unicode escape"))
        }
        Some(c) => Err(cursor.error(format!("invalid escape {c:?}"))),
    }
}

fn parse_number(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    let start = cursor.pos;
    cursor.eat('-');
    let mut digits = 0usize;
    while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
        cursor.bump();
        digits += 1;
    }
    if digits == 0 {
        return Err(cursor.error("expected digits"));
    }

    let mut is_float = false;
    if cursor.peek() == Some('.') && matches!(cursor.peek_second(), Some(c) if c.is_ascii_digit()) {
        is_float = true;
        cursor.bump();
        while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
            cursor.bump();
        }
    }
    if matches!(cursor.peek(), Some('e' | 'E')) {
        is_float = true;
        cursor.bump();
        if matches!(cursor.peek(), Some('+' | '-')) {
            cursor.bump();
        }
        let mut exp_digits = 0usize;
        while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
            cursor.bump();
            exp_digits += 1;
        }
        if exp_digits == 0 {
            return Err(cursor.error("expected exponent digits"));
        }
    }

    let literal = &cursor.input[start..cursor.pos];
    if is_float {
        let n: f64 =
            literal.parse().map_err(|_| ReconError::parse(start, "invalid number literal"))?;
        Ok(Value::Float(n))
    } else if let Ok(n) = literal.parse::<i64>() {
        Ok(Value::Int(n))
    } else {
        // Integral literal out of i64 range.
        let n: f64 =
            literal.parse().map_err(|_| ReconError::parse(start, "invalid number literal"))?;
        Ok(Value::Float(n))
    }
}

/// Markup: text spans with embedded attributed values, records, and nested
/// markup, bound into a record.
fn parse_markup(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    cursor.expect('[')?;
    let mut items: Vec<Item> = Vec::new();
    let mut text = String::new();
    loop {
        match cursor.peek() {
            None => return Err(cursor.error("unterminated markup")),
            Some(']') => {
                cursor.bump();
                break;
            }
            Some('@') => {
                flush_text(&mut items, &mut text);
                items.push(Item::Value(parse_markup_span(cursor)?));
            }
            Some('{') => {
                flush_text(&mut items, &mut text);
                cursor.bump();
                let inner = parse_items(cursor)?;
                cursor.skip_whitespace();
                cursor.expect('}')?;
                items.push(Item::Value(Value::Record(Record::from_items(inner))));
            }
            Some('[') => {
                flush_text(&mut items, &mut text);
                let inner = parse_markup(cursor)?;
                items.push(Item::Value(inner));
            }
            Some('\\') => {
                cursor.bump();
                match cursor.bump() {
                    Some(c @ ('\\' | '/' | '@' | '[' | ']' | '{' | '}' | '"')) => text.push(c),
                    Some('b') => text.push('\u{8}'),
                    Some('f') => text.push('\u{c}'),
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('t') => text.push('\t'),
                    Some(c) => return Err(cursor.error(format!("invalid markup escape {c:?}"))),
                    None => return Err(cursor.error("unterminated escape")),
                }
            }
            Some(c) => {
                text.push(c);
                cursor.bump();
            }
        }
    }
    flush_text(&mut items, &mut text);
    Ok(Value::Record(Record::from_items(items)))
}

/// An attributed span inside markup: a run of attributes plus an optional
/// body that must follow immediately as `{…}` or nested markup, so that
/// surrounding text is never swallowed into the span.
fn parse_markup_span(cursor: &mut Cursor<'_>) -> Result<Value, ReconError> {
    let mut record = Record::new();
    while cursor.peek() == Some('@') {
        let (name, value) = parse_attr(cursor)?;
        record.push(Item::Attr { name, value });
    }
    match cursor.peek() {
        Some('{') => {
            cursor.bump();
            let inner = parse_items(cursor)?;
            cursor.skip_whitespace();
            cursor.expect('}')?;
            record.items.extend(inner);
        }
        Some('[') => {
            if let Value::Record(inner) = parse_markup(cursor)? {
                record.items.extend(inner.items);
            }
        }
        _ => {}
    }
    Ok(Value::Record(record))
}

fn flush_text(items: &mut Vec<Item>, text: &mut String) {
    if !text.is_empty() {
        items.push(Item::Value(Value::Text(std::mem::take(text))));
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
