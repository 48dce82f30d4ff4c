// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical Recon writer.
//!
//! Output is byte-exact against the peer implementation: no whitespace
//! between tokens, attributes before body, brace elision for attribute
//! arguments and for a single primitive body after attributes. Text is
//! written as a bare identifier where the grammar reads one back (a
//! standalone value, attribute arguments, slot keys) and as a quoted string
//! in record bodies.

use crate::parser::{is_ident_char, is_ident_start};
use crate::value::{Item, Record, Value};

/// Where a value is being written; decides identifier versus quoted text.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    /// A standalone document value or a slot key.
    Ident,
    /// Inside an attribute's argument parentheses.
    Attr,
    /// An item or slot value in a record body.
    Body,
}

/// Serialise a value. Never fails on well-formed trees.
pub fn write(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, Position::Ident);
    out
}

fn write_value(out: &mut String, value: &Value, position: Position) {
    match value {
        Value::Absent | Value::Extant => {}
        Value::Text(text) => write_text(out, text, position),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(n) => write_float(out, *n),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Record(record) => write_record(out, record),
    }
}

fn write_record(out: &mut String, record: &Record) {
    let mut idx = 0;
    while let Some(Item::Attr { name, value }) = record.items.get(idx) {
        write_attr(out, name, value);
        idx += 1;
    }
    let had_attrs = idx > 0;
    let last_attr_bare = had_attrs
        && matches!(
            record.items.get(idx - 1),
            Some(Item::Attr { value: Value::Absent | Value::Extant, .. })
        );
    let tail = &record.items[idx..];

    match tail {
        [] => {
            // Attributes-only records emit an empty body.
            if !had_attrs {
                out.push_str("{}");
            }
        }
        [Item::Value(value)] if had_attrs && !matches!(value, Value::Record(_)) => {
            // A bare attribute directly followed by an identifier-like body
            // would fuse into one token; separate them.
            if last_attr_bare && starts_ident_like(value) {
                out.push(' ');
            }
            write_value(out, value, Position::Body);
        }
        _ => {
            out.push('{');
            write_items(out, tail, Position::Body);
            out.push('}');
        }
    }
}

fn write_items(out: &mut String, items: &[Item], position: Position) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match item {
            Item::Attr { name, value } => write_attr(out, name, value),
            Item::Slot { key, value } => {
                write_value(out, key, Position::Ident);
                out.push(':');
                write_value(out, value, position);
            }
            Item::Value(value) => write_value(out, value, position),
        }
    }
}

fn write_attr(out: &mut String, name: &str, value: &Value) {
    out.push('@');
    out.push_str(name);
    match value {
        // Extant argument lists emit nothing, not `()`.
        Value::Absent | Value::Extant => {}
        Value::Record(record) => {
            out.push('(');
            write_items(out, &record.items, Position::Attr);
            out.push(')');
        }
        _ => {
            out.push('(');
            write_value(out, value, Position::Attr);
            out.push(')');
        }
    }
}

fn write_text(out: &mut String, text: &str, position: Position) {
    let bare = match position {
        Position::Ident | Position::Attr => is_bare_ident(text),
        Position::Body => false,
    };
    if bare {
        out.push_str(text);
        return;
    }
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// True when the text re-parses as the same bare identifier.
fn is_bare_ident(text: &str) -> bool {
    if text == "true" || text == "false" {
        return false;
    }
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => {}
        _ => return false,
    }
    chars.all(is_ident_char)
}

/// True when the value's first emitted character could extend a preceding
/// bare attribute name.
fn starts_ident_like(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_))
}

fn write_float(out: &mut String, n: f64) {
    let formatted = n.to_string();
    let needs_fraction = n.is_finite()
        && !formatted.contains('.')
        && !formatted.contains('e')
        && !formatted.contains('E');
    out.push_str(&formatted);
    if needs_fraction {
        out.push_str(".0");
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
