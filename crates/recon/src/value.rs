// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Recon value tree.
//!
//! A [`Value`] is the payload of every WARP envelope. Records are ordered
//! sequences of [`Item`]s; attribute order and slot order are significant
//! for round-trip.

/// A single Recon value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing value.
    #[default]
    Absent,
    /// Present but empty.
    Extant,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Record(Record),
}

impl Value {
    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    pub fn record(items: Vec<Item>) -> Self {
        Value::Record(Record { items })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// True for `Text`, `Int`, `Float`, and `Bool`.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Value::Text(_) | Value::Int(_) | Value::Float(_) | Value::Bool(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// The name of the head attribute when this is an attributed record.
    pub fn tag(&self) -> Option<&str> {
        self.as_record().and_then(|record| record.head_attr()).map(|(name, _)| name)
    }
}

/// One element of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `@name(value)`.
    Attr { name: String, value: Value },
    /// `key: value`.
    Slot { key: Value, value: Value },
    /// A bare value.
    Value(Value),
}

impl Item {
    pub fn attr(name: impl Into<String>, value: Value) -> Self {
        Item::Attr { name: name.into(), value }
    }

    pub fn slot(key: Value, value: Value) -> Self {
        Item::Slot { key, value }
    }
}

/// An ordered sequence of items.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub items: Vec<Item>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The head attribute, when the first item is an attribute.
    pub fn head_attr(&self) -> Option<(&str, &Value)> {
        match self.items.first() {
            Some(Item::Attr { name, value }) => Some((name, value)),
            _ => None,
        }
    }

    /// Everything after the head item, bound into a single value.
    pub fn body(&self) -> Value {
        if self.items.len() <= 1 {
            return Value::Absent;
        }
        bind_items(self.items[1..].to_vec())
    }

    /// The value of the slot with the given text key.
    pub fn slot(&self, key: &str) -> Option<&Value> {
        self.items.iter().find_map(|item| match item {
            Item::Slot { key: Value::Text(name), value } if name == key => Some(value),
            _ => None,
        })
    }

    /// The value of the first slot, regardless of its key.
    pub fn first_slot_value(&self) -> Option<&Value> {
        self.items.iter().find_map(|item| match item {
            Item::Slot { value, .. } => Some(value),
            _ => None,
        })
    }
}

/// Bind a sequence of items into a value: empty binds to `Absent`, a single
/// bare value binds to that value, anything else binds to a record.
pub fn bind_items(items: Vec<Item>) -> Value {
    let mut items = items;
    match items.len() {
        0 => Value::Absent,
        1 => match items.pop() {
            Some(Item::Value(value)) => value,
            Some(item) => Value::Record(Record { items: vec![item] }),
            None => Value::Absent,
        },
        _ => Value::Record(Record { items }),
    }
}

/// Accumulates items and binds them into a value.
#[derive(Debug, Default)]
pub struct ValueBuilder {
    items: Vec<Item>,
}

impl ValueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn bind(self) -> Value {
        bind_items(self.items)
    }
}

/// Conversion into the Recon value tree, used by the outbound write paths.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for u32 {
    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
