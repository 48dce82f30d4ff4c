// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn builder_binds_empty_to_absent() {
    assert_eq!(ValueBuilder::new().bind(), Value::Absent);
}

#[test]
fn builder_binds_single_value_to_itself() {
    let mut builder = ValueBuilder::new();
    builder.push(Item::Value(Value::Int(7)));
    assert_eq!(builder.bind(), Value::Int(7));
}

#[test]
fn builder_binds_single_slot_to_record() {
    let mut builder = ValueBuilder::new();
    builder.push(Item::slot(Value::text("key"), Value::Int(1)));
    let bound = builder.bind();
    assert_eq!(bound, Value::record(vec![Item::slot(Value::text("key"), Value::Int(1))]));
}

#[test]
fn builder_binds_multiple_items_to_record() {
    let mut builder = ValueBuilder::new();
    builder.push(Item::Value(Value::Int(1)));
    builder.push(Item::Value(Value::Int(2)));
    assert_eq!(bound_len(builder.bind()), 2);
}

fn bound_len(value: Value) -> usize {
    value.as_record().map(Record::len).unwrap_or_default()
}

#[test]
fn tag_reads_head_attribute() {
    let value = Value::record(vec![
        Item::attr("update", Value::Extant),
        Item::slot(Value::text("a"), Value::Int(1)),
    ]);
    assert_eq!(value.tag(), Some("update"));
    assert_eq!(Value::Int(3).tag(), None);
}

#[test]
fn tag_ignores_record_without_head_attribute() {
    let value = Value::record(vec![
        Item::Value(Value::Int(1)),
        Item::attr("late", Value::Extant),
    ]);
    assert_eq!(value.tag(), None);
}

#[test]
fn body_binds_items_after_head() {
    let record = Record::from_items(vec![
        Item::attr("update", Value::Extant),
        Item::Value(Value::text("payload")),
    ]);
    assert_eq!(record.body(), Value::text("payload"));

    let bare = Record::from_items(vec![Item::attr("remove", Value::Extant)]);
    assert_eq!(bare.body(), Value::Absent);
}

#[test]
fn slot_lookup_finds_text_keys() {
    let record = Record::from_items(vec![
        Item::slot(Value::text("node"), Value::text("/house")),
        Item::slot(Value::text("lane"), Value::text("lights")),
    ]);
    assert_eq!(record.slot("lane"), Some(&Value::text("lights")));
    assert_eq!(record.slot("missing"), None);
    assert_eq!(record.first_slot_value(), Some(&Value::text("/house")));
}

#[test]
fn into_value_covers_primitives() {
    assert_eq!(5i32.into_value(), Value::Int(5));
    assert_eq!(true.into_value(), Value::Bool(true));
    assert_eq!(1.5f64.into_value(), Value::Float(1.5));
    assert_eq!("hi".into_value(), Value::text("hi"));
}
