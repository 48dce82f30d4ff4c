// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ReconError;
use crate::value::Item;

#[derive(Debug, PartialEq)]
struct Person {
    name: String,
    age: i64,
}

fn person_registry() -> ClassRegistry {
    let mut registry = ClassRegistry::new();
    registry.register("Person", |record: &Record| {
        let name = record.slot("name").and_then(Value::as_text).unwrap_or_default().to_owned();
        let age = match record.slot("age") {
            Some(Value::Int(n)) => *n,
            _ => 0,
        };
        Ok(Person { name, age })
    });
    registry
}

fn person_record() -> Value {
    Value::record(vec![
        Item::attr("Person", Value::Extant),
        Item::slot(Value::text("name"), Value::text("ada")),
        Item::slot(Value::text("age"), Value::Int(36)),
    ])
}

#[test]
fn primitives_pass_through() {
    let registry = ClassRegistry::new();
    let decoded = decode_value(&Value::Int(42), &registry, true);
    assert_eq!(decoded, Ok(DecodedValue::Value(Value::Int(42))));
}

#[test]
fn plain_records_pass_through_in_both_modes() {
    let registry = ClassRegistry::new();
    let value = Value::record(vec![Item::slot(Value::text("a"), Value::Int(1))]);
    for strict in [false, true] {
        let decoded = decode_value(&value, &registry, strict);
        assert_eq!(decoded, Ok(DecodedValue::Value(value.clone())));
    }
}

#[test]
fn registered_class_produces_object() -> anyhow::Result<()> {
    let decoded = decode_value(&person_record(), &person_registry(), true)?;
    let person = decoded
        .downcast::<Person>()
        .ok_or_else(|| anyhow::anyhow!("expected a Person object"))?;
    assert_eq!(*person, Person { name: "ada".to_owned(), age: 36 });
    Ok(())
}

#[test]
fn unknown_type_fails_in_strict_mode() {
    let registry = ClassRegistry::new();
    let decoded = decode_value(&person_record(), &registry, true);
    assert_eq!(decoded, Err(ReconError::UnknownType("Person".to_owned())));
}

#[test]
fn unknown_type_passes_through_when_not_strict() {
    let registry = ClassRegistry::new();
    let decoded = decode_value(&person_record(), &registry, false);
    assert_eq!(decoded, Ok(DecodedValue::Value(person_record())));
}

#[test]
fn deserializer_errors_propagate() {
    let mut registry = ClassRegistry::new();
    registry.register("Broken", |_: &Record| -> Result<Person, ReconError> {
        Err(ReconError::UnknownType("inner".to_owned()))
    });
    let value = Value::record(vec![Item::attr("Broken", Value::Extant)]);
    assert!(decode_value(&value, &registry, false).is_err());
}

#[test]
fn merge_and_deregister_manage_registrations() {
    let mut merged = ClassRegistry::new();
    merged.merge(&person_registry());
    assert!(merged.contains("Person"));

    assert!(merged.deregister("Person"));
    assert!(!merged.deregister("Person"));
    assert!(merged.is_empty());
}
