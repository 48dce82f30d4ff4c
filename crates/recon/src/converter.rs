// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record↔object conversion.
//!
//! Embedders register a deserializer per type name. A decoded record whose
//! head attribute names a registered type is handed to that deserializer and
//! comes back as an opaque object handle; everything else passes through as
//! a plain value.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ReconError;
use crate::value::{Record, Value};

/// An embedder-defined decoded object.
pub type ObjectHandle = Arc<dyn Any + Send + Sync>;

type Deserializer = Arc<dyn Fn(&Record) -> Result<ObjectHandle, ReconError> + Send + Sync>;

/// Registry of `type name → deserializer`.
#[derive(Clone, Default)]
pub struct ClassRegistry {
    deserializers: HashMap<String, Deserializer>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deserializer for records tagged `@name`.
    pub fn register<T, F>(&mut self, name: impl Into<String>, deserialize: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Record) -> Result<T, ReconError> + Send + Sync + 'static,
    {
        let deserializer: Deserializer =
            Arc::new(move |record| deserialize(record).map(|object| Arc::new(object) as ObjectHandle));
        self.deserializers.insert(name.into(), deserializer);
    }

    /// Remove a registration; returns whether it was present.
    pub fn deregister(&mut self, name: &str) -> bool {
        self.deserializers.remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.deserializers.clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.deserializers.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.deserializers.is_empty()
    }

    /// Merge all registrations from `other`, overwriting on collision.
    pub fn merge(&mut self, other: &ClassRegistry) {
        for (name, deserializer) in &other.deserializers {
            self.deserializers.insert(name.clone(), Arc::clone(deserializer));
        }
    }

    fn get(&self, name: &str) -> Option<&Deserializer> {
        self.deserializers.get(name)
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.deserializers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ClassRegistry").field("names", &names).finish()
    }
}

/// A decoded downlink payload: a plain Recon value, or an object produced by
/// a registered deserializer.
#[derive(Clone)]
pub enum DecodedValue {
    Value(Value),
    Object { class: String, object: ObjectHandle },
}

impl DecodedValue {
    pub fn absent() -> Self {
        DecodedValue::Value(Value::Absent)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, DecodedValue::Value(Value::Absent))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            DecodedValue::Value(value) => Some(value),
            DecodedValue::Object { .. } => None,
        }
    }

    /// Downcast an object handle to its concrete registered type.
    pub fn downcast<T: Any>(&self) -> Option<&T> {
        match self {
            DecodedValue::Object { object, .. } => object.downcast_ref::<T>(),
            DecodedValue::Value(_) => None,
        }
    }
}

impl fmt::Debug for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DecodedValue::Object { class, .. } => {
                f.debug_struct("Object").field("class", class).finish_non_exhaustive()
            }
        }
    }
}

impl PartialEq for DecodedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DecodedValue::Value(a), DecodedValue::Value(b)) => a == b,
            (
                DecodedValue::Object { class: a, object: x },
                DecodedValue::Object { class: b, object: y },
            ) => a == b && Arc::ptr_eq(x, y),
            _ => false,
        }
    }
}

impl From<Value> for DecodedValue {
    fn from(value: Value) -> Self {
        DecodedValue::Value(value)
    }
}

/// Decode an event payload. Primitives and attribute-less records pass
/// through; a record whose head attribute names a registered class runs its
/// deserializer. In strict mode an unregistered head attribute is an error.
pub fn decode_value(
    value: &Value,
    registry: &ClassRegistry,
    strict: bool,
) -> Result<DecodedValue, ReconError> {
    let Value::Record(record) = value else {
        return Ok(DecodedValue::Value(value.clone()));
    };
    let Some((name, _)) = record.head_attr() else {
        return Ok(DecodedValue::Value(value.clone()));
    };
    if let Some(deserializer) = registry.get(name) {
        Ok(DecodedValue::Object { class: name.to_owned(), object: deserializer(record)? })
    } else if strict {
        Err(ReconError::UnknownType(name.to_owned()))
    } else {
        Ok(DecodedValue::Value(value.clone()))
    }
}

#[cfg(test)]
#[path = "converter_tests.rs"]
mod tests;
