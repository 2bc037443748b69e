//! Structural checks for stored documents
//!
//! These catch corrupted or mis-shaped documents before they reach the store.
//! They look at types and shapes only; business rules live in the domain
//! modules.

use serde_json::{Map, Value};
use thiserror::Error;

use super::keys::StorageKey;

/// Why a document was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{key}: expected {expected}")]
    Shape { key: StorageKey, expected: &'static str },

    #[error("{key}[{index}]: expected an object")]
    ElementNotObject { key: StorageKey, index: usize },

    #[error("{key}[{index}].{field}: {problem}")]
    ElementField {
        key: StorageKey,
        index: usize,
        field: &'static str,
        problem: &'static str,
    },

    #[error("{key}.{field}: {problem}")]
    Field {
        key: StorageKey,
        field: &'static str,
        problem: &'static str,
    },
}

/// Validate a document for a key. Keys without a specific rule accept anything.
pub fn validate(key: StorageKey, value: &Value) -> Result<(), ValidationError> {
    match key {
        StorageKey::Exercises => each_element(key, value, |index, obj| {
            require_id(key, index, obj)?;
            require_text(key, index, obj, "name")?;
            require_text(key, index, obj, "muscleGroup")?;
            if !obj.get("isUnilateral").is_some_and(Value::is_boolean) {
                return Err(element_field(key, index, "isUnilateral", "must be a boolean"));
            }
            Ok(())
        }),
        StorageKey::Sessions => each_element(key, value, |index, obj| {
            require_id(key, index, obj)?;
            require_text(key, index, obj, "date")?;
            require_array(key, index, obj, "exercises")
        }),
        StorageKey::Templates => each_element(key, value, |index, obj| {
            require_id(key, index, obj)?;
            require_text(key, index, obj, "name")?;
            require_array(key, index, obj, "exercises")
        }),
        StorageKey::Gamification => {
            let obj = value.as_object().ok_or(ValidationError::Shape {
                key,
                expected: "an object",
            })?;
            for field in ["level", "xp"] {
                if !obj.get(field).is_some_and(Value::is_number) {
                    return Err(ValidationError::Field {
                        key,
                        field,
                        problem: "must be a number",
                    });
                }
            }
            if !obj.get("badges").is_some_and(Value::is_array) {
                return Err(ValidationError::Field {
                    key,
                    field: "badges",
                    problem: "must be an array",
                });
            }
            Ok(())
        }
        StorageKey::Settings => {
            if value.is_object() {
                Ok(())
            } else {
                Err(ValidationError::Shape {
                    key,
                    expected: "an object",
                })
            }
        }
        _ => Ok(()),
    }
}

fn each_element(
    key: StorageKey,
    value: &Value,
    check: impl Fn(usize, &Map<String, Value>) -> Result<(), ValidationError>,
) -> Result<(), ValidationError> {
    let items = value.as_array().ok_or(ValidationError::Shape {
        key,
        expected: "an array",
    })?;
    for (index, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or(ValidationError::ElementNotObject { key, index })?;
        check(index, obj)?;
    }
    Ok(())
}

fn element_field(key: StorageKey, index: usize, field: &'static str, problem: &'static str) -> ValidationError {
    ValidationError::ElementField {
        key,
        index,
        field,
        problem,
    }
}

/// IDs may be non-empty strings or numbers
fn require_id(key: StorageKey, index: usize, obj: &Map<String, Value>) -> Result<(), ValidationError> {
    match obj.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(()),
        Some(Value::Number(_)) => Ok(()),
        _ => Err(element_field(key, index, "id", "must be a non-empty id")),
    }
}

fn require_text(
    key: StorageKey,
    index: usize,
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<(), ValidationError> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
        _ => Err(element_field(key, index, field, "must be a non-empty string")),
    }
}

fn require_array(
    key: StorageKey,
    index: usize,
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<(), ValidationError> {
    if obj.get(field).is_some_and(Value::is_array) {
        Ok(())
    } else {
        Err(element_field(key, index, field, "must be an array"))
    }
}
