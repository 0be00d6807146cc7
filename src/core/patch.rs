//! Mutation operators.
//!
//! A `Patch` computes a new value from an old value. The algebra is separate
//! from the chain store: applications build a patch, apply it to the current
//! record's value, and commit the result. The store treats the committed
//! value as opaque.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::value::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Patch {
    /// Merge the given fields into an object, replacing existing values.
    SetProperties { properties: BTreeMap<String, Value> },
    /// Apply a nested patch to one object field.
    SubProperty { name: String, patch: Box<Patch> },
    /// Replace one array element.
    ArrayValue { index: usize, value: Value },
    /// Truncate an array to the given length.
    ArrayTruncation { length: usize },
    /// Apply a nested patch to one array element.
    ArraySub { index: usize, patch: Box<Patch> },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("patch expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("object has no field `{name}`")]
    MissingProperty { name: String },
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

impl Patch {
    /// Compute the patched value. The input is untouched.
    pub fn apply(&self, value: &Value) -> Result<Value, PatchError> {
        match self {
            Patch::SetProperties { properties } => {
                let fields = expect_object(value)?;
                let mut next = fields.clone();
                for (name, field) in properties {
                    next.insert(name.clone(), field.clone());
                }
                Ok(Value::Object(next))
            }
            Patch::SubProperty { name, patch } => {
                let fields = expect_object(value)?;
                let target = fields.get(name).ok_or_else(|| PatchError::MissingProperty {
                    name: name.clone(),
                })?;
                let patched = patch.apply(target)?;
                let mut next = fields.clone();
                next.insert(name.clone(), patched);
                Ok(Value::Object(next))
            }
            Patch::ArrayValue { index, value: element } => {
                let items = expect_array(value)?;
                if *index >= items.len() {
                    return Err(PatchError::IndexOutOfRange {
                        index: *index,
                        len: items.len(),
                    });
                }
                let mut next = items.to_vec();
                next[*index] = element.clone();
                Ok(Value::Array(next))
            }
            Patch::ArrayTruncation { length } => {
                let items = expect_array(value)?;
                if *length > items.len() {
                    return Err(PatchError::IndexOutOfRange {
                        index: *length,
                        len: items.len(),
                    });
                }
                Ok(Value::Array(items[..*length].to_vec()))
            }
            Patch::ArraySub { index, patch } => {
                let items = expect_array(value)?;
                let target = items.get(*index).ok_or(PatchError::IndexOutOfRange {
                    index: *index,
                    len: items.len(),
                })?;
                let patched = patch.apply(target)?;
                let mut next = items.to_vec();
                next[*index] = patched;
                Ok(Value::Array(next))
            }
        }
    }
}

fn expect_object(value: &Value) -> Result<&BTreeMap<String, Value>, PatchError> {
    value.as_object().ok_or(PatchError::TypeMismatch {
        expected: "object",
        found: kind(value),
    })
}

fn expect_array(value: &Value) -> Result<&[Value], PatchError> {
    value.as_array().ok_or(PatchError::TypeMismatch {
        expected: "array",
        found: kind(value),
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Num(_) => "number",
        Value::Str(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
