//! Layer 0: the closed value sum.
//!
//! Everything the store persists or hands to the application is a `Value`:
//! structured keys, record payloads, mutation contexts, chain metadata blobs.
//! The sum is closed on purpose - there is no "undefined", no binary, no
//! user-defined node. Absent object fields are simply not present in the map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::CanonError;

/// Owned structured data, JSON-shaped.
///
/// `Object` uses a `BTreeMap` so field iteration is already in key order.
/// `Clone` is a deep copy; handing a clone across an API boundary never
/// shares mutable memory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// The empty object, `{}`. Default context for server-pushed records.
    pub fn empty_object() -> Self {
        Value::Object(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            // Arbitrary-precision numbers fall out as NaN and are rejected
            // at canonical-encode time.
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Num(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Encode any serde type into a `Value` tree.
///
/// Used for the persisted metadata blobs (chain state, record entries).
pub fn encode_as_value<T: Serialize>(value: &T) -> Result<Value, CanonError> {
    Ok(Value::from(serde_json::to_value(value)?))
}

/// Decode a `Value` tree back into a serde type.
pub fn decode_from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, CanonError> {
    Ok(serde_json::from_value(serde_json::Value::from(value))?)
}
