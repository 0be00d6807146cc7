//! Persisted shapes: record entries and per-chain state.

use serde::{Deserialize, Serialize};

use super::value::Value;
use super::version::Version;

/// Record payload as persisted in the records store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub value: Value,
    pub context: Value,
}

/// A (version, value, context) triple as handed to consumers.
///
/// Always a defensive deep copy; mutating a received record never touches
/// persisted state.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub version: Version,
    pub value: Value,
    pub context: Value,
}

impl Record {
    pub fn new(version: Version, value: Value, context: Value) -> Self {
        Self {
            version,
            value,
            context,
        }
    }

    pub fn from_entry(version: Version, entry: Entry) -> Self {
        Self {
            version,
            value: entry.value,
            context: entry.context,
        }
    }
}

/// Per-chain metadata as persisted in the chains store.
///
/// `current` is the head the client considers latest-local. `outdated`
/// holds pending mutations superseded by a backend push before they were
/// acknowledged, in arrival order, awaiting application-driven resolution.
/// `current` is never an element of `outdated`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub current: Version,
    #[serde(default)]
    pub outdated: Vec<Version>,
}

impl ChainState {
    pub fn new(current: Version) -> Self {
        Self {
            current,
            outdated: Vec::new(),
        }
    }
}
