//! Chain identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::canon::to_canon_string;
use super::error::CanonError;
use super::value::Value;
use super::version::Version;

/// Identifies one logical object (one version chain).
///
/// Built from an application-supplied structured key. The canonical serial
/// is computed once at construction; equality, ordering and hashing all go
/// through it, so `{"a":1,"b":2}` and `{"b":2,"a":1}` name the same chain.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChainKey {
    key: Value,
    serial: String,
}

impl ChainKey {
    pub fn new(key: impl Into<Value>) -> Result<Self, CanonError> {
        let key = key.into();
        let serial = to_canon_string(&key)?;
        Ok(Self { key, serial })
    }

    /// The structured form the application supplied.
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// The canonical serialized form; the chain's name inside the KV engine.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// KV key of the record at `version` on this chain.
    pub fn record_serial(&self, version: &Version) -> String {
        format!("{}{}", self.serial, version.serial())
    }
}

impl PartialEq for ChainKey {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for ChainKey {}

impl PartialOrd for ChainKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChainKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.serial.cmp(&other.serial)
    }
}

impl std::hash::Hash for ChainKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainKey({})", self.serial)
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serial)
    }
}
