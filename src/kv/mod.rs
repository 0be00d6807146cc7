//! Pluggable key-value engine contract.
//!
//! The chain store owns two fixed stores inside one database: `chains`
//! (serialized chain key -> chain state blob) and `records` (record key
//! serial -> entry blob). Engines must isolate written values from later
//! caller mutation; with owned `Value` trees that isolation falls out of
//! ownership, and `get` must return a deep copy.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::Value;

pub mod file;
pub mod memory;

pub use file::FileKv;
pub use memory::MemoryKv;

/// The fixed store list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreName {
    Chains,
    Records,
}

impl StoreName {
    pub const ALL: [StoreName; 2] = [StoreName::Chains, StoreName::Records];

    pub fn as_str(self) -> &'static str {
        match self {
            StoreName::Chains => "chains",
            StoreName::Records => "records",
        }
    }
}

impl std::fmt::Display for StoreName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv engine lock poisoned")]
    LockPoisoned,
    #[error("kv io error: {reason}")]
    Io { reason: String },
}

/// A key-value engine holding the two tactical stores.
///
/// Conflicting transactions must serialize; a store instance assumes
/// exclusive ownership of its chains/records namespaces.
pub trait KvEngine: Send + Sync {
    /// Read one value. Non-existent keys yield `None`.
    fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>, KvError>;

    /// Write one value. Returns true iff written.
    fn put(&self, store: StoreName, key: &str, value: Value) -> Result<bool, KvError>;

    /// Remove one key. True iff the key existed (vacuous removes may also
    /// report true; callers tolerate either).
    fn remove(&self, store: StoreName, key: &str) -> Result<bool, KvError>;

    /// All keys currently in the store.
    fn keys(&self, store: StoreName) -> Result<Vec<String>, KvError>;

    /// Open a transaction scoped over `stores`, holding its lock until the
    /// transaction commits or is dropped.
    fn begin(&self, stores: &[StoreName]) -> Result<Box<dyn KvTransaction + '_>, KvError>;
}

/// Scoped transaction. Writes stage until `commit`; dropping without
/// committing discards every staged write.
pub trait KvTransaction {
    fn get(&mut self, store: StoreName, key: &str) -> Result<Option<Value>, KvError>;
    fn put(&mut self, store: StoreName, key: &str, value: Value) -> Result<bool, KvError>;
    fn remove(&mut self, store: StoreName, key: &str) -> Result<bool, KvError>;
    fn commit(self: Box<Self>) -> Result<(), KvError>;
}

/// The two in-memory tables every bundled engine is built on.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    chains: BTreeMap<String, Value>,
    records: BTreeMap<String, Value>,
}

impl Tables {
    pub(crate) fn table(&self, store: StoreName) -> &BTreeMap<String, Value> {
        match store {
            StoreName::Chains => &self.chains,
            StoreName::Records => &self.records,
        }
    }

    pub(crate) fn table_mut(&mut self, store: StoreName) -> &mut BTreeMap<String, Value> {
        match store {
            StoreName::Chains => &mut self.chains,
            StoreName::Records => &mut self.records,
        }
    }
}

/// Staged transaction write: `Some` pending put, `None` pending remove.
pub(crate) type Overlay = BTreeMap<(StoreName, String), Option<Value>>;

/// Apply a staged overlay to the tables, returning the stores touched.
pub(crate) fn apply_overlay(tables: &mut Tables, staged: Overlay) -> Vec<StoreName> {
    let mut touched = Vec::new();
    for ((store, key), staged) in staged {
        if !touched.contains(&store) {
            touched.push(store);
        }
        match staged {
            Some(value) => {
                tables.table_mut(store).insert(key, value);
            }
            None => {
                tables.table_mut(store).remove(&key);
            }
        }
    }
    touched
}
