//! In-memory KV engine.
//!
//! The default engine for tests and single-process use. One mutex guards
//! both stores; a transaction holds the guard for its whole lifetime, which
//! serializes conflicting transactions. Writes stage in an overlay and are
//! applied atomically on commit.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::core::Value;

use super::{KvEngine, KvError, KvTransaction, Overlay, StoreName, Tables, apply_overlay};

pub struct MemoryKv {
    name: String,
    tables: Mutex<Tables>,
}

impl MemoryKv {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Mutex::new(Tables::default()),
        }
    }

    /// The database name this engine was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, KvError> {
        self.tables.lock().map_err(|_| KvError::LockPoisoned)
    }
}

impl KvEngine for MemoryKv {
    fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>, KvError> {
        let tables = self.lock()?;
        Ok(tables.table(store).get(key).cloned())
    }

    fn put(&self, store: StoreName, key: &str, value: Value) -> Result<bool, KvError> {
        let mut tables = self.lock()?;
        tables.table_mut(store).insert(key.to_string(), value);
        Ok(true)
    }

    fn remove(&self, store: StoreName, key: &str) -> Result<bool, KvError> {
        let mut tables = self.lock()?;
        Ok(tables.table_mut(store).remove(key).is_some())
    }

    fn keys(&self, store: StoreName) -> Result<Vec<String>, KvError> {
        let tables = self.lock()?;
        Ok(tables.table(store).keys().cloned().collect())
    }

    fn begin(&self, _stores: &[StoreName]) -> Result<Box<dyn KvTransaction + '_>, KvError> {
        // The single guard already covers every store; the scope list only
        // matters for engines with finer-grained locking.
        let guard = self.lock()?;
        Ok(Box::new(MemoryTxn {
            guard,
            staged: BTreeMap::new(),
        }))
    }
}

struct MemoryTxn<'a> {
    guard: MutexGuard<'a, Tables>,
    staged: Overlay,
}

impl KvTransaction for MemoryTxn<'_> {
    fn get(&mut self, store: StoreName, key: &str) -> Result<Option<Value>, KvError> {
        if let Some(staged) = self.staged.get(&(store, key.to_string())) {
            return Ok(staged.clone());
        }
        Ok(self.guard.table(store).get(key).cloned())
    }

    fn put(&mut self, store: StoreName, key: &str, value: Value) -> Result<bool, KvError> {
        self.staged.insert((store, key.to_string()), Some(value));
        Ok(true)
    }

    fn remove(&mut self, store: StoreName, key: &str) -> Result<bool, KvError> {
        let existed = self.get(store, key)?.is_some();
        self.staged.insert((store, key.to_string()), None);
        Ok(existed)
    }

    fn commit(self: Box<Self>) -> Result<(), KvError> {
        let mut this = *self;
        apply_overlay(&mut this.guard, std::mem::take(&mut this.staged));
        Ok(())
    }
}
