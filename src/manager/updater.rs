//! Updater handles.

use std::sync::Arc;

use crate::core::{ChainKey, Patch, PatchError, Record, StoreError, Value, Version};
use crate::store::ChainStore;

/// One observed record plus the handle to commit a successor.
///
/// `value` is public: modify it in place (or replace it with a patched
/// copy), then `commit`. The commit targets the version this handle was
/// built from, so a head that moved in the meantime is rejected with
/// `OutdatedTargetVersion` rather than silently overwritten.
pub struct Updater {
    key: ChainKey,
    version: Version,
    pub value: Value,
    store: Arc<ChainStore>,
}

impl Updater {
    pub(crate) fn new(key: ChainKey, record: Record, store: Arc<ChainStore>) -> Self {
        Self {
            key,
            version: record.version,
            value: record.value,
            store,
        }
    }

    pub fn key(&self) -> &ChainKey {
        &self.key
    }

    /// The version the observed record carried.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Replace the handle's value with the patched one. The observed value
    /// is the patch input; a failed patch leaves the handle untouched.
    pub fn apply(&mut self, patch: &Patch) -> Result<(), PatchError> {
        self.value = patch.apply(&self.value)?;
        Ok(())
    }

    /// Commit the handle's value as a mutation of the observed version,
    /// with an empty context.
    pub fn commit(self) -> Result<(), StoreError> {
        self.store
            .commit(&self.key, &self.version, self.value, Value::empty_object())
    }
}
