//! File-backed KV engine.
//!
//! One JSON snapshot per store inside a database directory. Reads are
//! served from memory; every write rewrites the touched snapshot with
//! write-to-temp + fsync + rename, so a crash leaves either the old or the
//! new file, never a torn one. Suited to client-side datasets that fit in
//! memory.
//!
//! Snapshots are atomic per store, not across stores. A transaction
//! persists records before chains: after a crash between the two, chain
//! metadata may lag the record files, which at worst reads as a missing
//! head record (served as absent), never as metadata pointing into the
//! future.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::core::Value;

use super::{KvEngine, KvError, KvTransaction, Overlay, StoreName, Tables, apply_overlay};

#[derive(Debug)]
pub struct FileKv {
    dir: PathBuf,
    tables: Mutex<Tables>,
}

impl FileKv {
    /// Open (or create) the database directory and load its snapshots.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, KvError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| io_error(&dir, &err))?;

        let mut tables = Tables::default();
        for store in StoreName::ALL {
            *tables.table_mut(store) = load_snapshot(&snapshot_path(&dir, store))?;
        }
        debug!(dir = %dir.display(), "file kv opened");

        Ok(Self {
            dir,
            tables: Mutex::new(tables),
        })
    }

    /// The database directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, KvError> {
        self.tables.lock().map_err(|_| KvError::LockPoisoned)
    }

    fn persist(&self, tables: &Tables, store: StoreName) -> Result<(), KvError> {
        write_snapshot(&self.dir, &snapshot_path(&self.dir, store), tables.table(store))
    }
}

impl KvEngine for FileKv {
    fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>, KvError> {
        let tables = self.lock()?;
        Ok(tables.table(store).get(key).cloned())
    }

    fn put(&self, store: StoreName, key: &str, value: Value) -> Result<bool, KvError> {
        let mut tables = self.lock()?;
        tables.table_mut(store).insert(key.to_string(), value);
        self.persist(&tables, store)?;
        Ok(true)
    }

    fn remove(&self, store: StoreName, key: &str) -> Result<bool, KvError> {
        let mut tables = self.lock()?;
        let existed = tables.table_mut(store).remove(key).is_some();
        if existed {
            self.persist(&tables, store)?;
        }
        Ok(existed)
    }

    fn keys(&self, store: StoreName) -> Result<Vec<String>, KvError> {
        let tables = self.lock()?;
        Ok(tables.table(store).keys().cloned().collect())
    }

    fn begin(&self, _stores: &[StoreName]) -> Result<Box<dyn KvTransaction + '_>, KvError> {
        let guard = self.lock()?;
        Ok(Box::new(FileTxn {
            engine: self,
            guard,
            staged: BTreeMap::new(),
        }))
    }
}

struct FileTxn<'a> {
    engine: &'a FileKv,
    guard: MutexGuard<'a, Tables>,
    staged: Overlay,
}

impl KvTransaction for FileTxn<'_> {
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
        let mut touched = apply_overlay(&mut this.guard, std::mem::take(&mut this.staged));
        // Records land on disk before the chain metadata that references
        // them; see the module doc for the crash ordering argument.
        touched.sort_by_key(|store| match store {
            StoreName::Records => 0,
            StoreName::Chains => 1,
        });
        for store in touched {
            this.engine.persist(&this.guard, store)?;
        }
        Ok(())
    }
}

fn snapshot_path(dir: &Path, store: StoreName) -> PathBuf {
    dir.join(format!("{}.json", store.as_str()))
}

fn load_snapshot(path: &Path) -> Result<BTreeMap<String, Value>, KvError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = fs::read_to_string(path).map_err(|err| io_error(path, &err))?;
    serde_json::from_str(&contents).map_err(|err| KvError::Io {
        reason: format!("{}: snapshot parse failed: {err}", path.display()),
    })
}

/// Write-to-temp + fsync + rename, then fsync the directory so the rename
/// itself is durable.
fn write_snapshot(
    dir: &Path,
    path: &Path,
    table: &BTreeMap<String, Value>,
) -> Result<(), KvError> {
    let tmp_path = path.with_extension("json.tmp");
    let data = serde_json::to_vec(table).map_err(|err| KvError::Io {
        reason: format!("{}: snapshot encode failed: {err}", path.display()),
    })?;

    let mut file = File::create(&tmp_path).map_err(|err| io_error(&tmp_path, &err))?;
    file.write_all(&data).map_err(|err| io_error(&tmp_path, &err))?;
    file.sync_all().map_err(|err| io_error(&tmp_path, &err))?;

    fs::rename(&tmp_path, path).map_err(|err| io_error(path, &err))?;

    #[cfg(unix)]
    {
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
    }

    Ok(())
}

fn io_error(path: &Path, err: &std::io::Error) -> KvError {
    KvError::Io {
        reason: format!("{}: {err}", path.display()),
    }
}
