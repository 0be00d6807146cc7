//! The version chain store.
//!
//! One chain per logical object. A chain is created by the first `push`,
//! grows through alternating `push` (server frames) and `commit` (local
//! mutations), and shrinks through `abandon` and push-time garbage
//! collection. Per chain the store keeps the head (`current`), the list of
//! superseded-but-unresolved mutations (`outdated`), and one record per
//! live version. The head's initial record is always retained while a
//! mutation is pending so the mutation can be rebased or diffed.
//!
//! Every write operation runs inside a single KV transaction; conflict and
//! pending events are published only after the transaction commits, so a
//! failed transaction is invisible to subscribers.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::Limits;
use crate::core::{
    ChainKey, ChainState, Entry, Record, StoreError, Value, Version, decode_from_value,
    encode_as_value,
};
use crate::kv::{KvEngine, KvTransaction, StoreName};

pub mod events;

pub use events::{Broadcaster, Replay, StreamError, Subscription};

/// A pending mutation was superseded by a server push and retained for
/// application-driven resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct OutdatedMutation {
    pub key: ChainKey,
    /// The new head the push installed.
    pub current: Record,
    /// The superseded local mutation.
    pub mutation: Record,
    /// The initial the mutation was layered on; its rebase anchor.
    pub initial: Record,
}

/// A local mutation became the chain head and awaits acknowledgment.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingMutation {
    pub key: ChainKey,
    pub mutation: Record,
}

pub struct ChainStore {
    kv: Arc<dyn KvEngine>,
    outdated: Broadcaster<OutdatedMutation>,
    pending: Broadcaster<PendingMutation>,
}

impl ChainStore {
    pub fn new(kv: Arc<dyn KvEngine>, limits: &Limits) -> Self {
        Self {
            kv,
            outdated: Broadcaster::new(Replay::None, limits.max_stream_subscribers),
            pending: Broadcaster::new(Replay::None, limits.max_stream_subscribers),
        }
    }

    /// Subscribe to superseded-mutation events. Hot; no history.
    pub fn outdated(&self) -> Result<Subscription<OutdatedMutation>, StreamError> {
        self.outdated.subscribe()
    }

    /// Subscribe to pending-mutation events. Hot; no history.
    pub fn pending(&self) -> Result<Subscription<PendingMutation>, StreamError> {
        self.pending.subscribe()
    }

    /// The record at the chain head, or `None` for an unknown chain or a
    /// chain whose head record is missing from the records store.
    pub fn fetch(&self, key: &ChainKey) -> Result<Option<Record>, StoreError> {
        let mut txn = self.kv.begin(&StoreName::ALL)?;
        let Some(state) = read_state(txn.as_mut(), key)? else {
            return Ok(None);
        };
        let record = read_record(txn.as_mut(), key, &state.current)?;
        txn.commit()?;
        if record.is_none() {
            warn!(chain = %key, "head record missing from records store");
        }
        Ok(record)
    }

    /// The record at one specific version. Does not consult chain state.
    pub fn fetch_version(
        &self,
        key: &ChainKey,
        version: &Version,
    ) -> Result<Option<Record>, StoreError> {
        match self.kv.get(StoreName::Records, &key.record_serial(version))? {
            Some(blob) => {
                let entry: Entry = decode_from_value(blob)?;
                Ok(Some(Record::from_entry(version.clone(), entry)))
            }
            None => Ok(None),
        }
    }

    /// Ingest a server-authoritative version.
    ///
    /// Installs `(base, 0)` as the new head. A pending mutation at the old
    /// head either resolves (when `resolves` names it - the ack path, its
    /// records are collected) or moves to the outdated list and is announced
    /// on the `outdated` stream. A superseded initial head is collected
    /// outright.
    pub fn push(
        &self,
        key: &ChainKey,
        base: &str,
        value: Value,
        resolves: Option<&Version>,
    ) -> Result<(), StoreError> {
        let push_v = Version::initial_of(base);
        let mut event = None;

        let mut txn = self.kv.begin(&StoreName::ALL)?;
        match read_state(txn.as_mut(), key)? {
            None => {
                write_state(txn.as_mut(), key, &ChainState::new(push_v.clone()))?;
                write_record(
                    txn.as_mut(),
                    key,
                    &push_v,
                    &Entry {
                        value,
                        context: Value::empty_object(),
                    },
                )?;
                txn.commit()?;
                debug!(chain = %key, base, "chain created");
                return Ok(());
            }
            Some(mut state) => {
                let prev = state.current.clone();
                let is_outdated = !prev.is_initial();
                let is_resolved = resolves.is_some_and(|version| *version == prev);

                state.current = push_v.clone();
                if is_outdated && !is_resolved {
                    state.outdated.push(prev.clone());
                }

                write_record(
                    txn.as_mut(),
                    key,
                    &push_v,
                    &Entry {
                        value: value.clone(),
                        context: Value::empty_object(),
                    },
                )?;

                if prev != push_v {
                    if prev.is_initial() || is_resolved {
                        remove_record(txn.as_mut(), key, &prev)?;
                        if !prev.is_initial() {
                            remove_record(txn.as_mut(), key, &prev.initial())?;
                        }
                        trace!(chain = %key, superseded = %prev, "collected superseded records");
                    } else {
                        let mutation = read_record(txn.as_mut(), key, &prev)?;
                        let initial = read_record(txn.as_mut(), key, &prev.initial())?;
                        match (mutation, initial) {
                            (Some(mutation), Some(initial)) => {
                                event = Some(OutdatedMutation {
                                    key: key.clone(),
                                    current: Record::new(
                                        push_v.clone(),
                                        value,
                                        Value::empty_object(),
                                    ),
                                    mutation,
                                    initial,
                                });
                            }
                            _ => {
                                warn!(
                                    chain = %key,
                                    mutation = %prev,
                                    "outdated mutation records missing; event suppressed"
                                );
                            }
                        }
                    }
                }

                write_state(txn.as_mut(), key, &state)?;
            }
        }
        txn.commit()?;

        if let Some(event) = event {
            debug!(chain = %key, mutation = %event.mutation.version, "mutation outdated by push");
            if self.outdated.publish(event).is_err() {
                warn!(chain = %key, "outdated stream unavailable");
            }
        }
        Ok(())
    }

    /// Layer a local mutation on the current head.
    ///
    /// `target` must name the head the caller based its mutation on; a
    /// stale target fails with `OutdatedTargetVersion` and changes nothing.
    /// A previous pending mutation is replaced (its record removed); the
    /// initial record is never touched, so at most one record with
    /// `sub > 0` exists per chain.
    pub fn commit(
        &self,
        key: &ChainKey,
        target: &Version,
        mutation: Value,
        context: Value,
    ) -> Result<(), StoreError> {
        let mut txn = self.kv.begin(&StoreName::ALL)?;
        let Some(mut state) = read_state(txn.as_mut(), key)? else {
            return Err(StoreError::KeyNotFound { key: key.clone() });
        };

        let prev = state.current.clone();
        if *target != prev {
            return Err(StoreError::OutdatedTargetVersion {
                key: key.clone(),
                current: prev,
                target: target.clone(),
                mutation,
                context,
            });
        }

        let mut_v = prev.mutation();
        state.current = mut_v.clone();
        write_record(
            txn.as_mut(),
            key,
            &mut_v,
            &Entry {
                value: mutation.clone(),
                context: context.clone(),
            },
        )?;
        if !prev.is_initial() {
            remove_record(txn.as_mut(), key, &prev)?;
        }
        write_state(txn.as_mut(), key, &state)?;
        txn.commit()?;

        debug!(chain = %key, version = %mut_v, "mutation committed");
        let event = PendingMutation {
            key: key.clone(),
            mutation: Record::new(mut_v, mutation, context),
        };
        if self.pending.publish(event).is_err() {
            warn!(chain = %key, "pending stream unavailable");
        }
        Ok(())
    }

    /// Discard a pending or outdated mutation.
    ///
    /// Abandoning the pending head rewinds the chain to its initial;
    /// abandoning an outdated mutation drops it and its initial from the
    /// record store. Initials themselves cannot be abandoned.
    pub fn abandon(&self, key: &ChainKey, target: &Version) -> Result<(), StoreError> {
        let mut txn = self.kv.begin(&StoreName::ALL)?;
        let Some(mut state) = read_state(txn.as_mut(), key)? else {
            return Err(StoreError::KeyNotFound { key: key.clone() });
        };
        if target.is_initial() {
            return Err(StoreError::InvalidInitialTargetVersion {
                key: key.clone(),
                target: target.clone(),
            });
        }

        if *target == state.current {
            state.current = target.initial();
            remove_record(txn.as_mut(), key, target)?;
            debug!(chain = %key, abandoned = %target, "pending head abandoned");
        } else if let Some(position) = state.outdated.iter().position(|version| version == target) {
            state.outdated.remove(position);
            remove_record(txn.as_mut(), key, target)?;
            remove_record(txn.as_mut(), key, &target.initial())?;
            debug!(chain = %key, abandoned = %target, "outdated mutation abandoned");
        }

        write_state(txn.as_mut(), key, &state)?;
        txn.commit()?;
        Ok(())
    }

    /// Chain metadata: head and outdated list. Lets applications
    /// re-discover unresolved mutations after a restart.
    pub fn state(&self, key: &ChainKey) -> Result<Option<ChainState>, StoreError> {
        match self.kv.get(StoreName::Chains, key.serial())? {
            Some(blob) => Ok(Some(decode_from_value(blob)?)),
            None => Ok(None),
        }
    }

    /// Serialized keys of every persisted chain.
    pub fn chains(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.kv.keys(StoreName::Chains)?)
    }

    /// Every live record of one chain: the head, its retained initial, and
    /// any outdated mutations with theirs.
    pub fn records(&self, key: &ChainKey) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::new();
        for record_key in self.kv.keys(StoreName::Records)? {
            let Some(serial) = record_key.strip_prefix(key.serial()) else {
                continue;
            };
            // A non-version suffix means the prefix match was a different
            // chain whose serial merely starts with ours.
            let Ok(version) = serde_json::from_str::<Version>(serial) else {
                continue;
            };
            if let Some(record) = self.fetch_version(key, &version)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn read_state(
    txn: &mut dyn KvTransaction,
    key: &ChainKey,
) -> Result<Option<ChainState>, StoreError> {
    match txn.get(StoreName::Chains, key.serial())? {
        Some(blob) => Ok(Some(decode_from_value(blob)?)),
        None => Ok(None),
    }
}

fn write_state(
    txn: &mut dyn KvTransaction,
    key: &ChainKey,
    state: &ChainState,
) -> Result<(), StoreError> {
    let blob = encode_as_value(state)?;
    txn.put(StoreName::Chains, key.serial(), blob)?;
    Ok(())
}

fn read_record(
    txn: &mut dyn KvTransaction,
    key: &ChainKey,
    version: &Version,
) -> Result<Option<Record>, StoreError> {
    match txn.get(StoreName::Records, &key.record_serial(version))? {
        Some(blob) => {
            let entry: Entry = decode_from_value(blob)?;
            Ok(Some(Record::from_entry(version.clone(), entry)))
        }
        None => Ok(None),
    }
}

fn write_record(
    txn: &mut dyn KvTransaction,
    key: &ChainKey,
    version: &Version,
    entry: &Entry,
) -> Result<(), StoreError> {
    let blob = encode_as_value(entry)?;
    txn.put(StoreName::Records, &key.record_serial(version), blob)?;
    Ok(())
}

fn remove_record(
    txn: &mut dyn KvTransaction,
    key: &ChainKey,
    version: &Version,
) -> Result<(), StoreError> {
    txn.remove(StoreName::Records, &key.record_serial(version))?;
    Ok(())
}
