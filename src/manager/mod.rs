//! Per-key reactive fan-out over the chain store and a backend channel.
//!
//! The manager owns one stream per requested key. Streams are created on
//! first `request`/`begin_update` (seeded from the store, announced to the
//! backend) and torn down when their last subscriber drops. A single pump
//! thread joins the inbound side: backend data frames are pushed into the
//! store and fanned out, pending mutations are forwarded to the backend,
//! failure frames are surfaced on the `failures` stream.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::backend::{BackendChannel, BackendError, DataFrame, FailureFrame};
use crate::config::Limits;
use crate::core::{ChainKey, Record, StoreError, Value, Version, to_canon_string};
use crate::store::{
    Broadcaster, ChainStore, PendingMutation, Replay, StreamError, Subscription,
};

pub mod updater;

pub use updater::Updater;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("manager pump thread failed to start: {reason}")]
    PumpSpawn { reason: String },
}

struct KeyEntry {
    stream: Broadcaster<Record>,
}

struct Shared {
    store: Arc<ChainStore>,
    backend: Arc<dyn BackendChannel>,
    limits: Limits,
    entries: Mutex<HashMap<String, KeyEntry>>,
    failures: Broadcaster<FailureFrame>,
}

impl Shared {
    /// Fan a record out to the key's stream, if anyone holds one.
    fn publish_record(&self, serial: &str, record: Record) {
        let Ok(entries) = self.entries.lock() else {
            warn!("entry registry poisoned; record dropped");
            return;
        };
        if let Some(entry) = entries.get(serial)
            && entry.stream.publish(record).is_err()
        {
            warn!(serial, "per-key stream unavailable");
        }
    }
}

pub struct DataManager {
    shared: Arc<Shared>,
    shutdown: Sender<()>,
    pump: Option<JoinHandle<()>>,
}

impl DataManager {
    /// Wire the store to the backend and start the pump thread.
    pub fn start(
        store: Arc<ChainStore>,
        backend: Arc<dyn BackendChannel>,
        limits: Limits,
    ) -> Result<Self, ManagerError> {
        let pending = store.pending()?;
        let data_rx = backend.data();
        let failed_rx = backend.failed();

        let shared = Arc::new(Shared {
            store,
            backend,
            limits,
            entries: Mutex::new(HashMap::new()),
            failures: Broadcaster::new(Replay::None, limits.max_stream_subscribers),
        });

        let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded(1);
        let pump_shared = Arc::clone(&shared);
        let pump = std::thread::Builder::new()
            .name("tactical-manager".to_string())
            .spawn(move || pump(pump_shared, data_rx, failed_rx, pending, shutdown_rx))
            .map_err(|err| ManagerError::PumpSpawn {
                reason: err.to_string(),
            })?;

        Ok(Self {
            shared,
            shutdown: shutdown_tx,
            pump: Some(pump),
        })
    }

    /// Subscribe to the values of one key.
    ///
    /// The first call for a key asks the backend for its latest version and
    /// seeds the stream with the locally-servable record, if any; that seed
    /// (or the latest later delivery) replays to every new subscriber.
    pub fn request(&self, key: &ChainKey) -> Result<ValueSubscription, ManagerError> {
        let (stream, entry) = self.ensure_entry(key)?;
        let inner = stream.subscribe()?;
        Ok(ValueSubscription {
            inner,
            _entry: entry,
        })
    }

    /// Subscribe to one key as a stream of update handles, one per observed
    /// record.
    pub fn begin_update(&self, key: &ChainKey) -> Result<UpdaterSubscription, ManagerError> {
        let (stream, entry) = self.ensure_entry(key)?;
        let inner = stream.subscribe()?;
        Ok(UpdaterSubscription {
            inner,
            key: key.clone(),
            store: Arc::clone(&self.shared.store),
            _entry: entry,
        })
    }

    /// Rejected-mutation notifications. Hot; no history.
    pub fn failures(&self) -> Result<Subscription<FailureFrame>, StreamError> {
        self.shared.failures.subscribe()
    }

    fn ensure_entry(
        &self,
        key: &ChainKey,
    ) -> Result<(Broadcaster<Record>, EntryGuard), ManagerError> {
        let serial = key.serial().to_string();
        let mut entries = self
            .shared
            .entries
            .lock()
            .map_err(|_| ManagerError::Stream(StreamError::LockPoisoned))?;

        if let Some(entry) = entries.get(&serial) {
            return Ok((
                entry.stream.clone(),
                EntryGuard {
                    shared: Arc::downgrade(&self.shared),
                    serial,
                },
            ));
        }

        let stream = Broadcaster::new(Replay::LastOne, self.shared.limits.max_stream_subscribers);
        // Serve what we have before the backend answers.
        if let Some(record) = self.shared.store.fetch(key)? {
            let _ = stream.publish(record);
        }
        self.shared.backend.request(key)?;
        entries.insert(
            serial.clone(),
            KeyEntry {
                stream: stream.clone(),
            },
        );
        debug!(chain = %key, "per-key stream created");

        Ok((
            stream,
            EntryGuard {
                shared: Arc::downgrade(&self.shared),
                serial,
            },
        ))
    }
}

impl Drop for DataManager {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

/// Keeps the per-key entry alive; the drop of the last guard for a key
/// removes the entry once no subscribers remain.
struct EntryGuard {
    shared: Weak<Shared>,
    serial: String,
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let Ok(mut entries) = shared.entries.lock() else {
            return;
        };
        let deserted = entries
            .get(&self.serial)
            .map(|entry| entry.stream.subscriber_count().unwrap_or(0) == 0)
            .unwrap_or(false);
        if deserted {
            entries.remove(&self.serial);
            debug!(serial = %self.serial, "per-key stream torn down");
        }
    }
}

/// A per-key stream viewed as values.
pub struct ValueSubscription {
    inner: Subscription<Record>,
    _entry: EntryGuard,
}

impl ValueSubscription {
    pub fn recv(&self) -> Result<Value, RecvError> {
        self.inner.recv().map(|record| record.value)
    }

    pub fn try_recv(&self) -> Result<Value, TryRecvError> {
        self.inner.try_recv().map(|record| record.value)
    }

    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Result<Value, RecvTimeoutError> {
        self.inner.recv_timeout(timeout).map(|record| record.value)
    }
}

/// A per-key stream viewed as update handles.
pub struct UpdaterSubscription {
    inner: Subscription<Record>,
    key: ChainKey,
    store: Arc<ChainStore>,
    _entry: EntryGuard,
}

impl UpdaterSubscription {
    pub fn recv(&self) -> Result<Updater, RecvError> {
        self.inner.recv().map(|record| self.handle(record))
    }

    pub fn try_recv(&self) -> Result<Updater, TryRecvError> {
        self.inner.try_recv().map(|record| self.handle(record))
    }

    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Result<Updater, RecvTimeoutError> {
        self.inner
            .recv_timeout(timeout)
            .map(|record| self.handle(record))
    }

    fn handle(&self, record: Record) -> Updater {
        Updater::new(self.key.clone(), record, Arc::clone(&self.store))
    }
}

enum PumpInput {
    Data(Result<DataFrame, RecvError>),
    Failed(Result<FailureFrame, RecvError>),
    Pending(Result<PendingMutation, RecvError>),
    Shutdown,
}

fn pump(
    shared: Arc<Shared>,
    data_rx: Receiver<DataFrame>,
    failed_rx: Receiver<FailureFrame>,
    pending: Subscription<PendingMutation>,
    shutdown_rx: Receiver<()>,
) {
    let mut ledger = MutationLedger::new(shared.limits.max_tracked_mutations);
    let mut data_rx = data_rx;
    let mut failed_rx = failed_rx;
    let mut pending_rx = pending.receiver().clone();

    loop {
        let input = crossbeam::select! {
            recv(data_rx) -> frame => PumpInput::Data(frame),
            recv(failed_rx) -> frame => PumpInput::Failed(frame),
            recv(pending_rx) -> event => PumpInput::Pending(event),
            recv(shutdown_rx) -> _ => PumpInput::Shutdown,
        };

        match input {
            PumpInput::Data(Ok(frame)) => handle_data(&shared, &mut ledger, frame),
            PumpInput::Data(Err(_)) => {
                warn!("backend data channel closed");
                data_rx = crossbeam::channel::never();
            }
            PumpInput::Failed(Ok(frame)) => handle_failure(&shared, &mut ledger, frame),
            PumpInput::Failed(Err(_)) => {
                failed_rx = crossbeam::channel::never();
            }
            PumpInput::Pending(Ok(event)) => handle_pending(&shared, &mut ledger, event),
            PumpInput::Pending(Err(_)) => {
                pending_rx = crossbeam::channel::never();
            }
            PumpInput::Shutdown => {
                trace!("manager pump stopped");
                break;
            }
        }
    }
}

fn handle_data(shared: &Shared, ledger: &mut MutationLedger, frame: DataFrame) {
    let key = match ChainKey::new(frame.key) {
        Ok(key) => key,
        Err(err) => {
            warn!(%err, "data frame carried an unusable key");
            return;
        }
    };

    let resolves = frame
        .mutation_context
        .as_ref()
        .and_then(|context| ledger.take(&key, context));
    if let Some(resolved) = &resolves {
        trace!(chain = %key, version = %resolved, "data frame acknowledges mutation");
    }

    if let Err(err) = shared
        .store
        .push(&key, &frame.version, frame.data.clone(), resolves.as_ref())
    {
        warn!(chain = %key, %err, "push of backend data failed");
        return;
    }

    let record = Record::new(
        Version::initial_of(frame.version),
        frame.data,
        Value::empty_object(),
    );
    shared.publish_record(key.serial(), record);
}

fn handle_pending(shared: &Shared, ledger: &mut MutationLedger, event: PendingMutation) {
    let PendingMutation { key, mutation } = event;

    match shared
        .backend
        .mutate(&key, &mutation.version.base, &mutation.value, &mutation.context)
    {
        Ok(()) => ledger.insert(&key, &mutation.context, mutation.version.clone()),
        Err(err) => warn!(chain = %key, %err, "backend mutate failed"),
    }

    // Local subscribers observe their own writes without a round trip.
    shared.publish_record(key.serial(), mutation);
}

fn handle_failure(shared: &Shared, ledger: &mut MutationLedger, frame: FailureFrame) {
    match ChainKey::new(frame.key.clone()) {
        Ok(key) => {
            ledger.discard(&key, &frame.context);
            debug!(chain = %key, reason = %frame.reason, "mutation rejected by backend");
        }
        Err(err) => warn!(%err, "failure frame carried an unusable key"),
    }
    if shared.failures.publish(frame).is_err() {
        warn!("failures stream unavailable");
    }
}

/// Forwarded-but-unacknowledged mutations, keyed by (chain, context).
///
/// A data frame echoing a context resolves to the version recorded here so
/// the store push can acknowledge the right mutation. Bounded; the oldest
/// entry is evicted first, which only costs an acknowledgment (the push
/// then outdates instead of resolving).
struct MutationLedger {
    cap: usize,
    entries: HashMap<(String, String), Version>,
    order: VecDeque<(String, String)>,
}

impl MutationLedger {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn slot(key: &ChainKey, context: &Value) -> Option<(String, String)> {
        match to_canon_string(context) {
            Ok(context) => Some((key.serial().to_string(), context)),
            Err(err) => {
                warn!(chain = %key, %err, "mutation context not canonicalizable; ack matching disabled");
                None
            }
        }
    }

    fn insert(&mut self, key: &ChainKey, context: &Value, version: Version) {
        let Some(slot) = Self::slot(key, context) else {
            return;
        };
        if self.entries.insert(slot.clone(), version).is_none() {
            self.order.push_back(slot);
        }
        while self.entries.len() > self.cap {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                warn!("mutation ledger full; oldest entry evicted");
            }
        }
    }

    fn take(&mut self, key: &ChainKey, context: &Value) -> Option<Version> {
        let slot = Self::slot(key, context)?;
        let version = self.entries.remove(&slot)?;
        self.order.retain(|held| held != &slot);
        Some(version)
    }

    fn discard(&mut self, key: &ChainKey, context: &Value) {
        let _ = self.take(key, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ChainKey {
        ChainKey::new(Value::Object(
            [("key".to_string(), Value::Str(name.to_string()))].into(),
        ))
        .unwrap()
    }

    fn ctx(name: &str) -> Value {
        Value::Object([("t".to_string(), Value::Str(name.to_string()))].into())
    }

    #[test]
    fn ledger_resolves_by_chain_and_context() {
        let mut ledger = MutationLedger::new(8);
        let version = Version {
            base: "b".to_string(),
            sub: 42,
        };
        ledger.insert(&key("k"), &ctx("a"), version.clone());

        assert_eq!(ledger.take(&key("other"), &ctx("a")), None);
        assert_eq!(ledger.take(&key("k"), &ctx("b")), None);
        assert_eq!(ledger.take(&key("k"), &ctx("a")), Some(version));
        // one-shot
        assert_eq!(ledger.take(&key("k"), &ctx("a")), None);
    }

    #[test]
    fn ledger_last_insert_wins_for_one_slot() {
        let mut ledger = MutationLedger::new(8);
        let older = Version {
            base: "b".to_string(),
            sub: 1,
        };
        let newer = Version {
            base: "b".to_string(),
            sub: 2,
        };
        ledger.insert(&key("k"), &ctx("a"), older);
        ledger.insert(&key("k"), &ctx("a"), newer.clone());
        assert_eq!(ledger.take(&key("k"), &ctx("a")), Some(newer));
    }

    #[test]
    fn ledger_evicts_oldest_past_capacity() {
        let mut ledger = MutationLedger::new(2);
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            ledger.insert(
                &key("k"),
                &ctx(name),
                Version {
                    base: "b".to_string(),
                    sub: i as u32 + 1,
                },
            );
        }

        assert_eq!(ledger.take(&key("k"), &ctx("a")), None);
        assert!(ledger.take(&key("k"), &ctx("b")).is_some());
        assert!(ledger.take(&key("k"), &ctx("c")).is_some());
    }
}
