//! Shared helpers for the integration suites.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender, unbounded};

use tactical::{
    BackendChannel, BackendError, ChainKey, ChainStore, DataFrame, FailureFrame, KvEngine,
    Limits, MemoryKv, StoreName, Value,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// A chain store over a fresh in-memory engine, plus the engine for
/// white-box assertions on persisted keys.
pub fn store() -> (Arc<ChainStore>, Arc<MemoryKv>) {
    let kv = Arc::new(MemoryKv::new("test_db"));
    let store = Arc::new(ChainStore::new(kv.clone(), &Limits::default()));
    (store, kv)
}

pub fn key(name: &str) -> ChainKey {
    ChainKey::new(Value::Object(
        [("key".to_string(), Value::Str(name.to_string()))].into(),
    ))
    .unwrap()
}

pub fn val(s: &str) -> Value {
    Value::Object([("v".to_string(), Value::Str(s.to_string()))].into())
}

pub fn ctx(s: &str) -> Value {
    Value::Object([("t".to_string(), Value::Str(s.to_string()))].into())
}

/// Record keys currently persisted for pending/outdated mutations
/// (`sub > 0`).
pub fn mutation_record_keys(kv: &MemoryKv) -> Vec<String> {
    kv.keys(StoreName::Records)
        .unwrap()
        .into_iter()
        .filter(|key| !key.contains("\"sub\":0"))
        .collect()
}

/// Poll until `probe` returns `Some`, failing after the deadline.
pub fn wait_for<T>(what: &str, mut probe: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(found) = probe() {
            return found;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Request {
        key: ChainKey,
    },
    Mutate {
        key: ChainKey,
        base: String,
        value: Value,
        context: Value,
    },
}

/// In-process backend double: records outbound traffic, lets tests inject
/// inbound frames.
pub struct MockBackend {
    outbound: Mutex<Vec<Outbound>>,
    data_tx: Sender<DataFrame>,
    data_rx: Receiver<DataFrame>,
    failed_tx: Sender<FailureFrame>,
    failed_rx: Receiver<FailureFrame>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        let (data_tx, data_rx) = unbounded();
        let (failed_tx, failed_rx) = unbounded();
        Arc::new(Self {
            outbound: Mutex::new(Vec::new()),
            data_tx,
            data_rx,
            failed_tx,
            failed_rx,
        })
    }

    pub fn outbound(&self) -> Vec<Outbound> {
        self.outbound.lock().unwrap().clone()
    }

    pub fn mutates(&self) -> Vec<Outbound> {
        self.outbound()
            .into_iter()
            .filter(|frame| matches!(frame, Outbound::Mutate { .. }))
            .collect()
    }

    pub fn requests(&self) -> Vec<Outbound> {
        self.outbound()
            .into_iter()
            .filter(|frame| matches!(frame, Outbound::Request { .. }))
            .collect()
    }

    pub fn inject_data(&self, frame: DataFrame) {
        self.data_tx.send(frame).unwrap();
    }

    pub fn inject_failure(&self, frame: FailureFrame) {
        self.failed_tx.send(frame).unwrap();
    }
}

impl BackendChannel for MockBackend {
    fn request(&self, key: &ChainKey) -> Result<(), BackendError> {
        self.outbound
            .lock()
            .unwrap()
            .push(Outbound::Request { key: key.clone() });
        Ok(())
    }

    fn mutate(
        &self,
        key: &ChainKey,
        base: &str,
        value: &Value,
        context: &Value,
    ) -> Result<(), BackendError> {
        self.outbound.lock().unwrap().push(Outbound::Mutate {
            key: key.clone(),
            base: base.to_string(),
            value: value.clone(),
            context: context.clone(),
        });
        Ok(())
    }

    fn data(&self) -> Receiver<DataFrame> {
        self.data_rx.clone()
    }

    fn failed(&self) -> Receiver<FailureFrame> {
        self.failed_rx.clone()
    }
}
