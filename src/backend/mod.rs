//! Backend channel contract.
//!
//! The wire transport is external; the data manager only needs the four
//! capabilities below. Inbound frames arrive on plain channel receivers so
//! the manager pump can select over them alongside its other inputs.

use crossbeam::channel::Receiver;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{ChainKey, Value};

/// The backend's latest value for one key.
///
/// When the frame is the outcome of a previously-submitted mutation,
/// `mutation_context` echoes the context from that `mutate` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub key: Value,
    pub version: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_context: Option<Value>,
}

/// A mutation was rejected for a non-version reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureFrame {
    pub key: Value,
    pub base_version: String,
    pub context: Value,
    pub reason: String,
    pub debugging_info: Value,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend channel unavailable: {reason}")]
    Unavailable { reason: String },
}

pub trait BackendChannel: Send + Sync {
    /// Ask the backend for its latest version of `key`.
    fn request(&self, key: &ChainKey) -> Result<(), BackendError>;

    /// Submit a local mutation of `base` for `key`.
    fn mutate(
        &self,
        key: &ChainKey,
        base: &str,
        value: &Value,
        context: &Value,
    ) -> Result<(), BackendError>;

    /// Inbound data frames. May deliver for any key at any time.
    fn data(&self) -> Receiver<DataFrame>;

    /// Inbound failure frames.
    fn failed(&self) -> Receiver<FailureFrame>;
}

/// A backend with no transport: accepts every outbound call, never answers.
///
/// Lets the store/manager pair run fully offline - reads serve whatever is
/// cached locally, mutations stay pending until a real backend takes over.
pub struct OfflineBackend {
    // The sender halves are held so the receivers stay open (and empty)
    // instead of reporting disconnection.
    _data_tx: crossbeam::channel::Sender<DataFrame>,
    data_rx: Receiver<DataFrame>,
    _failed_tx: crossbeam::channel::Sender<FailureFrame>,
    failed_rx: Receiver<FailureFrame>,
}

impl OfflineBackend {
    pub fn new() -> Self {
        let (data_tx, data_rx) = crossbeam::channel::unbounded();
        let (failed_tx, failed_rx) = crossbeam::channel::unbounded();
        Self {
            _data_tx: data_tx,
            data_rx,
            _failed_tx: failed_tx,
            failed_rx,
        }
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendChannel for OfflineBackend {
    fn request(&self, key: &ChainKey) -> Result<(), BackendError> {
        tracing::trace!(chain = %key, "offline backend dropped request");
        Ok(())
    }

    fn mutate(
        &self,
        key: &ChainKey,
        _base: &str,
        _value: &Value,
        _context: &Value,
    ) -> Result<(), BackendError> {
        tracing::trace!(chain = %key, "offline backend dropped mutation");
        Ok(())
    }

    fn data(&self) -> Receiver<DataFrame> {
        self.data_rx.clone()
    }

    fn failed(&self) -> Receiver<FailureFrame> {
        self.failed_rx.clone()
    }
}
