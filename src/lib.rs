#![forbid(unsafe_code)]

//! Tactical: offline-first client-side data synchronization.
//!
//! The core is a versioned local object store mediating between an
//! application, a persistent key-value cache, and a remote backend. Per
//! object the store keeps a version chain, so the latest authoritative
//! value is always servable locally, local mutations accumulate on top of
//! server versions while offline, and incoming server updates that collide
//! with an unacknowledged mutation are surfaced for resolution instead of
//! silently dropped.
//!
//! - [`store::ChainStore`] - the versioned record lifecycle and its
//!   `outdated`/`pending` event streams.
//! - [`manager::DataManager`] - per-key fan-out joining the store with a
//!   [`backend::BackendChannel`].
//! - [`kv`] - the pluggable engine contract plus the in-memory default.

pub mod backend;
pub mod config;
pub mod core;
pub mod kv;
pub mod manager;
pub mod store;
pub mod telemetry;

pub use crate::backend::{BackendChannel, BackendError, DataFrame, FailureFrame, OfflineBackend};
pub use crate::config::{Config, ConfigError, Limits, LogFormat, LoggingConfig};
pub use crate::core::{
    CanonError, ChainKey, ChainState, Entry, Patch, PatchError, Record, StoreError, Value,
    Version, decode_from_value, encode_as_value, to_canon_string,
};
pub use crate::kv::{FileKv, KvEngine, KvError, KvTransaction, MemoryKv, StoreName};
pub use crate::manager::{
    DataManager, ManagerError, Updater, UpdaterSubscription, ValueSubscription,
};
pub use crate::store::{
    Broadcaster, ChainStore, OutdatedMutation, PendingMutation, Replay, StreamError,
    Subscription,
};
