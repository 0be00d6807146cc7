//! Store error taxonomy.
//!
//! Errors are values on the failing call's result channel. Contract
//! violations never mutate state; an aborted KV transaction leaves the
//! chain exactly as it was and emits no event.

use thiserror::Error;

use super::key::ChainKey;
use super::value::Value;
use super::version::Version;
use crate::kv::KvError;

/// Canonical-encoding failure.
#[derive(Debug, Error)]
pub enum CanonError {
    #[error("json encode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported value: {reason}")]
    UnsupportedType { reason: String },
}

/// Version chain store errors. Every variant carries the originating key.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `commit` or `abandon` addressed a chain that has never been pushed.
    #[error("chain {key} not found")]
    KeyNotFound { key: ChainKey },

    /// `commit` targeted a version that is no longer the chain head. The
    /// rejected mutation and its context ride along so the caller can retry
    /// against `current` without re-deriving them.
    #[error("target {target} is not current ({current}) for chain {key}")]
    OutdatedTargetVersion {
        key: ChainKey,
        current: Version,
        target: Version,
        mutation: Value,
        context: Value,
    },

    /// `abandon` targeted an initial version. Initials are the rebase
    /// anchors for pending mutations and are only retired by `push` GC.
    #[error("cannot abandon initial version {target} of chain {key}")]
    InvalidInitialTargetVersion { key: ChainKey, target: Version },

    #[error(transparent)]
    Canon(#[from] CanonError),

    #[error(transparent)]
    Kv(#[from] KvError),
}
