//! Core domain types for tactical
//!
//! Module hierarchy follows type dependency order:
//! - value: the closed value sum (Layer 0)
//! - canon: canonical encoding of values (Layer 1)
//! - key: ChainKey (Layer 2)
//! - version: Version, record-key serials (Layer 2)
//! - record: Entry, Record, ChainState (Layer 3)
//! - patch: mutation operator algebra (Layer 3)
//! - error: store error taxonomy (Layer 4)

pub mod canon;
pub mod error;
pub mod key;
pub mod patch;
pub mod record;
pub mod value;
pub mod version;

pub use canon::to_canon_string;
pub use error::{CanonError, StoreError};
pub use key::ChainKey;
pub use patch::{Patch, PatchError};
pub use record::{ChainState, Entry, Record};
pub use value::{Value, decode_from_value, encode_as_value};
pub use version::Version;
