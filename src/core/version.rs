//! Record versions.
//!
//! A version is (base, sub). The base is minted by the backend for each
//! server-authoritative snapshot; sub 0 is that snapshot itself, sub > 0 is
//! a local mutation layered on it. Mutation subs are drawn uniformly at
//! random: a mutation is always rebased before it leaves the client, so the
//! sub only has to be unique within one pending-mutation slot.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::canon::write_string;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub base: String,
    pub sub: u32,
}

impl Version {
    /// The initial (server-pushed) version of `base`.
    pub fn initial_of(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            sub: 0,
        }
    }

    /// A freshly-minted local mutation version on the same base as `self`.
    pub fn mutation(&self) -> Self {
        Self {
            base: self.base.clone(),
            sub: mint_sub(),
        }
    }

    /// The initial version of this version's base.
    pub fn initial(&self) -> Self {
        Self {
            base: self.base.clone(),
            sub: 0,
        }
    }

    pub fn is_initial(&self) -> bool {
        self.sub == 0
    }

    /// Canonical serialized form, the version's suffix inside record keys.
    pub fn serial(&self) -> String {
        let mut out = String::from("{\"base\":");
        write_string(&mut out, &self.base);
        out.push_str(",\"sub\":");
        out.push_str(&self.sub.to_string());
        out.push('}');
        out
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.base, self.sub)
    }
}

fn mint_sub() -> u32 {
    rand::rng().random_range(1..=u32::MAX)
}
