//! # Identifiers
//!
//! Every record carries exactly one identifier. While a device is offline it
//! mints its own temporary ids; once the remote authority accepts the record
//! it assigns the permanent one, and reconciliation rewrites every reference
//! to the temporary id in a single step.
//!
//! ## Two Kinds of Identifier
//! ```text
//! local id:   "local-550e8400-e29b-41d4-a716-446655440000"
//!             minted on this device, reserved prefix, replaced on sync
//!
//! server id:  opaque string issued by the remote authority
//!             never carries the reserved prefix
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reserved prefix distinguishing locally-minted ids from server-issued ones.
///
/// The authority never issues ids with this prefix, so `is_local` is a pure
/// string test with no extra bookkeeping.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// An opaque record identifier, either locally minted or server issued.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Mints a fresh local identifier.
    ///
    /// UUID v4 underneath: globally unique without coordination, so two
    /// offline devices can never collide.
    pub fn local() -> Self {
        Identifier(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()))
    }

    /// Wraps an identifier issued by the remote authority.
    pub fn remote(id: impl Into<String>) -> Self {
        Identifier(id.into())
    }

    /// Returns true if this id was minted locally and has not yet been
    /// reconciled to a server id.
    #[inline]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    /// The identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier(s)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier(s.to_string())
    }
}
