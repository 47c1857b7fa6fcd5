//! Fundamental types for meshgate.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! node identities and their tiers, key and signature newtypes, ledger account
//! addresses, capability actions and permission sets, and timestamps.

pub mod address;
pub mod capability;
pub mod error;
pub mod identity;
pub mod keys;
pub mod time;

pub use address::NodeAddress;
pub use capability::{Action, CapabilityToken, PermissionSet};
pub use error::TypesError;
pub use identity::{NodeIdentity, NodeType, SignedIdentity};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use time::Timestamp;

/// Strip an optional `0x`/`0X` prefix from a hex string.
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}
