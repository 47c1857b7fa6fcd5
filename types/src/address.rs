//! Ledger account address of a node.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{strip_hex_prefix, TypesError};

/// A 20-byte ledger account address, held in canonical `0x` + lowercase hex form.
///
/// Validator sets reported by the ledger may use mixed-case (checksummed)
/// spellings; normalising on parse makes set membership a plain comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Number of raw bytes in an address.
    pub const LEN: usize = 20;

    /// Parse an address, accepting an optional `0x` prefix and any letter case.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let body = strip_hex_prefix(raw.trim());
        if body.len() != Self::LEN * 2 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TypesError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    /// Build an address from its raw bytes.
    pub fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// Return the canonical address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeAddress {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for NodeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
