//! Cryptographic key types for node identity and signing.
//!
//! Keys and signatures travel as hex strings (with an optional `0x` prefix)
//! in every external format: HTTP bodies, query strings, ledger command
//! arguments and the peer record file.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{strip_hex_prefix, TypesError};

/// A 32-byte Ed25519 public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

/// A 32-byte Ed25519 private key (secret scalar).
///
/// This type intentionally does not implement `Debug`, `Serialize`, or `Clone`
/// to prevent accidental exposure. Key bytes are zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(pub [u8; 32]);

/// A 64-byte Ed25519 signature over a node's canonical identity message.
///
/// Besides proving key possession, the signature is the durable handle the
/// ledger uses to reference a node, so it is hashable and ordered.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(pub [u8; 64]);

/// An Ed25519 key pair (public + private).
///
/// Built by `meshgate_crypto::keypair_from_private()` or
/// `meshgate_crypto::load_private_key()`.
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

fn decode_fixed<const N: usize>(field: &'static str, s: &str) -> Result<[u8; N], TypesError> {
    let bytes = hex::decode(strip_hex_prefix(s.trim())).map_err(|e| TypesError::InvalidHex {
        field,
        reason: e.to_string(),
    })?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| TypesError::InvalidLength {
        field,
        expected: N,
        actual,
    })
}

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a hex-encoded public key, `0x` prefix optional.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        decode_fixed("public_key", s).map(Self)
    }

    /// Canonical `0x`-prefixed lowercase hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl PrivateKey {
    /// Parse a hex-encoded private key, `0x` prefix optional.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        decode_fixed("private_key", s).map(Self)
    }
}

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Parse a hex-encoded signature, `0x` prefix optional.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        decode_fixed("signature", s).map(Self)
    }

    /// Canonical `0x`-prefixed lowercase hex form, as passed to the ledger.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> String {
        format!("0x{}…", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl FromStr for Signature {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
