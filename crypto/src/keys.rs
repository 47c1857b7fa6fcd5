//! Ed25519 key loading.

use std::path::Path;

use ed25519_dalek::SigningKey;
use meshgate_types::{KeyPair, PrivateKey, PublicKey};

use crate::CryptoError;

/// Reconstruct a full key pair from a private key.
pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    let public = PublicKey(SigningKey::from_bytes(&private.0).verifying_key().to_bytes());
    KeyPair { public, private }
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    keypair_from_private(PrivateKey(*seed))
}

/// Load a key pair from a file holding the hex private key (`0x` optional).
///
/// Surrounding whitespace and a trailing newline are ignored, so files
/// written by common key tools load unchanged.
pub fn load_private_key(path: &Path) -> Result<KeyPair, CryptoError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CryptoError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    let private = PrivateKey::from_hex(raw.trim())?;
    Ok(keypair_from_private(private))
}
