//! Identity codec for meshgate.
//!
//! - **Ed25519** for signing and verifying node identities
//! - **Blake2b-256** for hashing the canonical identity message
//! - Ledger account address derivation from a public key

pub mod address;
pub mod error;
pub mod hash;
pub mod identity;
pub mod keys;
pub mod sign;

pub use address::derive_address;
pub use error::CryptoError;
pub use hash::blake2b_256;
pub use identity::{
    canonical_message, identity_digest, sign_identity, verify_identity, IdentityClaim,
};
pub use keys::{keypair_from_private, keypair_from_seed, load_private_key};
pub use sign::{sign_message, verify_signature};
