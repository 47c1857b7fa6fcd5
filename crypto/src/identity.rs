//! Canonical identity message, signing and verification.
//!
//! The signed payload is the Blake2b-256 digest of a compact JSON object
//! holding `node_id`, `node_name`, `node_type` and `public_key` in
//! lexicographic key order. Values are normalised first (canonical node
//! type name, `0x`-prefixed lowercase public key) so the signer and the
//! verifier hash the same bytes however the request spelled them.

use std::collections::BTreeMap;

use meshgate_types::{NodeIdentity, NodeType, PrivateKey, PublicKey, Signature};
use tracing::debug;

use crate::{blake2b_256, sign_message, verify_signature};

/// Build the canonical byte encoding of the signed identity fields.
pub fn canonical_message(identity: &NodeIdentity) -> Vec<u8> {
    encode(
        &identity.node_id,
        &identity.node_name,
        identity.node_type,
        &identity.public_key,
    )
}

fn encode(node_id: &str, node_name: &str, node_type: NodeType, public_key: &PublicKey) -> Vec<u8> {
    let mut fields = BTreeMap::new();
    fields.insert("node_id", node_id.to_string());
    fields.insert("node_name", node_name.to_string());
    fields.insert("node_type", node_type.as_str().to_string());
    fields.insert("public_key", public_key.to_hex());
    // A map of strings always serializes.
    serde_json::to_vec(&fields).unwrap_or_default()
}

/// Digest of the canonical message; this is what gets signed.
pub fn identity_digest(identity: &NodeIdentity) -> [u8; 32] {
    blake2b_256(&canonical_message(identity))
}

/// Sign an identity with the node's private key.
pub fn sign_identity(identity: &NodeIdentity, private_key: &PrivateKey) -> Signature {
    sign_message(&identity_digest(identity), private_key)
}

/// Verify `signature` over `identity` against the identity's own public key.
///
/// Never fails: any problem with the key or signature reads as `false`.
pub fn verify_identity(identity: &NodeIdentity, signature: &Signature) -> bool {
    let ok = verify_signature(&identity_digest(identity), signature, &identity.public_key);
    if !ok {
        debug!(node_id = %identity.node_id, signature = %signature.short(), "identity signature rejected");
    }
    ok
}

/// Identity fields exactly as received over the wire, before any parsing.
#[derive(Clone, Copy, Debug)]
pub struct IdentityClaim<'a> {
    pub node_id: &'a str,
    pub node_name: &'a str,
    pub node_type: &'a str,
    pub public_key: &'a str,
    pub signature: &'a str,
}

impl IdentityClaim<'_> {
    /// Decode and verify the claim. Malformed hex, unknown node types and
    /// invalid curve points all yield `false`.
    pub fn verify(&self) -> bool {
        let decoded = (|| {
            let node_type: NodeType = self.node_type.parse().ok()?;
            let public_key = PublicKey::from_hex(self.public_key).ok()?;
            let signature = Signature::from_hex(self.signature).ok()?;
            Some((node_type, public_key, signature))
        })();
        let Some((node_type, public_key, signature)) = decoded else {
            debug!(node_id = self.node_id, "identity claim failed to decode");
            return false;
        };
        let digest = blake2b_256(&encode(
            self.node_id,
            self.node_name,
            node_type,
            &public_key,
        ));
        verify_signature(&digest, &signature, &public_key)
    }
}
