//! Ledger account address derivation from public keys.
//!
//! Address: `0x` + lowercase hex of the last 20 bytes of Blake2b-256(public_key).

use meshgate_types::{NodeAddress, PublicKey};

/// Derive the ledger account address of a public key.
pub fn derive_address(public_key: &PublicKey) -> NodeAddress {
    let hash = crate::blake2b_256(public_key.as_bytes());
    let mut tail = [0u8; NodeAddress::LEN];
    tail.copy_from_slice(&hash[32 - NodeAddress::LEN..]);
    NodeAddress::from_bytes(&tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keypair_from_seed;

    #[test]
    fn derive_is_deterministic() {
        let kp = keypair_from_seed(&[7u8; 32]);
        assert_eq!(derive_address(&kp.public), derive_address(&kp.public));
    }

    #[test]
    fn derived_address_is_canonical() {
        let addr = derive_address(&keypair_from_seed(&[101; 32]).public);
        assert_eq!(addr.as_str().len(), 42);
        assert!(addr.as_str().starts_with("0x"));
        assert_eq!(NodeAddress::parse(addr.as_str()).unwrap(), addr);
    }

    #[test]
    fn different_keys_different_addresses() {
        let a = derive_address(&keypair_from_seed(&[102; 32]).public);
        let b = derive_address(&keypair_from_seed(&[103; 32]).public);
        assert_ne!(a, b);
    }
}
