//! Blake2b-256, the digest behind identity signatures and ledger addresses.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

pub const DIGEST_LEN: usize = 32;

/// Blake2b with a 32-byte output.
pub fn blake2b_256(data: &[u8]) -> [u8; DIGEST_LEN] {
    Blake2b::<U32>::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_empty_digest() {
        assert_eq!(
            hex::encode(blake2b_256(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn single_byte_changes_digest() {
        assert_ne!(blake2b_256(b"{\"node_id\":\"N-1\"}"), blake2b_256(b"{\"node_id\":\"N-2\"}"));
    }
}
