//! # Hashing Utilities
//!
//! SHA-256 helpers used by the block layer. Block hashes are stored and
//! compared as lowercase hex strings because that is what lands in the
//! JSON snapshot. [`is_hex_digest`] is the format check applied to every
//! hash read back from a snapshot.

use sha2::{Digest, Sha256};

use crate::config::HASH_HEX_LENGTH;

fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of the input, hex-encoded in lowercase (64 characters).
///
/// ```
/// use certchain_protocol::crypto::sha256_hex;
///
/// assert_eq!(
///     sha256_hex(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_array(data))
}

/// Returns true if `s` looks like a digest produced by [`sha256_hex`]:
/// exactly 64 lowercase hex characters.
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == HASH_HEX_LENGTH
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_abc_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_raw_digest_matches_hex() {
        assert_eq!(hex::encode(sha256_array(b"block")), sha256_hex(b"block"));
    }

    #[test]
    fn test_hex_is_lowercase_and_64_chars() {
        let h = sha256_hex(b"Ada Lovelace");
        assert_eq!(h.len(), 64);
        assert!(is_hex_digest(&h));
        assert_eq!(h, h.to_lowercase());
    }

    #[test]
    fn test_is_hex_digest_rejects_bad_input() {
        assert!(!is_hex_digest("0"));
        assert!(!is_hex_digest(&"A".repeat(64)));
        assert!(!is_hex_digest(&"g".repeat(64)));
        assert!(!is_hex_digest(&"a".repeat(63)));
        assert!(is_hex_digest(&"a".repeat(64)));
    }
}
