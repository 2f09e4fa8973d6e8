//! # Block Structure
//!
//! A block binds one [`Certificate`] to a position in the chain and to the
//! hash of the block before it.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  index: u64              (genesis = 0)           │
//! │  created_at: DateTime    (informational)         │
//! │  payload: Certificate                            │
//! │  previous_hash: String   ("0" for genesis)       │
//! │  hash: String            (SHA-256, 64 hex chars) │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Hash Computation
//!
//! The hash covers every field except `hash` itself, fed through
//! [`Block::canonical_bytes`]:
//!
//! ```text
//! DOMAIN || index (u64 BE) || created_at || previous_hash
//!        || member_id || holder_name || event_name || issued_at
//! ```
//!
//! Each string and timestamp is length-prefixed (u64 BE). Timestamps are
//! rendered as RFC 3339 UTC with nine fractional digits, so the same block
//! hashes identically no matter who serialized it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::error::IntegrityError;
use crate::certificate::Certificate;
use crate::config::{BLOCK_HASH_DOMAIN, GENESIS_PREVIOUS_HASH};
use crate::crypto::hash::{is_hex_digest, sha256_hex};

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A single link in the certificate chain.
///
/// Blocks are built once, by [`Block::genesis`] or [`Block::next`], and
/// never change afterward. The serde names match the snapshot format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain (0-indexed, genesis = 0).
    pub index: u64,
    /// When the block was built.
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// The certificate this block records.
    #[serde(rename = "data")]
    pub payload: Certificate,
    /// Hash of the predecessor, or `"0"` for genesis.
    #[serde(rename = "previousHash")]
    pub previous_hash: String,
    /// SHA-256 of [`Block::canonical_bytes`], lowercase hex.
    pub hash: String,
}

impl Block {
    /// Construct the genesis block.
    ///
    /// Index 0, sentinel payload, `"0"` link, and a creation time pinned to
    /// the Unix epoch. Two calls always return identical blocks.
    pub fn genesis() -> Self {
        Self::seal(
            0,
            DateTime::<Utc>::UNIX_EPOCH,
            Certificate::sentinel(),
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    /// Construct the successor of `parent` carrying `payload`, stamped now.
    pub fn next(parent: &Block, payload: Certificate) -> Self {
        Self::next_at(parent, payload, Utc::now())
    }

    /// Like [`Block::next`] with an explicit creation time.
    pub fn next_at(parent: &Block, payload: Certificate, created_at: DateTime<Utc>) -> Self {
        Self::seal(
            parent.index + 1,
            created_at,
            payload,
            parent.hash.clone(),
        )
    }

    /// Fill in every field but the hash, then hash.
    fn seal(
        index: u64,
        created_at: DateTime<Utc>,
        payload: Certificate,
        previous_hash: String,
    ) -> Self {
        let mut block = Block {
            index,
            created_at,
            payload,
            previous_hash,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Canonical encoding of the block with `hash` treated as absent.
    ///
    /// The stored hash is never read here, so a block's digest cannot
    /// depend on its own (possibly stale) hash value.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let created_at = canonical_timestamp(&self.created_at);
        let issued_at = canonical_timestamp(&self.payload.issued_at);

        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(BLOCK_HASH_DOMAIN);
        buf.extend_from_slice(&self.index.to_be_bytes());
        put_field(&mut buf, created_at.as_bytes());
        put_field(&mut buf, self.previous_hash.as_bytes());
        put_field(&mut buf, self.payload.member_id.as_bytes());
        put_field(&mut buf, self.payload.holder_name.as_bytes());
        put_field(&mut buf, self.payload.event_name.as_bytes());
        put_field(&mut buf, issued_at.as_bytes());
        buf
    }

    /// Recompute the hash from the block's content.
    pub fn compute_hash(&self) -> String {
        sha256_hex(&self.canonical_bytes())
    }

    /// Check that the stored hash is a well-formed digest of the content.
    pub fn verify_hash(&self) -> Result<(), IntegrityError> {
        if !is_hex_digest(&self.hash) {
            return Err(IntegrityError::MalformedHash {
                position: self.index as usize,
                found: self.hash.clone(),
            });
        }
        let computed = self.compute_hash();
        if self.hash != computed {
            return Err(IntegrityError::HashMismatch {
                position: self.index as usize,
                stored: self.hash.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Pairwise rule: `self` is a valid successor of `previous` iff the
    /// index advances by one, the link matches, and the hash is honest.
    ///
    /// Errors report `self.index` as the position; whole-chain scans
    /// relocate it to the real offset.
    pub fn validate_successor_of(&self, previous: &Block) -> Result<(), IntegrityError> {
        let position = self.index as usize;

        let expected_index = previous.index + 1;
        if self.index != expected_index {
            return Err(IntegrityError::IndexMismatch {
                position,
                expected: expected_index,
                found: self.index,
            });
        }

        if self.previous_hash != previous.hash {
            return Err(IntegrityError::LinkMismatch {
                position,
                expected: previous.hash.clone(),
                found: self.previous_hash.clone(),
            });
        }

        self.verify_hash()
    }

    /// Check that this block is the genesis block: index 0, epoch
    /// timestamp, `"0"` link, sentinel payload, honest hash.
    pub fn validate_genesis(&self) -> Result<(), IntegrityError> {
        let malformed = |reason: String| IntegrityError::MalformedGenesis {
            position: 0,
            reason,
        };

        if self.index != 0 {
            return Err(malformed(format!("index is {}, expected 0", self.index)));
        }
        if self.created_at != DateTime::<Utc>::UNIX_EPOCH {
            return Err(malformed(format!(
                "timestamp is {}, expected the Unix epoch",
                canonical_timestamp(&self.created_at)
            )));
        }
        if self.previous_hash != GENESIS_PREVIOUS_HASH {
            return Err(malformed(format!(
                "previous hash is {:?}, expected {:?}",
                self.previous_hash, GENESIS_PREVIOUS_HASH
            )));
        }
        if !self.payload.is_sentinel() {
            return Err(malformed("payload is not the empty sentinel".to_string()));
        }

        self.verify_hash()
    }

    /// Whether this block sits at position 0.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

// ---------------------------------------------------------------------------
// Canonical encoding helpers
// ---------------------------------------------------------------------------

/// RFC 3339, UTC, `Z` suffix, always nine fractional digits.
fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Length-prefixed field: u64 BE length, then the bytes.
fn put_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(bytes);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ada() -> Certificate {
        Certificate::new("", "Ada Lovelace", "Systems Conf 2024")
            .issued_at(Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap())
    }

    #[test]
    fn genesis_block_properties() {
        let genesis = Block::genesis();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert!(genesis.payload.is_sentinel());
        assert!(genesis.is_genesis());
        assert!(is_hex_digest(&genesis.hash));
    }

    #[test]
    fn genesis_block_verifies() {
        assert!(Block::genesis().validate_genesis().is_ok());
    }

    #[test]
    fn genesis_hash_is_deterministic() {
        assert_eq!(Block::genesis().hash, Block::genesis().hash);
    }

    #[test]
    fn next_block_links_to_parent() {
        let genesis = Block::genesis();
        let block1 = Block::next(&genesis, ada());

        assert_eq!(block1.index, 1);
        assert_eq!(block1.previous_hash, genesis.hash);
        assert_eq!(block1.hash, block1.compute_hash());
        assert!(block1.validate_successor_of(&genesis).is_ok());
    }

    #[test]
    fn hash_ignores_stored_hash_field() {
        let genesis = Block::genesis();
        let mut block = Block::next(&genesis, ada());
        let original = block.compute_hash();

        block.hash = "f".repeat(64);
        assert_eq!(block.compute_hash(), original);
        assert_eq!(block.canonical_bytes(), {
            let mut clean = block.clone();
            clean.hash.clear();
            clean.canonical_bytes()
        });
    }

    #[test]
    fn every_field_affects_the_hash() {
        let genesis = Block::genesis();
        let base = Block::next_at(&genesis, ada(), Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let h = base.compute_hash();

        let mut b = base.clone();
        b.index += 1;
        assert_ne!(b.compute_hash(), h);

        let mut b = base.clone();
        b.created_at = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        assert_ne!(b.compute_hash(), h);

        let mut b = base.clone();
        b.previous_hash = "0".into();
        assert_ne!(b.compute_hash(), h);

        let mut b = base.clone();
        b.payload.member_id = "m-1".into();
        assert_ne!(b.compute_hash(), h);

        let mut b = base.clone();
        b.payload.holder_name = "Ada Lovelacf".into();
        assert_ne!(b.compute_hash(), h);

        let mut b = base.clone();
        b.payload.event_name = "Systems Conf 2025".into();
        assert_ne!(b.compute_hash(), h);

        let mut b = base;
        b.payload.issued_at = Utc.timestamp_opt(0, 1).unwrap();
        assert_ne!(b.compute_hash(), h);
    }

    #[test]
    fn length_prefix_prevents_field_shifting() {
        // "ab" + "c" and "a" + "bc" must not collide.
        let genesis = Block::genesis();
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut c1 = ada();
        c1.holder_name = "ab".into();
        c1.event_name = "c".into();
        let mut c2 = ada();
        c2.holder_name = "a".into();
        c2.event_name = "bc".into();

        let b1 = Block::next_at(&genesis, c1, at);
        let b2 = Block::next_at(&genesis, c2, at);
        assert_ne!(b1.hash, b2.hash);
    }

    #[test]
    fn subsecond_timestamps_are_hashed() {
        let genesis = Block::genesis();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t1 = Utc.timestamp_opt(1_700_000_000, 1).unwrap();
        assert_ne!(
            Block::next_at(&genesis, ada(), t0).hash,
            Block::next_at(&genesis, ada(), t1).hash
        );
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let genesis = Block::genesis();
        let mut block = Block::next(&genesis, ada());
        block.payload.holder_name.push('!');

        let err = block.validate_successor_of(&genesis).unwrap_err();
        assert!(matches!(err, IntegrityError::HashMismatch { position: 1, .. }));
    }

    #[test]
    fn wrong_index_is_reported_first() {
        let genesis = Block::genesis();
        let mut block = Block::next(&genesis, ada());
        block.index = 5;
        block.hash = block.compute_hash();

        let err = block.validate_successor_of(&genesis).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::IndexMismatch {
                position: 5,
                expected: 1,
                found: 5
            }
        );
    }

    #[test]
    fn wrong_link_fails_even_with_honest_hash() {
        let genesis = Block::genesis();
        let mut block = Block::next(&genesis, ada());
        block.previous_hash = "a".repeat(64);
        block.hash = block.compute_hash();

        let err = block.validate_successor_of(&genesis).unwrap_err();
        assert!(matches!(err, IntegrityError::LinkMismatch { .. }));
    }

    #[test]
    fn genesis_with_real_payload_is_malformed() {
        let mut fake = Block::genesis();
        fake.payload = ada();
        fake.hash = fake.compute_hash();

        let err = fake.validate_genesis().unwrap_err();
        assert!(matches!(err, IntegrityError::MalformedGenesis { .. }));
    }

    #[test]
    fn genesis_with_real_link_is_malformed() {
        let mut fake = Block::genesis();
        fake.previous_hash = "b".repeat(64);
        fake.hash = fake.compute_hash();
        assert!(fake.validate_genesis().is_err());
    }

    #[test]
    fn genesis_with_shifted_timestamp_is_malformed() {
        let mut fake = Block::genesis();
        fake.created_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        fake.hash = fake.compute_hash();

        assert!(fake.verify_hash().is_ok());
        let err = fake.validate_genesis().unwrap_err();
        assert!(matches!(err, IntegrityError::MalformedGenesis { position: 0, .. }));
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn non_hex_hash_is_malformed() {
        let genesis = Block::genesis();
        let mut block = Block::next(&genesis, ada());
        block.hash = "Z".repeat(64);

        let err = block.validate_successor_of(&genesis).unwrap_err();
        assert!(matches!(err, IntegrityError::MalformedHash { position: 1, .. }));
    }

    #[test]
    fn block_chain_of_three() {
        let b0 = Block::genesis();
        let b1 = Block::next(&b0, ada());
        let b2 = Block::next(&b1, Certificate::new("m-2", "Alan Turing", "Systems Conf 2024"));

        assert_eq!(b2.index, 2);
        assert_eq!(b2.previous_hash, b1.hash);
        assert_eq!(b1.previous_hash, b0.hash);
        assert!(b1.validate_successor_of(&b0).is_ok());
        assert!(b2.validate_successor_of(&b1).is_ok());
        assert!(b2.validate_successor_of(&b0).is_err());
    }

    #[test]
    fn block_json_uses_snapshot_field_names() {
        let block = Block::next(&Block::genesis(), ada());
        let json = serde_json::to_value(&block).unwrap();

        assert_eq!(json["index"], 1);
        assert!(json["timestamp"].is_string());
        assert_eq!(json["data"]["name"], "Ada Lovelace");
        assert_eq!(json["previousHash"], Block::genesis().hash);
        assert_eq!(json["hash"], block.hash);
    }

    #[test]
    fn block_serialization_roundtrip_keeps_hash_valid() {
        let block = Block::next(&Block::genesis(), ada());
        let json = serde_json::to_string(&block).expect("serialize");
        let recovered: Block = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(block, recovered);
        assert!(recovered.verify_hash().is_ok());
    }
}
