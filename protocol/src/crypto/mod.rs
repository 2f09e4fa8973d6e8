//! # Cryptographic Primitives
//!
//! certchain needs exactly one primitive: a collision-resistant hash to
//! link blocks together. We use SHA-256 through the audited `sha2` crate
//! and wrap it in a handful of type-safe helpers. Nothing here should ever
//! grow a hand-written hash function.

pub mod hash;

pub use hash::{is_hex_digest, sha256_hex};
