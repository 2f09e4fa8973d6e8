//! # Protocol Configuration & Constants
//!
//! Every magic number in certchain lives here. The hashing constants in
//! particular are part of the on-disk contract: change one and every
//! snapshot ever written stops validating.

use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version, reported by the node's `version` command.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Domain tag prefixed to every block's canonical encoding before hashing.
/// Bump the `v1` suffix if the field layout ever changes.
pub const BLOCK_HASH_DOMAIN: &[u8] = b"certchain/block/v1";

/// Hash output length in bytes (SHA-256).
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// Length of a hex-encoded block hash.
pub const HASH_HEX_LENGTH: usize = HASH_OUTPUT_LENGTH * 2;

/// `previous_hash` value carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Snapshot file used when nothing else is configured. Resolved relative
/// to the process working directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = "blockchain.json";

/// Upper bound on a single snapshot write. A local JSON file that takes
/// longer than this to land is a disk problem, not a slow disk.
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of save attempts per persist call (first try included).
pub const DEFAULT_SAVE_ATTEMPTS: u32 = 3;

/// Pause between save attempts.
pub const DEFAULT_SAVE_RETRY_BACKOFF: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Runtime settings for a [`Ledger`](crate::storage::Ledger).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Where the JSON snapshot lives.
    pub snapshot_path: PathBuf,
    /// Timeout applied to each save attempt.
    pub save_timeout: Duration,
    /// Attempts per persist call. Zero is treated as one.
    pub save_attempts: u32,
    /// Pause between failed attempts.
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            save_timeout: DEFAULT_SAVE_TIMEOUT,
            save_attempts: DEFAULT_SAVE_ATTEMPTS,
            retry_backoff: DEFAULT_SAVE_RETRY_BACKOFF,
        }
    }
}

impl LedgerConfig {
    /// Default settings pointed at a specific snapshot file.
    pub fn with_snapshot_path(path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: path.into(),
            ..Self::default()
        }
    }
}
