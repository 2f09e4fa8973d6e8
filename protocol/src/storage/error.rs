//! Error types for the chain and its persistence layer.
//!
//! [`IntegrityError`] describes *what* is wrong with a chain and *where*.
//! [`StorageError`] is what every fallible storage operation returns; it
//! wraps integrity failures alongside I/O, serialization, and save-path
//! failures.

use std::path::PathBuf;

use thiserror::Error;

use super::block::Block;
use crate::certificate::CertificateError;

// ---------------------------------------------------------------------------
// IntegrityError
// ---------------------------------------------------------------------------

/// A broken chain invariant.
///
/// Every variant except [`IntegrityError::EmptyChain`] carries `position`:
/// the offset in the block list of the first block that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// The chain has no blocks at all, so there is no genesis to trust.
    #[error("chain is empty: missing genesis block")]
    EmptyChain,

    /// The first block is not a genesis block.
    #[error("block {position}: malformed genesis: {reason}")]
    MalformedGenesis {
        /// Always 0.
        position: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A block's index does not follow its predecessor's.
    #[error("block {position}: index mismatch: expected {expected}, found {found}")]
    IndexMismatch {
        /// Offset of the failing block.
        position: usize,
        /// Predecessor index + 1.
        expected: u64,
        /// Index stored in the block.
        found: u64,
    },

    /// A block's `previous_hash` does not match its predecessor's hash.
    #[error("block {position}: broken link: expected previous hash {expected}, found {found}")]
    LinkMismatch {
        /// Offset of the failing block.
        position: usize,
        /// Hash of the predecessor.
        expected: String,
        /// `previous_hash` stored in the block.
        found: String,
    },

    /// A block's stored hash is not a lowercase 64-character hex digest.
    #[error("block {position}: malformed hash {found:?}")]
    MalformedHash {
        /// Offset of the failing block.
        position: usize,
        /// Hash stored in the block.
        found: String,
    },

    /// A block's stored hash does not match its content.
    #[error("block {position}: hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        /// Offset of the failing block.
        position: usize,
        /// Hash stored in the block.
        stored: String,
        /// Hash recomputed from the block's content.
        computed: String,
    },
}

impl IntegrityError {
    /// Offset of the first invalid block. An empty chain reports 0.
    pub fn position(&self) -> usize {
        match self {
            Self::EmptyChain => 0,
            Self::MalformedGenesis { position, .. }
            | Self::IndexMismatch { position, .. }
            | Self::LinkMismatch { position, .. }
            | Self::MalformedHash { position, .. }
            | Self::HashMismatch { position, .. } => *position,
        }
    }

    /// Same error, reported at a different offset. Used when a pairwise
    /// check is lifted into a whole-chain scan.
    pub(crate) fn at(self, at: usize) -> Self {
        match self {
            Self::EmptyChain => Self::EmptyChain,
            Self::MalformedGenesis { reason, .. } => Self::MalformedGenesis {
                position: at,
                reason,
            },
            Self::IndexMismatch {
                expected, found, ..
            } => Self::IndexMismatch {
                position: at,
                expected,
                found,
            },
            Self::LinkMismatch {
                expected, found, ..
            } => Self::LinkMismatch {
                position: at,
                expected,
                found,
            },
            Self::MalformedHash { found, .. } => Self::MalformedHash {
                position: at,
                found,
            },
            Self::HashMismatch {
                stored, computed, ..
            } => Self::HashMismatch {
                position: at,
                stored,
                computed,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Errors that can occur while appending to, loading, or saving a chain.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON encoding or decoding of the snapshot failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The snapshot file does not exist.
    #[error("snapshot not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// Any other filesystem failure.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File involved in the failed operation.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The chain (or a candidate block) violates an invariant.
    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// The certificate was refused before a block was built.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(#[from] CertificateError),

    /// A save did not complete within the configured timeout.
    #[error("snapshot save timed out after {timeout_ms}ms")]
    SaveTimeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The block was appended in memory but the snapshot could not be
    /// saved. The block is NOT rolled back; retry the save with
    /// `Ledger::persist` instead of appending again.
    #[error("block {} appended but not persisted: {source}", block.index)]
    PersistFailed {
        /// The block that is committed in memory.
        block: Box<Block>,
        /// Why the save failed.
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Wrap an `io::Error`, keeping not-found distinct from other failures.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Whether retrying the same operation could succeed.
    ///
    /// Integrity, validation and parse failures are deterministic; I/O and
    /// timeouts may be transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { .. } | Self::SaveTimeout { .. } | Self::PersistFailed { .. } => true,
            Self::Serialization(_)
            | Self::NotFound { .. }
            | Self::Integrity(_)
            | Self::InvalidCertificate(_) => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_helper_separates_not_found() {
        let err = StorageError::io("x.json", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, StorageError::NotFound { .. }));

        let err = StorageError::io("x.json", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[test]
    fn retryable_classification() {
        assert!(StorageError::SaveTimeout { timeout_ms: 10 }.is_retryable());
        assert!(
            StorageError::io("x", io::Error::from(io::ErrorKind::PermissionDenied)).is_retryable()
        );
        assert!(!StorageError::Integrity(IntegrityError::EmptyChain).is_retryable());
        assert!(!StorageError::InvalidCertificate(CertificateError::EmptyEventName).is_retryable());
    }

    #[test]
    fn position_is_preserved_and_relocatable() {
        let err = IntegrityError::HashMismatch {
            position: 1,
            stored: "aa".into(),
            computed: "bb".into(),
        };
        assert_eq!(err.position(), 1);
        assert_eq!(err.at(7).position(), 7);
        assert_eq!(IntegrityError::EmptyChain.position(), 0);
    }

    #[test]
    fn display_mentions_the_block() {
        let err = IntegrityError::IndexMismatch {
            position: 3,
            expected: 3,
            found: 5,
        };
        assert_eq!(
            err.to_string(),
            "block 3: index mismatch: expected 3, found 5"
        );
    }
}
