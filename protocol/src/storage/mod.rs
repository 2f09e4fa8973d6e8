//! # Storage Module
//!
//! The chain engine and everything that makes it durable.
//!
//! ## Architecture
//!
//! ```text
//! block.rs    - Block structure, genesis block, canonical hash, pairwise check
//! chain.rs    - In-memory chain: append and whole-chain validation
//! snapshot.rs - JSON snapshot encoding, atomic file save, SnapshotStore trait
//! ledger.rs   - Single-writer owner of the chain, pairs append with save
//! error.rs    - IntegrityError and StorageError
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! Certificate → Ledger ─(write lock)→ Chain::append → Block
//!                  │
//!                  └─→ SnapshotStore::write (bounded, retried) → blockchain.json
//! ```
//!
//! ## Design Decisions
//!
//! 1. **SHA-256 over an explicit canonical encoding.** The block hash never
//!    depends on serde field order or on the block's own hash field.
//!
//! 2. **One JSON file per chain.** The snapshot is the whole chain, written
//!    atomically via temp file + rename.
//!
//! 3. **Validate on every load.** A snapshot is data from outside the
//!    process until the integrity scan says otherwise.

pub mod block;
pub mod chain;
pub mod error;
pub mod ledger;
pub mod snapshot;

pub use block::Block;
pub use chain::Chain;
pub use error::{IntegrityError, StorageError, StorageResult};
pub use ledger::Ledger;
pub use snapshot::{
    decode_chain, encode_chain, load_chain, save_chain, FileSnapshotStore, MemorySnapshotStore,
    SnapshotStore,
};
