// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # certchain - Core Library
//!
//! Tamper-evident certificates on an append-only, hash-linked chain.
//!
//! Every issued certificate becomes a block whose SHA-256 hash covers its
//! position, its timestamp, its payload, and the hash of the block before
//! it. Change one byte anywhere and the chain stops validating from that
//! block onward.
//!
//! ## Architecture
//!
//! - **certificate** - The credential record carried by each block.
//! - **crypto** - SHA-256 helpers. Don't roll your own.
//! - **storage** - Blocks, the chain, JSON snapshots, and the ledger that
//!   owns them.
//! - **config** - Protocol constants and ledger settings.
//!
//! ## Quick Start
//!
//! ```
//! use certchain_protocol::certificate::Certificate;
//! use certchain_protocol::storage::Chain;
//!
//! let mut chain = Chain::new();
//! let block = chain
//!     .append(Certificate::new("", "Ada Lovelace", "Systems Conf 2024"))
//!     .unwrap();
//!
//! assert_eq!(block.index, 1);
//! assert_eq!(block.previous_hash, chain.genesis().hash);
//! assert!(chain.is_valid());
//! ```

pub mod certificate;
pub mod config;
pub mod crypto;
pub mod storage;

pub use certificate::{Certificate, CertificateError};
pub use storage::{Block, Chain, IntegrityError, Ledger, StorageError};
