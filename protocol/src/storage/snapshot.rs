//! # Snapshot Persistence
//!
//! The whole chain is stored as one JSON document: an array of blocks,
//! genesis first. Snapshots are small (one block per issued certificate)
//! and human-auditable, which matters more here than write amplification.
//!
//! ## Atomicity
//!
//! A save never writes the target file in place. The JSON is written to a
//! temporary file in the same directory, fsynced, and renamed over the
//! target. A crash leaves either the old snapshot or the new one on disk,
//! never a torn mix.
//!
//! ## Trust
//!
//! Nothing read from disk is trusted until [`Chain::from_blocks`] has
//! validated it. A missing file means first run and yields a fresh chain;
//! every other failure is an error the caller must deal with.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use super::block::Block;
use super::chain::Chain;
use super::error::{StorageError, StorageResult};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize a chain to snapshot bytes (pretty-printed JSON array).
pub fn encode_chain(chain: &Chain) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(chain)?)
}

/// Parse snapshot bytes and validate the result.
///
/// Parse failures are [`StorageError::Serialization`]; a well-formed
/// document describing a broken chain is [`StorageError::Integrity`].
pub fn decode_chain(bytes: &[u8]) -> StorageResult<Chain> {
    let blocks: Vec<Block> = serde_json::from_slice(bytes)?;
    Ok(Chain::from_blocks(blocks)?)
}

// ---------------------------------------------------------------------------
// File gateway
// ---------------------------------------------------------------------------

/// Write `chain` to `path` atomically.
pub fn save_chain(path: impl AsRef<Path>, chain: &Chain) -> StorageResult<()> {
    let path = path.as_ref();
    let bytes = encode_chain(chain)?;
    write_atomic(path, &bytes)?;
    tracing::debug!(path = %path.display(), blocks = chain.len(), "snapshot saved");
    Ok(())
}

/// Load and validate the chain stored at `path`.
///
/// A missing file is not an error: it yields a chain holding only the
/// genesis block.
pub fn load_chain(path: impl AsRef<Path>) -> StorageResult<Chain> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(bytes) => {
            let chain = decode_chain(&bytes)?;
            tracing::info!(path = %path.display(), blocks = chain.len(), "snapshot loaded");
            Ok(chain)
        }
        Err(e) => match StorageError::io(path, e) {
            StorageError::NotFound { .. } => {
                tracing::info!(path = %path.display(), "no snapshot found, starting from genesis");
                Ok(Chain::new())
            }
            other => Err(other),
        },
    }
}

/// Temp file in the target's directory, fsync, rename over the target,
/// then fsync the directory so the rename itself is durable.
fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;
    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> StorageResult<()> {
    std::fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| StorageError::io(dir, e))
}

// Directories cannot be opened for fsync on Windows.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> StorageResult<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Where a [`Ledger`](super::Ledger) keeps its snapshot bytes.
///
/// Implementations must make `write` all-or-nothing: after it returns,
/// a `read` yields either the previous snapshot or the new one.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot.
    async fn write(&self, bytes: Vec<u8>) -> StorageResult<()>;

    /// Fetch the stored snapshot, or `None` if nothing was ever written.
    async fn read(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Snapshot stored in a single JSON file.
///
/// Every `write` call takes a generation number when it is made. The
/// blocking write only lands if no later generation has landed first, so a
/// save that outlived its timeout can never rename over a newer snapshot.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    next_generation: Arc<AtomicU64>,
    /// Generation of the snapshot currently on disk.
    landed: Arc<Mutex<u64>>,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_generation: Arc::new(AtomicU64::new(0)),
            landed: Arc::new(Mutex::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `bytes` as `generation` unless a newer generation already landed.
fn write_generation(
    path: &Path,
    landed: &Mutex<u64>,
    generation: u64,
    bytes: &[u8],
) -> StorageResult<()> {
    let mut current = landed.lock();
    if generation < *current {
        tracing::debug!(
            path = %path.display(),
            generation,
            landed = *current,
            "stale snapshot write skipped"
        );
        return Ok(());
    }
    write_atomic(path, bytes)?;
    *current = generation;
    Ok(())
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn write(&self, bytes: Vec<u8>) -> StorageResult<()> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.path.clone();
        let landed = Arc::clone(&self.landed);
        tokio::task::spawn_blocking(move || write_generation(&path, &landed, generation, &bytes))
            .await
            .map_err(|e| StorageError::io(&self.path, std::io::Error::other(e)))?
    }

    async fn read(&self) -> StorageResult<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) => match StorageError::io(&self.path, e) {
                StorageError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }
}

/// Snapshot kept in memory. Useful for tests and for embedding the
/// ledger where durability is handled elsewhere.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    bytes: tokio::sync::Mutex<Option<Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing snapshot bytes.
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: tokio::sync::Mutex::new(Some(bytes)),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn write(&self, bytes: Vec<u8>) -> StorageResult<()> {
        *self.bytes.lock().await = Some(bytes);
        Ok(())
    }

    async fn read(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.bytes.lock().await.clone())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
