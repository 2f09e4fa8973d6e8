//! # Ledger
//!
//! The one owner of the chain inside a process. Everything that issues
//! certificates or reads the chain goes through a shared `Arc<Ledger>`.
//!
//! ## Locking
//!
//! ```text
//! append_certificate ─┐
//! persist ────────────┼── write lock ── chain.append ── store.write (bounded)
//!                     │
//! block / tip / ... ──┴── read lock (parallel with other readers)
//! ```
//!
//! The write lock is held across the in-memory append *and* the save that
//! follows it, so at most one append is in flight and readers never see a
//! block whose save is still pending.
//!
//! ## Failed saves
//!
//! A save that fails (after retries) does not roll the block back. The
//! caller gets [`StorageError::PersistFailed`] carrying the committed block,
//! the ledger is marked dirty, and [`Ledger::persist`] retries the save.
//! Nothing in here ever re-appends.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::block::Block;
use super::chain::Chain;
use super::error::{IntegrityError, StorageError, StorageResult};
use super::snapshot::{decode_chain, encode_chain, FileSnapshotStore, SnapshotStore};
use crate::certificate::Certificate;
use crate::config::LedgerConfig;

struct LedgerState {
    chain: Chain,
    /// Number of blocks known to be in the store.
    persisted_len: usize,
}

/// Shared, lock-guarded owner of a [`Chain`] and its snapshot store.
pub struct Ledger {
    state: RwLock<LedgerState>,
    store: Arc<dyn SnapshotStore>,
    config: LedgerConfig,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("store", &self.store.describe())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open the ledger backed by the snapshot file in `config`.
    ///
    /// A missing file starts a fresh chain. Any other load failure,
    /// including a snapshot that fails validation, is returned.
    pub async fn open(config: LedgerConfig) -> StorageResult<Self> {
        let store = Arc::new(FileSnapshotStore::new(config.snapshot_path.clone()));
        Self::with_store(store, config).await
    }

    /// Open the ledger on an arbitrary [`SnapshotStore`].
    pub async fn with_store(
        store: Arc<dyn SnapshotStore>,
        config: LedgerConfig,
    ) -> StorageResult<Self> {
        let (chain, persisted_len) = match store.read().await? {
            Some(bytes) => {
                let chain = decode_chain(&bytes).map_err(|e| {
                    tracing::error!(store = %store.describe(), error = %e, "snapshot rejected");
                    e
                })?;
                let len = chain.len();
                (chain, len)
            }
            None => {
                tracing::info!(store = %store.describe(), "no snapshot found, starting from genesis");
                (Chain::new(), 0)
            }
        };

        tracing::info!(
            store = %store.describe(),
            height = chain.height(),
            tip = %chain.tip().hash,
            "ledger opened"
        );

        Ok(Self {
            state: RwLock::new(LedgerState {
                chain,
                persisted_len,
            }),
            store,
            config,
        })
    }

    /// Append a certificate and save the new chain.
    ///
    /// - `InvalidCertificate` / `Integrity`: nothing changed.
    /// - `PersistFailed`: the block is committed in memory but not on disk;
    ///   call [`Ledger::persist`] to retry.
    pub async fn append_certificate(&self, certificate: Certificate) -> StorageResult<Block> {
        let mut state = self.state.write().await;
        let block = state.chain.append(certificate)?;

        tracing::info!(
            index = block.index,
            hash = %block.hash,
            member_id = %block.payload.member_id,
            event = %block.payload.event_name,
            "certificate issued"
        );

        match self.save_with_retry(&state.chain).await {
            Ok(()) => {
                state.persisted_len = state.chain.len();
                Ok(block)
            }
            Err(source) => {
                tracing::warn!(
                    index = block.index,
                    error = %source,
                    "certificate committed in memory but snapshot save failed"
                );
                Err(StorageError::PersistFailed {
                    block: Box::new(block),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Save the current chain. Use after a `PersistFailed`; harmless
    /// (one extra write) when nothing is pending.
    pub async fn persist(&self) -> StorageResult<()> {
        let mut state = self.state.write().await;
        self.save_with_retry(&state.chain).await?;
        state.persisted_len = state.chain.len();
        tracing::info!(blocks = state.persisted_len, "snapshot persisted");
        Ok(())
    }

    /// `true` if the in-memory chain has blocks the store does not.
    pub async fn is_dirty(&self) -> bool {
        let state = self.state.read().await;
        state.persisted_len != state.chain.len()
    }

    /// Whole-chain integrity scan.
    pub async fn validate(&self) -> Result<(), IntegrityError> {
        self.state.read().await.chain.validate()
    }

    /// Block at `index`, if any.
    pub async fn block(&self, index: u64) -> Option<Block> {
        self.state.read().await.chain.get(index).cloned()
    }

    /// The most recent block.
    pub async fn tip(&self) -> Block {
        self.state.read().await.chain.tip().clone()
    }

    /// Index of the tip block.
    pub async fn height(&self) -> u64 {
        self.state.read().await.chain.height()
    }

    /// Number of blocks, genesis included.
    pub async fn len(&self) -> usize {
        self.state.read().await.chain.len()
    }

    /// Blocks whose certificate belongs to `member_id`.
    pub async fn certificates_for_member(&self, member_id: &str) -> Vec<Block> {
        self.state
            .read()
            .await
            .chain
            .certificates_for_member(member_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// A point-in-time copy of the chain.
    pub async fn snapshot(&self) -> Chain {
        self.state.read().await.chain.clone()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Encode once, then try the store up to `save_attempts` times, each
    /// bounded by `save_timeout`. Non-retryable errors stop immediately.
    async fn save_with_retry(&self, chain: &Chain) -> StorageResult<()> {
        let bytes = encode_chain(chain)?;
        let attempts = self.config.save_attempts.max(1);
        let timeout_ms = self.config.save_timeout.as_millis() as u64;

        let mut attempt = 1;
        loop {
            let result =
                match tokio::time::timeout(self.config.save_timeout, self.store.write(bytes.clone()))
                    .await
                {
                    Ok(r) => r,
                    Err(_) => Err(StorageError::SaveTimeout { timeout_ms }),
                };

            match result {
                Ok(()) => {
                    tracing::debug!(attempt, blocks = chain.len(), "snapshot saved");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(attempt, attempts, error = %e, "snapshot save failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "snapshot save failed");
                    return Err(e);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::snapshot::MemorySnapshotStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    /// Memory store whose writes fail while `failing` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemorySnapshotStore,
        failing: AtomicBool,
        writes: AtomicU32,
    }

    #[async_trait]
    impl SnapshotStore for FlakyStore {
        async fn write(&self, bytes: Vec<u8>) -> StorageResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::io(
                    "flaky",
                    std::io::Error::new(std::io::ErrorKind::Other, "disk unplugged"),
                ));
            }
            self.inner.write(bytes).await
        }

        async fn read(&self) -> StorageResult<Option<Vec<u8>>> {
            self.inner.read().await
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    /// Store whose writes never finish.
    struct StuckStore;

    #[async_trait]
    impl SnapshotStore for StuckStore {
        async fn write(&self, _bytes: Vec<u8>) -> StorageResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn read(&self) -> StorageResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn describe(&self) -> String {
            "stuck".into()
        }
    }

    fn fast_config() -> LedgerConfig {
        LedgerConfig {
            save_timeout: Duration::from_millis(200),
            save_attempts: 2,
            retry_backoff: Duration::from_millis(1),
            ..LedgerConfig::default()
        }
    }

    fn cert(i: usize) -> Certificate {
        Certificate::new(format!("m-{i}"), format!("Holder {i}"), "Systems Conf 2024")
    }

    #[tokio::test]
    async fn fresh_ledger_starts_at_genesis_and_dirty() {
        let ledger = Ledger::with_store(Arc::new(MemorySnapshotStore::new()), fast_config())
            .await
            .unwrap();
        assert_eq!(ledger.height().await, 0);
        assert_eq!(ledger.tip().await, Block::genesis());
        assert!(ledger.is_dirty().await);
    }

    #[tokio::test]
    async fn append_saves_to_store() {
        let store = Arc::new(MemorySnapshotStore::new());
        let ledger = Ledger::with_store(store.clone(), fast_config()).await.unwrap();

        let block = ledger.append_certificate(cert(1)).await.unwrap();
        assert_eq!(block.index, 1);
        assert!(!ledger.is_dirty().await);

        let saved = decode_chain(&store.read().await.unwrap().unwrap()).unwrap();
        assert_eq!(saved, ledger.snapshot().await);
    }

    #[tokio::test]
    async fn reopen_restores_chain() {
        let store = Arc::new(MemorySnapshotStore::new());
        let first = Ledger::with_store(store.clone(), fast_config()).await.unwrap();
        for i in 0..3 {
            first.append_certificate(cert(i)).await.unwrap();
        }

        let second = Ledger::with_store(store, fast_config()).await.unwrap();
        assert_eq!(second.snapshot().await, first.snapshot().await);
        assert!(!second.is_dirty().await);
    }

    #[tokio::test]
    async fn corrupt_snapshot_refuses_to_open() {
        let mut chain = Chain::new();
        chain.append(cert(0)).unwrap();
        chain.blocks_mut()[1].payload.holder_name = "Forged".into();
        let store = Arc::new(MemorySnapshotStore::with_bytes(encode_chain(&chain).unwrap()));

        let err = Ledger::with_store(store, fast_config()).await.unwrap_err();
        assert!(matches!(err, StorageError::Integrity(_)));
    }

    #[tokio::test]
    async fn invalid_certificate_does_not_touch_store() {
        let store = Arc::new(FlakyStore::default());
        let ledger = Ledger::with_store(store.clone(), fast_config()).await.unwrap();

        let err = ledger
            .append_certificate(Certificate::new("", "Ada", " "))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidCertificate(_)));
        assert_eq!(ledger.len().await, 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_save_keeps_block_and_persist_recovers() {
        let store = Arc::new(FlakyStore::default());
        let ledger = Ledger::with_store(store.clone(), fast_config()).await.unwrap();
        store.failing.store(true, Ordering::SeqCst);

        let err = ledger.append_certificate(cert(7)).await.unwrap_err();
        let committed = match err {
            StorageError::PersistFailed { block, source } => {
                assert!(source.is_retryable());
                *block
            }
            other => panic!("expected PersistFailed, got {other:?}"),
        };
        assert_eq!(committed.index, 1);
        assert_eq!(ledger.block(1).await, Some(committed));
        assert!(ledger.is_dirty().await);
        // Two attempts per the config.
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);

        store.failing.store(false, Ordering::SeqCst);
        ledger.persist().await.unwrap();
        assert!(!ledger.is_dirty().await);
        assert_eq!(ledger.len().await, 2, "persist must not re-append");

        let saved = decode_chain(&store.inner.read().await.unwrap().unwrap()).unwrap();
        assert_eq!(saved.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_save_times_out() {
        let config = LedgerConfig {
            save_attempts: 1,
            ..fast_config()
        };
        let ledger = Ledger::with_store(Arc::new(StuckStore), config).await.unwrap();

        let err = ledger.append_certificate(cert(1)).await.unwrap_err();
        match err {
            StorageError::PersistFailed { source, .. } => {
                assert!(matches!(*source, StorageError::SaveTimeout { timeout_ms: 200 }));
            }
            other => panic!("expected PersistFailed, got {other:?}"),
        }
        assert_eq!(ledger.height().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_never_share_an_index() {
        let ledger = Arc::new(
            Ledger::with_store(Arc::new(MemorySnapshotStore::new()), fast_config())
                .await
                .unwrap(),
        );

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move { ledger.append_certificate(cert(i)).await })
            })
            .collect();

        let mut indices = HashSet::new();
        for h in handles {
            let block = h.await.unwrap().unwrap();
            assert!(indices.insert(block.index), "duplicate index {}", block.index);
        }

        assert_eq!(indices.len(), 64);
        assert_eq!(ledger.len().await, 65);
        assert!(ledger.validate().await.is_ok());
    }

    #[tokio::test]
    async fn member_lookup_through_ledger() {
        let ledger = Ledger::with_store(Arc::new(MemorySnapshotStore::new()), fast_config())
            .await
            .unwrap();
        ledger.append_certificate(cert(1)).await.unwrap();
        ledger.append_certificate(cert(2)).await.unwrap();
        ledger.append_certificate(cert(1)).await.unwrap();

        let hits = ledger.certificates_for_member("m-1").await;
        assert_eq!(hits.iter().map(|b| b.index).collect::<Vec<_>>(), vec![1, 3]);
    }
}
