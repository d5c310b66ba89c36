//! Ethscriptions Indexer
//!
//! Indexer for calldata inscriptions ("ethscriptions") on Base-style EVM
//! L2 chains. It scans blocks from a failover pool of JSON-RPC endpoints,
//! classifies transaction calldata and protocol event logs into typed
//! intents, and materializes ownership, collection and token-supply state
//! into an embedded store with crash-safe checkpointing.
//!
//! # Architecture
//!
//! - **RPC Pool**: ordered endpoints with rate-limit-aware failover
//! - **Codec**: hex / UTF-8 / SHA-256 / data-URI / gzip canonicalization
//! - **Classifier**: transactions and logs -> typed intents
//! - **Materializer**: idempotent intent application with owner CAS
//! - **Protocol Handler**: collection and fungible-token state machines
//! - **Block Processor**: parallel fetch, strictly serial in-order apply
//!
//! # Usage
//!
//! ```rust,no_run
//! use ethscriptions_indexer::{Indexer, IndexerConfig};
//!
//! async fn example() {
//!     let config = IndexerConfig::from_env();
//!     let indexer = Indexer::in_memory(config).unwrap();
//!     let handle = indexer.start();
//!     // ... until shutdown:
//!     handle.stop().await;
//! }
//! ```

pub mod classify;
pub mod codec;
pub mod config;
pub mod error;
pub mod materialize;
pub mod metrics;
pub mod processor;
pub mod protocol;
pub mod rpc;
pub mod storage;
pub mod types;

pub use classify::Classifier;
pub use config::{IndexerConfig, RpcConfig, StorageConfig};
pub use error::{IndexerError, IndexerResult};
pub use materialize::Materializer;
pub use metrics::{IndexerMetrics, MetricsSnapshot};
pub use processor::{BlockProcessor, ProcessorHandle};
pub use rpc::{Block, Log, RpcPool, Transaction};
pub use storage::{IndexStore, MemoryStore, SledStore, StoreStats};
pub use types::{Checkpoint, Collection, CollectionItem, Inscription, Intent, Token, TokenKind,
    TokenNote, TransferKind, TransferRecord, TxContext};

use std::sync::Arc;
use tracing::info;

/// Top-level client wiring config, store, RPC pool and processor.
pub struct Indexer<S: IndexStore + 'static> {
    config: IndexerConfig,
    store: Arc<S>,
    pool: Arc<RpcPool>,
    processor: Arc<BlockProcessor<S>>,
    metrics: Arc<IndexerMetrics>,
}

impl Indexer<SledStore> {
    /// Open an indexer over the sled store at the configured data dir.
    pub fn open(config: IndexerConfig) -> IndexerResult<Self> {
        let store = Arc::new(SledStore::new(&config.storage)?);
        Self::with_store(config, store)
    }
}

impl Indexer<MemoryStore> {
    /// An indexer over an in-memory store (tests, development).
    pub fn in_memory(config: IndexerConfig) -> IndexerResult<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }
}

impl<S: IndexStore + 'static> Indexer<S> {
    /// Wire an indexer over an existing store.
    pub fn with_store(config: IndexerConfig, store: Arc<S>) -> IndexerResult<Self> {
        config.validate().map_err(IndexerError::Configuration)?;

        let pool = Arc::new(RpcPool::new(&config.rpc)?);
        let metrics = Arc::new(IndexerMetrics::new());
        let processor = Arc::new(BlockProcessor::new(
            store.clone(),
            pool.clone(),
            config.clone(),
            metrics.clone(),
        ));

        info!(
            "indexer wired: chain {}, {} endpoints",
            pool.chain_id(),
            pool.endpoint_count()
        );

        Ok(Self {
            config,
            store,
            pool,
            processor,
            metrics,
        })
    }

    /// Start the background processing loop.
    pub fn start(&self) -> ProcessorHandle {
        self.processor.clone().start()
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<RpcPool> {
        &self.pool
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Current checkpoint position, if any.
    pub async fn checkpoint(&self) -> IndexerResult<Option<Checkpoint>> {
        self.store.load_checkpoint(&self.config.indexer_name).await
    }

    /// Store row counts.
    pub async fn stats(&self) -> IndexerResult<StoreStats> {
        self.store.stats().await
    }
}
