//! Block Processor
//!
//! Drives the moving window of blocks through fetch -> classify ->
//! materialize -> checkpoint. Fetches run in parallel up to the configured
//! concurrency; application is strictly serial in block order, transaction
//! intents before log intents within each block. The checkpoint only ever
//! advances over the contiguous prefix of fully applied blocks, so a block
//! whose fetch exhausted every endpoint is retried on the next pass rather
//! than skipped for good.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::classify::Classifier;
use crate::config::IndexerConfig;
use crate::error::{IndexerError, IndexerResult};
use crate::materialize::Materializer;
use crate::metrics::IndexerMetrics;
use crate::rpc::{Block, Log, RpcPool};
use crate::storage::IndexStore;
use crate::types::{Checkpoint, TxContext};

type FetchResult = IndexerResult<Option<(Block, Vec<Log>)>>;

/// Throttle between consecutive batches while catching up; the store is
/// the slowest component and gets breathing room.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(50);

/// Orchestrates batch processing against one store and one RPC pool.
pub struct BlockProcessor<S: IndexStore + 'static> {
    store: Arc<S>,
    pool: Arc<RpcPool>,
    classifier: Classifier,
    materializer: Materializer,
    topics: Vec<String>,
    config: IndexerConfig,
    metrics: Arc<IndexerMetrics>,
    /// Last fully applied block; `None` until the first batch resolves the
    /// resume point.
    last_processed: Mutex<Option<u64>>,
}

impl<S: IndexStore + 'static> BlockProcessor<S> {
    pub fn new(
        store: Arc<S>,
        pool: Arc<RpcPool>,
        config: IndexerConfig,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        let classifier = Classifier::new();
        let topics = classifier.topics();
        Self {
            store,
            pool,
            classifier,
            materializer: Materializer::new(metrics.clone()),
            topics,
            config,
            metrics,
            last_processed: Mutex::new(None),
        }
    }

    /// Resolve the block processing resumes after: the configured override
    /// wins, then the persisted checkpoint, then the current head (a fresh
    /// indexer follows the chain forward rather than backfilling genesis).
    async fn baseline(&self, head: u64) -> IndexerResult<u64> {
        if let Some(start) = self.config.start_block {
            return Ok(start.saturating_sub(1));
        }
        if let Some(checkpoint) = self.store.load_checkpoint(&self.config.indexer_name).await? {
            return Ok(checkpoint.block_number);
        }
        info!("no checkpoint found, starting at head {}", head);
        Ok(head)
    }

    /// Apply one block's intents in classification order.
    pub async fn apply_block(&self, block: &Block, logs: &[Log]) -> IndexerResult<()> {
        let mut intents = 0usize;

        for tx in &block.transactions {
            let ctx = TxContext {
                tx_hash: tx.hash.clone(),
                block_number: block.number,
                timestamp: block.timestamp,
            };
            for intent in self.classifier.classify_transaction(tx) {
                self.materializer.apply(&*self.store, &ctx, &intent).await?;
                intents += 1;
            }
        }

        for log in logs {
            if let Some(intent) = self.classifier.classify_log(log) {
                let ctx = TxContext {
                    tx_hash: log.tx_hash.clone(),
                    block_number: block.number,
                    timestamp: block.timestamp,
                };
                self.materializer.apply(&*self.store, &ctx, &intent).await?;
                intents += 1;
            }
        }

        self.metrics.block_processed();
        debug!(
            "applied block {} ({} txs, {} logs, {} intents)",
            block.number,
            block.transactions.len(),
            logs.len(),
            intents
        );
        Ok(())
    }

    /// Fetch `[start, end]` with bounded concurrency, keyed by number.
    async fn fetch_range(
        &self,
        start: u64,
        end: u64,
    ) -> IndexerResult<HashMap<u64, FetchResult>> {
        let mut set: JoinSet<(u64, FetchResult)> = JoinSet::new();
        let mut results = HashMap::new();
        let mut next = start;

        while next <= end || !set.is_empty() {
            while next <= end && set.len() < self.config.concurrency {
                let pool = self.pool.clone();
                let topics = self.topics.clone();
                let number = next;
                set.spawn(async move {
                    let result = fetch_one(&pool, number, &topics).await;
                    (number, result)
                });
                next += 1;
            }

            if let Some(joined) = set.join_next().await {
                let (number, result) = joined
                    .map_err(|e| IndexerError::RpcRequest(format!("fetch task failed: {}", e)))?;
                results.insert(number, result);
            }
        }

        Ok(results)
    }

    /// One batch iteration. `Ok(true)` when the checkpoint advanced.
    pub async fn process_once(&self) -> IndexerResult<bool> {
        let head = self.pool.get_head().await?;

        let mut last_guard = self.last_processed.lock().await;
        let last = match *last_guard {
            Some(last) => last,
            None => {
                let baseline = self.baseline(head).await?;
                *last_guard = Some(baseline);
                baseline
            }
        };

        if head <= last {
            return Ok(false);
        }

        let start = last + 1;
        let end = head.min(last + self.config.batch_size);
        debug!("processing batch [{}, {}] (head {})", start, end, head);

        let mut results = self.fetch_range(start, end).await?;

        let mut applied: Option<u64> = None;
        let mut batch_error: Option<IndexerError> = None;
        for number in start..=end {
            match results.remove(&number) {
                Some(Ok(Some((block, logs)))) => {
                    if let Err(e) = self.apply_block(&block, &logs).await {
                        // Store failures stop the batch; nothing past this
                        // block is checkpointed, so it re-applies next pass.
                        error!("failed to apply block {}: {}", number, e);
                        batch_error = Some(e);
                        break;
                    }
                    applied = Some(number);
                }
                Some(Ok(None)) => {
                    warn!("block {} not yet available, truncating batch", number);
                    break;
                }
                Some(Err(e)) => {
                    warn!("skipping batch tail: block {} failed to fetch: {}", number, e);
                    self.metrics.block_failed();
                    break;
                }
                None => break,
            }
        }

        let advanced = if let Some(applied) = applied {
            self.store
                .save_checkpoint(&Checkpoint::new(&self.config.indexer_name, applied))
                .await?;
            *last_guard = Some(applied);
            self.metrics.batch_committed();
            let snapshot = self.metrics.snapshot();
            info!(
                "checkpoint {} (head {}, {} blocks, {} inscriptions, {} transfers)",
                applied,
                head,
                snapshot.blocks_processed,
                snapshot.inscriptions_created,
                snapshot.transfers_applied
            );
            true
        } else {
            false
        };

        match batch_error {
            Some(e) => Err(e),
            None => Ok(advanced),
        }
    }

    /// Spawn the processing loop. Cancellation is cooperative and lands
    /// between batches, never inside one.
    pub fn start(self: Arc<Self>) -> ProcessorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        let join = tokio::spawn(async move {
            info!(
                "block processor started (chain {}, batch {}, concurrency {})",
                self.pool.chain_id(),
                self.config.batch_size,
                self.config.concurrency
            );

            loop {
                match shutdown_rx.try_recv() {
                    Ok(()) | Err(mpsc::error::TryRecvError::Disconnected) => break,
                    Err(mpsc::error::TryRecvError::Empty) => {}
                }

                let advanced = match self.process_once().await {
                    Ok(advanced) => advanced,
                    Err(e) => {
                        error!("batch processing error: {}", e);
                        false
                    }
                };

                let delay = if advanced {
                    INTER_BATCH_DELAY
                } else {
                    poll_interval
                };
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            info!("block processor stopped");
        });

        ProcessorHandle { shutdown_tx, join }
    }
}

async fn fetch_one(pool: &RpcPool, number: u64, topics: &[String]) -> FetchResult {
    let block = match pool.get_block(number).await? {
        Some(block) => block,
        None => return Ok(None),
    };
    let logs = pool.get_logs(number, topics).await?;
    Ok(Some((block, logs)))
}

/// Handle over the running processor loop.
pub struct ProcessorHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: tokio::task::JoinHandle<()>,
}

impl ProcessorHandle {
    /// Signal shutdown and wait for the loop to finish its current batch.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.join.await;
    }
}
