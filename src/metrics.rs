//! Indexer Metrics
//!
//! Monotonic counters over the processing pipeline, snapshotted into batch
//! logs and the status command.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector. All counters are cumulative since construction.
#[derive(Debug, Default)]
pub struct IndexerMetrics {
    blocks_processed: AtomicU64,
    batches_committed: AtomicU64,
    inscriptions_created: AtomicU64,
    creates_absorbed: AtomicU64,
    transfers_applied: AtomicU64,
    transfers_dropped: AtomicU64,
    protocol_ops_applied: AtomicU64,
    protocol_ops_dropped: AtomicU64,
    blocks_failed: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_processed: u64,
    pub batches_committed: u64,
    pub inscriptions_created: u64,
    pub creates_absorbed: u64,
    pub transfers_applied: u64,
    pub transfers_dropped: u64,
    pub protocol_ops_applied: u64,
    pub protocol_ops_dropped: u64,
    pub blocks_failed: u64,
}

impl IndexerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_processed(&self) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batch_committed(&self) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inscription_created(&self) {
        self.inscriptions_created.fetch_add(1, Ordering::Relaxed);
    }

    /// A create that resolved to an already-indexed inscription.
    pub fn create_absorbed(&self) {
        self.creates_absorbed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_applied(&self) {
        self.transfers_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_dropped(&self) {
        self.transfers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_op_applied(&self) {
        self.protocol_ops_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_op_dropped(&self) {
        self.protocol_ops_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A block skipped because every endpoint failed to serve it.
    pub fn block_failed(&self) {
        self.blocks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            inscriptions_created: self.inscriptions_created.load(Ordering::Relaxed),
            creates_absorbed: self.creates_absorbed.load(Ordering::Relaxed),
            transfers_applied: self.transfers_applied.load(Ordering::Relaxed),
            transfers_dropped: self.transfers_dropped.load(Ordering::Relaxed),
            protocol_ops_applied: self.protocol_ops_applied.load(Ordering::Relaxed),
            protocol_ops_dropped: self.protocol_ops_dropped.load(Ordering::Relaxed),
            blocks_failed: self.blocks_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = IndexerMetrics::new();
        metrics.block_processed();
        metrics.block_processed();
        metrics.inscription_created();
        metrics.transfer_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocks_processed, 2);
        assert_eq!(snapshot.inscriptions_created, 1);
        assert_eq!(snapshot.transfers_dropped, 1);
        assert_eq!(snapshot.transfers_applied, 0);
    }
}
