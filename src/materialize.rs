//! State Materializer
//!
//! Applies classified intents to the store. Every mutation is idempotent
//! with respect to re-running a block: creates are absorbed by id (or by
//! creating-tx for ESIP-6), transfer rows are deduplicated, and the owner
//! update is a compare-and-set that a stale replay cannot pass.

use std::sync::Arc;
use tracing::debug;

use crate::error::IndexerResult;
use crate::metrics::IndexerMetrics;
use crate::protocol::ProtocolHandler;
use crate::storage::IndexStore;
use crate::types::{Inscription, Intent, TransferKind, TransferRecord, TxContext};

/// Applies intents in the order the classifier produced them.
pub struct Materializer {
    protocol: ProtocolHandler,
    metrics: Arc<IndexerMetrics>,
}

impl Materializer {
    pub fn new(metrics: Arc<IndexerMetrics>) -> Self {
        Self {
            protocol: ProtocolHandler::new(metrics.clone()),
            metrics,
        }
    }

    /// Apply one intent. Store errors propagate (the batch aborts and the
    /// checkpoint stays put); protocol-level rejections are absorbed.
    pub async fn apply<S: IndexStore + ?Sized>(
        &self,
        store: &S,
        ctx: &TxContext,
        intent: &Intent,
    ) -> IndexerResult<()> {
        match intent {
            Intent::Create {
                content_uri,
                content_hash,
                content_type,
                creator,
                initial_owner,
                esip6,
                creator_contract,
            } => {
                self.apply_create(
                    store,
                    ctx,
                    content_uri,
                    content_hash,
                    content_type,
                    creator,
                    initial_owner,
                    *esip6,
                    creator_contract.as_deref(),
                )
                .await
            }
            Intent::Transfer {
                from,
                to,
                inscription_id,
            } => {
                self.apply_transfer(
                    store,
                    ctx,
                    inscription_id,
                    Some(from.as_str()),
                    to,
                    TransferKind::Eoa,
                    None,
                    None,
                )
                .await
            }
            Intent::ContractTransfer {
                contract,
                to,
                inscription_id,
                log_index,
                expected_prev,
            } => {
                let kind = if expected_prev.is_some() {
                    TransferKind::Esip2
                } else {
                    TransferKind::Esip1
                };
                self.apply_transfer(
                    store,
                    ctx,
                    inscription_id,
                    expected_prev.as_deref(),
                    to,
                    kind,
                    Some(*log_index),
                    Some(contract.as_str()),
                )
                .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_create<S: IndexStore + ?Sized>(
        &self,
        store: &S,
        ctx: &TxContext,
        content_uri: &str,
        content_hash: &str,
        content_type: &str,
        creator: &str,
        initial_owner: &str,
        esip6: bool,
        creator_contract: Option<&str>,
    ) -> IndexerResult<()> {
        let (id, sequence) = if esip6 {
            // Replays key on the creating tx: the sibling count has moved
            // on, so recomputing the suffix would mint a phantom sibling.
            if store.creation_exists(&ctx.tx_hash, content_hash).await? {
                self.metrics.create_absorbed();
                return Ok(());
            }
            let sequence = store.count_esip6_for_hash(content_hash).await? + 1;
            (format!("{}-{}", content_hash, sequence), Some(sequence))
        } else {
            (content_hash.to_string(), None)
        };

        let inscription = Inscription {
            id,
            content_type: content_type.to_string(),
            creator: creator.to_string(),
            current_owner: initial_owner.to_string(),
            creation_tx: ctx.tx_hash.clone(),
            creation_block: ctx.block_number,
            creation_timestamp: ctx.timestamp,
            esip6,
            esip6_sequence: sequence,
            created_by_contract: creator_contract.is_some(),
            creator_contract: creator_contract.map(|c| c.to_string()),
        };

        if !store.insert_inscription(&inscription).await? {
            // Already indexed for this content; the intent is absorbed.
            debug!("create of {} absorbed as duplicate", inscription.id);
            self.metrics.create_absorbed();
            return Ok(());
        }
        self.metrics.inscription_created();

        self.protocol
            .handle_create(store, &inscription, content_uri)
            .await
    }

    /// Shared transfer path. `expected_from` is the owner the transfer
    /// claims to move from: the sender for EOA, the escrowed previous
    /// owner for ESIP-2, and `None` for ESIP-1 (which trusts the emitting
    /// contract and moves from whoever currently owns the inscription).
    #[allow(clippy::too_many_arguments)]
    async fn apply_transfer<S: IndexStore + ?Sized>(
        &self,
        store: &S,
        ctx: &TxContext,
        inscription_id: &str,
        expected_from: Option<&str>,
        to: &str,
        kind: TransferKind,
        log_index: Option<u64>,
        contract_address: Option<&str>,
    ) -> IndexerResult<()> {
        let inscription = match store.get_inscription(inscription_id).await? {
            Some(inscription) => inscription,
            None => {
                debug!("transfer of unknown inscription {}", inscription_id);
                self.metrics.transfer_dropped();
                return Ok(());
            }
        };

        let from = match expected_from {
            Some(expected) => expected.to_string(),
            None => inscription.current_owner.clone(),
        };

        if !store
            .compare_and_set_owner(inscription_id, &from, to)
            .await?
        {
            debug!(
                "transfer of {} dropped: owner is not {}",
                inscription_id, from
            );
            self.metrics.transfer_dropped();
            return Ok(());
        }

        let record = TransferRecord {
            inscription_id: inscription_id.to_string(),
            from,
            to: to.to_string(),
            tx_hash: ctx.tx_hash.clone(),
            block_number: ctx.block_number,
            timestamp: ctx.timestamp,
            log_index,
            contract_address: contract_address.map(|c| c.to_string()),
            kind,
        };
        if store.insert_transfer(&record).await? {
            self.metrics.transfer_applied();
        }

        store.reassign_note_owner(inscription_id, to).await?;
        Ok(())
    }
}
