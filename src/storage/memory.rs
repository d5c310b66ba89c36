//! In-Memory Store
//!
//! RwLock-protected maps, used by tests and development. Uniqueness and
//! compare-and-set semantics match the sled backend exactly.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{IndexStore, StoreStats};
use crate::error::{IndexerError, IndexerResult};
use crate::types::{
    Checkpoint, Collection, CollectionItem, Inscription, Token, TokenKind, TokenNote,
    TransferRecord,
};

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inscriptions: RwLock<HashMap<String, Inscription>>,
    transfers: RwLock<Vec<TransferRecord>>,
    transfer_keys: RwLock<HashSet<String>>,
    collections: RwLock<HashMap<String, Collection>>,
    collection_items: RwLock<HashMap<(String, u64), CollectionItem>>,
    tokens: RwLock<HashMap<(TokenKind, String), Token>>,
    notes: RwLock<HashMap<(TokenKind, String, u64), TokenNote>>,
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    // ==================== Inscriptions ====================

    async fn insert_inscription(&self, inscription: &Inscription) -> IndexerResult<bool> {
        let mut inscriptions = self.inscriptions.write().await;
        if inscriptions.contains_key(&inscription.id) {
            return Ok(false);
        }
        inscriptions.insert(inscription.id.clone(), inscription.clone());
        Ok(true)
    }

    async fn get_inscription(&self, id: &str) -> IndexerResult<Option<Inscription>> {
        let inscriptions = self.inscriptions.read().await;
        Ok(inscriptions.get(id).cloned())
    }

    async fn count_esip6_for_hash(&self, content_hash: &str) -> IndexerResult<u64> {
        let inscriptions = self.inscriptions.read().await;
        Ok(inscriptions
            .values()
            .filter(|i| i.esip6 && i.base_hash() == content_hash)
            .count() as u64)
    }

    async fn creation_exists(&self, tx_hash: &str, content_hash: &str) -> IndexerResult<bool> {
        let inscriptions = self.inscriptions.read().await;
        Ok(inscriptions
            .values()
            .any(|i| i.creation_tx == tx_hash && i.base_hash() == content_hash))
    }

    async fn compare_and_set_owner(
        &self,
        id: &str,
        expected: &str,
        new_owner: &str,
    ) -> IndexerResult<bool> {
        let mut inscriptions = self.inscriptions.write().await;
        match inscriptions.get_mut(id) {
            Some(inscription) if inscription.current_owner == expected => {
                inscription.current_owner = new_owner.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ==================== Transfers ====================

    async fn insert_transfer(&self, transfer: &TransferRecord) -> IndexerResult<bool> {
        let mut keys = self.transfer_keys.write().await;
        if !keys.insert(transfer.dedup_key()) {
            return Ok(false);
        }
        self.transfers.write().await.push(transfer.clone());
        Ok(true)
    }

    async fn transfers_for(&self, inscription_id: &str) -> IndexerResult<Vec<TransferRecord>> {
        let transfers = self.transfers.read().await;
        Ok(transfers
            .iter()
            .filter(|t| t.inscription_id == inscription_id)
            .cloned()
            .collect())
    }

    // ==================== Collections ====================

    async fn insert_collection(&self, collection: &Collection) -> IndexerResult<bool> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(&collection.id) {
            return Ok(false);
        }
        collections.insert(collection.id.clone(), collection.clone());
        Ok(true)
    }

    async fn get_collection(&self, id: &str) -> IndexerResult<Option<Collection>> {
        let collections = self.collections.read().await;
        Ok(collections.get(id).cloned())
    }

    async fn update_collection(&self, collection: &Collection) -> IndexerResult<()> {
        let mut collections = self.collections.write().await;
        collections.insert(collection.id.clone(), collection.clone());
        Ok(())
    }

    async fn collection_item_count(&self, collection_id: &str) -> IndexerResult<u64> {
        let items = self.collection_items.read().await;
        Ok(items.keys().filter(|(cid, _)| cid == collection_id).count() as u64)
    }

    async fn insert_collection_item(&self, item: &CollectionItem) -> IndexerResult<bool> {
        let mut items = self.collection_items.write().await;
        let key = (item.collection_id.clone(), item.item_index);
        if items.contains_key(&key) {
            return Ok(false);
        }
        items.insert(key, item.clone());
        Ok(true)
    }

    // ==================== Tokens ====================

    async fn insert_token(&self, token: &Token) -> IndexerResult<bool> {
        let mut tokens = self.tokens.write().await;
        let key = (token.kind, token.tick.clone());
        if tokens.contains_key(&key) {
            return Ok(false);
        }
        tokens.insert(key, token.clone());
        Ok(true)
    }

    async fn get_token(&self, kind: TokenKind, tick: &str) -> IndexerResult<Option<Token>> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(&(kind, tick.to_string())).cloned())
    }

    async fn update_token(&self, token: &Token) -> IndexerResult<()> {
        let mut tokens = self.tokens.write().await;
        tokens.insert((token.kind, token.tick.clone()), token.clone());
        Ok(())
    }

    async fn insert_token_note(&self, kind: TokenKind, note: &TokenNote) -> IndexerResult<bool> {
        let mut notes = self.notes.write().await;
        let key = (kind, note.tick.clone(), note.note_id);
        if notes.contains_key(&key) {
            return Ok(false);
        }
        notes.insert(key, note.clone());
        Ok(true)
    }

    async fn token_note_count(&self, kind: TokenKind, tick: &str) -> IndexerResult<u64> {
        let notes = self.notes.read().await;
        Ok(notes
            .keys()
            .filter(|(k, t, _)| *k == kind && t == tick)
            .count() as u64)
    }

    async fn sum_note_amounts(&self, kind: TokenKind, tick: &str) -> IndexerResult<u128> {
        let notes = self.notes.read().await;
        Ok(notes
            .iter()
            .filter(|((k, t, _), _)| *k == kind && t == tick)
            .map(|(_, note)| note.amount)
            .sum())
    }

    async fn notes_backed_by(
        &self,
        inscription_id: &str,
    ) -> IndexerResult<Vec<(TokenKind, TokenNote)>> {
        let notes = self.notes.read().await;
        let mut backed: Vec<(TokenKind, TokenNote)> = notes
            .iter()
            .filter(|(_, note)| note.inscription_id == inscription_id)
            .map(|((kind, _, _), note)| (*kind, note.clone()))
            .collect();
        backed.sort_by(|a, b| (a.0, &a.1.tick, a.1.note_id).cmp(&(b.0, &b.1.tick, b.1.note_id)));
        Ok(backed)
    }

    async fn reassign_note_owner(
        &self,
        inscription_id: &str,
        new_owner: &str,
    ) -> IndexerResult<u64> {
        let mut notes = self.notes.write().await;
        let mut updated = 0;
        for note in notes.values_mut() {
            if note.inscription_id == inscription_id {
                note.owner = new_owner.to_string();
                updated += 1;
            }
        }
        Ok(updated)
    }

    // ==================== Checkpoint ====================

    async fn load_checkpoint(&self, indexer: &str) -> IndexerResult<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(indexer).cloned())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> IndexerResult<()> {
        let mut checkpoints = self.checkpoints.write().await;
        if let Some(existing) = checkpoints.get(&checkpoint.indexer) {
            if checkpoint.block_number == 0 && existing.block_number > 0 {
                return Err(IndexerError::Checkpoint(format!(
                    "refusing to regress {} from {} to 0",
                    checkpoint.indexer, existing.block_number
                )));
            }
        }
        checkpoints.insert(checkpoint.indexer.clone(), checkpoint.clone());
        Ok(())
    }

    // ==================== Stats ====================

    async fn stats(&self) -> IndexerResult<StoreStats> {
        let notes = self.notes.read().await;
        let tokens = self.tokens.read().await;
        Ok(StoreStats {
            inscriptions: self.inscriptions.read().await.len() as u64,
            transfers: self.transfers.read().await.len() as u64,
            collections: self.collections.read().await.len() as u64,
            collection_items: self.collection_items.read().await.len() as u64,
            fixed_tokens: tokens
                .keys()
                .filter(|(k, _)| *k == TokenKind::FixedDenomination)
                .count() as u64,
            curve_tokens: tokens
                .keys()
                .filter(|(k, _)| *k == TokenKind::BondingCurve)
                .count() as u64,
            fixed_notes: notes
                .keys()
                .filter(|(k, _, _)| *k == TokenKind::FixedDenomination)
                .count() as u64,
            curve_notes: notes
                .keys()
                .filter(|(k, _, _)| *k == TokenKind::BondingCurve)
                .count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inscription(id: &str, owner: &str, esip6: bool) -> Inscription {
        Inscription {
            id: id.to_string(),
            content_type: "text/plain".to_string(),
            creator: owner.to_string(),
            current_owner: owner.to_string(),
            creation_tx: format!("0xtx-{}", id),
            creation_block: 1,
            creation_timestamp: 10,
            esip6,
            esip6_sequence: None,
            created_by_contract: false,
            creator_contract: None,
        }
    }

    #[tokio::test]
    async fn test_insert_inscription_conflicts_on_id() {
        let store = MemoryStore::new();
        assert!(store
            .insert_inscription(&inscription("0xaa", "0x1", false))
            .await
            .unwrap());
        assert!(!store
            .insert_inscription(&inscription("0xaa", "0x2", false))
            .await
            .unwrap());
        let stored = store.get_inscription("0xaa").await.unwrap().unwrap();
        assert_eq!(stored.current_owner, "0x1");
    }

    #[tokio::test]
    async fn test_compare_and_set_owner() {
        let store = MemoryStore::new();
        store
            .insert_inscription(&inscription("0xaa", "0x1", false))
            .await
            .unwrap();

        assert!(!store.compare_and_set_owner("0xaa", "0x9", "0x2").await.unwrap());
        assert!(!store.compare_and_set_owner("0xmissing", "0x1", "0x2").await.unwrap());
        assert!(store.compare_and_set_owner("0xaa", "0x1", "0x2").await.unwrap());
        assert_eq!(
            store
                .get_inscription("0xaa")
                .await
                .unwrap()
                .unwrap()
                .current_owner,
            "0x2"
        );
    }

    #[tokio::test]
    async fn test_esip6_count_only_counts_siblings() {
        let store = MemoryStore::new();
        store
            .insert_inscription(&inscription("0xaa", "0x1", false))
            .await
            .unwrap();
        store
            .insert_inscription(&inscription("0xaa-1", "0x1", true))
            .await
            .unwrap();
        store
            .insert_inscription(&inscription("0xbb-1", "0x1", true))
            .await
            .unwrap();

        assert_eq!(store.count_esip6_for_hash("0xaa").await.unwrap(), 1);
        assert_eq!(store.count_esip6_for_hash("0xbb").await.unwrap(), 1);
        assert_eq!(store.count_esip6_for_hash("0xcc").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transfer_dedup() {
        let store = MemoryStore::new();
        let transfer = TransferRecord {
            inscription_id: "0xaa".to_string(),
            from: "0x1".to_string(),
            to: "0x2".to_string(),
            tx_hash: "0xt".to_string(),
            block_number: 5,
            timestamp: 50,
            log_index: None,
            contract_address: None,
            kind: crate::types::TransferKind::Eoa,
        };
        assert!(store.insert_transfer(&transfer).await.unwrap());
        assert!(!store.insert_transfer(&transfer).await.unwrap());
        assert_eq!(store.transfers_for("0xaa").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_note_owner_mirroring() {
        let store = MemoryStore::new();
        let note = TokenNote {
            tick: "bsct".to_string(),
            note_id: 1,
            inscription_id: "0xaa".to_string(),
            owner: "0x1".to_string(),
            amount: 100,
        };
        store
            .insert_token_note(TokenKind::FixedDenomination, &note)
            .await
            .unwrap();
        let mut curve_note = note.clone();
        curve_note.tick = "curv".to_string();
        store
            .insert_token_note(TokenKind::BondingCurve, &curve_note)
            .await
            .unwrap();

        assert_eq!(store.reassign_note_owner("0xaa", "0x2").await.unwrap(), 2);
        for (_, n) in store.notes_backed_by("0xaa").await.unwrap() {
            assert_eq!(n.owner, "0x2");
        }
    }

    #[tokio::test]
    async fn test_checkpoint_regression_refused() {
        let store = MemoryStore::new();
        store
            .save_checkpoint(&Checkpoint::new("main", 100))
            .await
            .unwrap();
        assert!(store.save_checkpoint(&Checkpoint::new("main", 0)).await.is_err());
        store
            .save_checkpoint(&Checkpoint::new("main", 101))
            .await
            .unwrap();
        assert_eq!(
            store
                .load_checkpoint("main")
                .await
                .unwrap()
                .unwrap()
                .block_number,
            101
        );
    }
}
