//! Sled-Backed Store
//!
//! One tree per logical table plus secondary-index trees, serde_json
//! values. The processor is the only writer, so reads-then-writes within
//! one operation do not race; the owner update still goes through sled's
//! compare-and-swap so the expected-owner check and the write are atomic.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

use super::{IndexStore, StoreStats};
use crate::config::StorageConfig;
use crate::error::{IndexerError, IndexerResult};
use crate::types::{
    Checkpoint, Collection, CollectionItem, Inscription, Token, TokenKind, TokenNote,
    TransferRecord,
};

const INSCRIPTIONS_TREE: &str = "inscriptions";
const ESIP6_COUNTS_TREE: &str = "esip6_counts";
const CREATIONS_TREE: &str = "creations";
const TRANSFERS_TREE: &str = "transfers";
const TRANSFER_INDEX_TREE: &str = "transfer_index";
const COLLECTIONS_TREE: &str = "collections";
const COLLECTION_ITEMS_TREE: &str = "collection_items";
const FIXED_TOKENS_TREE: &str = "tokens_fixed";
const CURVE_TOKENS_TREE: &str = "tokens_curve";
const FIXED_NOTES_TREE: &str = "notes_fixed";
const CURVE_NOTES_TREE: &str = "notes_curve";
const NOTES_BY_INSCRIPTION_TREE: &str = "notes_by_inscription";
const CHECKPOINTS_TREE: &str = "checkpoints";

/// Sled-backed store.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    inscriptions: sled::Tree,
    esip6_counts: sled::Tree,
    creations: sled::Tree,
    transfers: sled::Tree,
    transfer_index: sled::Tree,
    collections: sled::Tree,
    collection_items: sled::Tree,
    fixed_tokens: sled::Tree,
    curve_tokens: sled::Tree,
    fixed_notes: sled::Tree,
    curve_notes: sled::Tree,
    notes_by_inscription: sled::Tree,
    checkpoints: sled::Tree,
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> IndexerError {
    IndexerError::Storage(format!("{}: {}", context, e))
}

impl SledStore {
    pub fn new(config: &StorageConfig) -> IndexerResult<Self> {
        Self::open(&config.data_dir)
    }

    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> IndexerResult<Self> {
        let db = sled::open(path).map_err(|e| storage_err("failed to open sled db", e))?;

        let open_tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| storage_err(&format!("failed to open {} tree", name), e))
        };

        Ok(Self {
            inscriptions: open_tree(INSCRIPTIONS_TREE)?,
            esip6_counts: open_tree(ESIP6_COUNTS_TREE)?,
            creations: open_tree(CREATIONS_TREE)?,
            transfers: open_tree(TRANSFERS_TREE)?,
            transfer_index: open_tree(TRANSFER_INDEX_TREE)?,
            collections: open_tree(COLLECTIONS_TREE)?,
            collection_items: open_tree(COLLECTION_ITEMS_TREE)?,
            fixed_tokens: open_tree(FIXED_TOKENS_TREE)?,
            curve_tokens: open_tree(CURVE_TOKENS_TREE)?,
            fixed_notes: open_tree(FIXED_NOTES_TREE)?,
            curve_notes: open_tree(CURVE_NOTES_TREE)?,
            notes_by_inscription: open_tree(NOTES_BY_INSCRIPTION_TREE)?,
            checkpoints: open_tree(CHECKPOINTS_TREE)?,
            db,
        })
    }

    /// Flush to disk.
    pub fn flush(&self) -> IndexerResult<()> {
        self.db.flush().map_err(|e| storage_err("failed to flush db", e))?;
        Ok(())
    }

    fn serialize<T: Serialize>(value: &T) -> IndexerResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| IndexerError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> IndexerResult<T> {
        serde_json::from_slice(bytes).map_err(|e| IndexerError::Serialization(e.to_string()))
    }

    fn token_tree(&self, kind: TokenKind) -> &sled::Tree {
        match kind {
            TokenKind::FixedDenomination => &self.fixed_tokens,
            TokenKind::BondingCurve => &self.curve_tokens,
        }
    }

    fn note_tree(&self, kind: TokenKind) -> &sled::Tree {
        match kind {
            TokenKind::FixedDenomination => &self.fixed_notes,
            TokenKind::BondingCurve => &self.curve_notes,
        }
    }

    fn note_key(tick: &str, note_id: u64) -> Vec<u8> {
        format!("{}|{:016x}", tick, note_id).into_bytes()
    }

    fn item_key(collection_id: &str, item_index: u64) -> Vec<u8> {
        format!("{}|{:016x}", collection_id, item_index).into_bytes()
    }

    /// Key of the per-inscription note index: the payload is the
    /// (kind, tick, note_id) coordinate of the note.
    fn backing_key(inscription_id: &str, kind: TokenKind, tick: &str, note_id: u64) -> Vec<u8> {
        format!("{}|{}|{}|{:016x}", inscription_id, kind, tick, note_id).into_bytes()
    }
}

#[async_trait]
impl IndexStore for SledStore {
    // ==================== Inscriptions ====================

    async fn insert_inscription(&self, inscription: &Inscription) -> IndexerResult<bool> {
        let key = inscription.id.as_bytes();
        let value = Self::serialize(inscription)?;

        let prior = self
            .inscriptions
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))
            .map_err(|e| storage_err("failed to insert inscription", e))?;
        if prior.is_err() {
            return Ok(false);
        }

        if inscription.esip6 {
            let hash_key = inscription.base_hash().as_bytes().to_vec();
            self.esip6_counts
                .update_and_fetch(hash_key, |old| {
                    let count = old
                        .and_then(|b| b.try_into().ok().map(u64::from_be_bytes))
                        .unwrap_or(0);
                    Some((count + 1).to_be_bytes().to_vec())
                })
                .map_err(|e| storage_err("failed to bump esip6 count", e))?;
        }

        let creation_key = format!("{}|{}", inscription.creation_tx, inscription.base_hash());
        self.creations
            .insert(creation_key.as_bytes(), inscription.id.as_bytes())
            .map_err(|e| storage_err("failed to index creation", e))?;

        Ok(true)
    }

    async fn get_inscription(&self, id: &str) -> IndexerResult<Option<Inscription>> {
        match self
            .inscriptions
            .get(id.as_bytes())
            .map_err(|e| storage_err("failed to get inscription", e))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn count_esip6_for_hash(&self, content_hash: &str) -> IndexerResult<u64> {
        Ok(self
            .esip6_counts
            .get(content_hash.as_bytes())
            .map_err(|e| storage_err("failed to read esip6 count", e))?
            .and_then(|b| b.as_ref().try_into().ok().map(u64::from_be_bytes))
            .unwrap_or(0))
    }

    async fn creation_exists(&self, tx_hash: &str, content_hash: &str) -> IndexerResult<bool> {
        let key = format!("{}|{}", tx_hash, content_hash);
        Ok(self
            .creations
            .contains_key(key.as_bytes())
            .map_err(|e| storage_err("failed to probe creations", e))?)
    }

    async fn compare_and_set_owner(
        &self,
        id: &str,
        expected: &str,
        new_owner: &str,
    ) -> IndexerResult<bool> {
        let current = match self
            .inscriptions
            .get(id.as_bytes())
            .map_err(|e| storage_err("failed to get inscription", e))?
        {
            Some(bytes) => bytes,
            None => return Ok(false),
        };

        let mut inscription: Inscription = Self::deserialize(&current)?;
        if inscription.current_owner != expected {
            return Ok(false);
        }
        inscription.current_owner = new_owner.to_string();
        let updated = Self::serialize(&inscription)?;

        let swapped = self
            .inscriptions
            .compare_and_swap(id.as_bytes(), Some(&current[..]), Some(updated))
            .map_err(|e| storage_err("failed to update owner", e))?;
        Ok(swapped.is_ok())
    }

    // ==================== Transfers ====================

    async fn insert_transfer(&self, transfer: &TransferRecord) -> IndexerResult<bool> {
        let key = transfer.dedup_key();
        let value = Self::serialize(transfer)?;

        let prior = self
            .transfers
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value.clone()))
            .map_err(|e| storage_err("failed to insert transfer", e))?;
        if prior.is_err() {
            return Ok(false);
        }

        let index_key = format!(
            "{}|{:016x}|{:016x}|{}",
            transfer.inscription_id,
            transfer.block_number,
            transfer.log_index.unwrap_or(0),
            transfer.tx_hash
        );
        self.transfer_index
            .insert(index_key.as_bytes(), value)
            .map_err(|e| storage_err("failed to index transfer", e))?;
        Ok(true)
    }

    async fn transfers_for(&self, inscription_id: &str) -> IndexerResult<Vec<TransferRecord>> {
        let prefix = format!("{}|", inscription_id);
        let mut transfers = Vec::new();
        for entry in self.transfer_index.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry.map_err(|e| storage_err("failed to scan transfers", e))?;
            transfers.push(Self::deserialize(&value)?);
        }
        Ok(transfers)
    }

    // ==================== Collections ====================

    async fn insert_collection(&self, collection: &Collection) -> IndexerResult<bool> {
        let value = Self::serialize(collection)?;
        let prior = self
            .collections
            .compare_and_swap(
                collection.id.as_bytes(),
                None as Option<&[u8]>,
                Some(value),
            )
            .map_err(|e| storage_err("failed to insert collection", e))?;
        Ok(prior.is_ok())
    }

    async fn get_collection(&self, id: &str) -> IndexerResult<Option<Collection>> {
        match self
            .collections
            .get(id.as_bytes())
            .map_err(|e| storage_err("failed to get collection", e))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn update_collection(&self, collection: &Collection) -> IndexerResult<()> {
        let value = Self::serialize(collection)?;
        self.collections
            .insert(collection.id.as_bytes(), value)
            .map_err(|e| storage_err("failed to update collection", e))?;
        Ok(())
    }

    async fn collection_item_count(&self, collection_id: &str) -> IndexerResult<u64> {
        let prefix = format!("{}|", collection_id);
        Ok(self.collection_items.scan_prefix(prefix.as_bytes()).count() as u64)
    }

    async fn insert_collection_item(&self, item: &CollectionItem) -> IndexerResult<bool> {
        let key = Self::item_key(&item.collection_id, item.item_index);
        let value = Self::serialize(item)?;
        let prior = self
            .collection_items
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))
            .map_err(|e| storage_err("failed to insert collection item", e))?;
        Ok(prior.is_ok())
    }

    // ==================== Tokens ====================

    async fn insert_token(&self, token: &Token) -> IndexerResult<bool> {
        let value = Self::serialize(token)?;
        let prior = self
            .token_tree(token.kind)
            .compare_and_swap(token.tick.as_bytes(), None as Option<&[u8]>, Some(value))
            .map_err(|e| storage_err("failed to insert token", e))?;
        Ok(prior.is_ok())
    }

    async fn get_token(&self, kind: TokenKind, tick: &str) -> IndexerResult<Option<Token>> {
        match self
            .token_tree(kind)
            .get(tick.as_bytes())
            .map_err(|e| storage_err("failed to get token", e))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn update_token(&self, token: &Token) -> IndexerResult<()> {
        let value = Self::serialize(token)?;
        self.token_tree(token.kind)
            .insert(token.tick.as_bytes(), value)
            .map_err(|e| storage_err("failed to update token", e))?;
        Ok(())
    }

    async fn insert_token_note(&self, kind: TokenKind, note: &TokenNote) -> IndexerResult<bool> {
        let key = Self::note_key(&note.tick, note.note_id);
        let value = Self::serialize(note)?;

        let prior = self
            .note_tree(kind)
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))
            .map_err(|e| storage_err("failed to insert token note", e))?;
        if prior.is_err() {
            return Ok(false);
        }

        let backing = Self::backing_key(&note.inscription_id, kind, &note.tick, note.note_id);
        let coord = Self::serialize(&(kind, note.tick.clone(), note.note_id))?;
        self.notes_by_inscription
            .insert(backing, coord)
            .map_err(|e| storage_err("failed to index token note", e))?;
        Ok(true)
    }

    async fn token_note_count(&self, kind: TokenKind, tick: &str) -> IndexerResult<u64> {
        let prefix = format!("{}|", tick);
        Ok(self.note_tree(kind).scan_prefix(prefix.as_bytes()).count() as u64)
    }

    async fn sum_note_amounts(&self, kind: TokenKind, tick: &str) -> IndexerResult<u128> {
        let prefix = format!("{}|", tick);
        let mut sum = 0u128;
        for entry in self.note_tree(kind).scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry.map_err(|e| storage_err("failed to scan notes", e))?;
            let note: TokenNote = Self::deserialize(&value)?;
            sum += note.amount;
        }
        Ok(sum)
    }

    async fn notes_backed_by(
        &self,
        inscription_id: &str,
    ) -> IndexerResult<Vec<(TokenKind, TokenNote)>> {
        let prefix = format!("{}|", inscription_id);
        let mut backed = Vec::new();
        for entry in self.notes_by_inscription.scan_prefix(prefix.as_bytes()) {
            let (_, coord) = entry.map_err(|e| storage_err("failed to scan note index", e))?;
            let (kind, tick, note_id): (TokenKind, String, u64) = Self::deserialize(&coord)?;
            if let Some(bytes) = self
                .note_tree(kind)
                .get(Self::note_key(&tick, note_id))
                .map_err(|e| storage_err("failed to get token note", e))?
            {
                backed.push((kind, Self::deserialize(&bytes)?));
            }
        }
        Ok(backed)
    }

    async fn reassign_note_owner(
        &self,
        inscription_id: &str,
        new_owner: &str,
    ) -> IndexerResult<u64> {
        let backed = self.notes_backed_by(inscription_id).await?;
        let mut updated = 0;
        for (kind, mut note) in backed {
            note.owner = new_owner.to_string();
            let key = Self::note_key(&note.tick, note.note_id);
            let value = Self::serialize(&note)?;
            self.note_tree(kind)
                .insert(key, value)
                .map_err(|e| storage_err("failed to reassign note owner", e))?;
            updated += 1;
        }
        Ok(updated)
    }

    // ==================== Checkpoint ====================

    async fn load_checkpoint(&self, indexer: &str) -> IndexerResult<Option<Checkpoint>> {
        match self
            .checkpoints
            .get(indexer.as_bytes())
            .map_err(|e| storage_err("failed to load checkpoint", e))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> IndexerResult<()> {
        if let Some(existing) = self.load_checkpoint(&checkpoint.indexer).await? {
            if checkpoint.block_number == 0 && existing.block_number > 0 {
                return Err(IndexerError::Checkpoint(format!(
                    "refusing to regress {} from {} to 0",
                    checkpoint.indexer, existing.block_number
                )));
            }
        }
        let value = Self::serialize(checkpoint)?;
        self.checkpoints
            .insert(checkpoint.indexer.as_bytes(), value)
            .map_err(|e| storage_err("failed to save checkpoint", e))?;
        // Checkpoint durability is what crash recovery resumes from.
        self.db
            .flush_async()
            .await
            .map_err(|e| storage_err("failed to flush checkpoint", e))?;
        Ok(())
    }

    // ==================== Stats ====================

    async fn stats(&self) -> IndexerResult<StoreStats> {
        Ok(StoreStats {
            inscriptions: self.inscriptions.len() as u64,
            transfers: self.transfers.len() as u64,
            collections: self.collections.len() as u64,
            collection_items: self.collection_items.len() as u64,
            fixed_tokens: self.fixed_tokens.len() as u64,
            curve_tokens: self.curve_tokens.len() as u64,
            fixed_notes: self.fixed_notes.len() as u64,
            curve_notes: self.curve_notes.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransferKind;

    fn open_temp() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        (dir, store)
    }

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
    async fn test_inscription_roundtrip_and_conflict() {
        let (_dir, store) = open_temp();
        let ins = inscription("0xaa", "0x1", false);
        assert!(store.insert_inscription(&ins).await.unwrap());
        assert!(!store.insert_inscription(&ins).await.unwrap());
        assert_eq!(store.get_inscription("0xaa").await.unwrap().unwrap(), ins);
        assert!(store
            .creation_exists(&ins.creation_tx, "0xaa")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_esip6_counter_tracks_siblings() {
        let (_dir, store) = open_temp();
        store
            .insert_inscription(&inscription("0xaa", "0x1", false))
            .await
            .unwrap();
        assert_eq!(store.count_esip6_for_hash("0xaa").await.unwrap(), 0);

        store
            .insert_inscription(&inscription("0xaa-1", "0x1", true))
            .await
            .unwrap();
        store
            .insert_inscription(&inscription("0xaa-2", "0x1", true))
            .await
            .unwrap();
        assert_eq!(store.count_esip6_for_hash("0xaa").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_owner_cas() {
        let (_dir, store) = open_temp();
        store
            .insert_inscription(&inscription("0xaa", "0x1", false))
            .await
            .unwrap();
        assert!(!store.compare_and_set_owner("0xaa", "0x9", "0x2").await.unwrap());
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
    async fn test_transfer_dedup_and_index() {
        let (_dir, store) = open_temp();
        let transfer = TransferRecord {
            inscription_id: "0xaa".to_string(),
            from: "0x1".to_string(),
            to: "0x2".to_string(),
            tx_hash: "0xt".to_string(),
            block_number: 5,
            timestamp: 50,
            log_index: Some(3),
            contract_address: Some("0xc".to_string()),
            kind: TransferKind::Esip1,
        };
        assert!(store.insert_transfer(&transfer).await.unwrap());
        assert!(!store.insert_transfer(&transfer).await.unwrap());
        assert_eq!(store.transfers_for("0xaa").await.unwrap(), vec![transfer]);
    }

    #[tokio::test]
    async fn test_notes_and_reassignment_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
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
            assert_eq!(store.reassign_note_owner("0xaa", "0x2").await.unwrap(), 1);
            store.flush().unwrap();
        }

        let store = SledStore::open(dir.path()).unwrap();
        let backed = store.notes_backed_by("0xaa").await.unwrap();
        assert_eq!(backed.len(), 1);
        assert_eq!(backed[0].1.owner, "0x2");
        assert_eq!(
            store
                .sum_note_amounts(TokenKind::FixedDenomination, "bsct")
                .await
                .unwrap(),
            100
        );
    }

    #[tokio::test]
    async fn test_checkpoint_persists_and_refuses_regression() {
        let (_dir, store) = open_temp();
        store
            .save_checkpoint(&Checkpoint::new("main", 42))
            .await
            .unwrap();
        assert!(store.save_checkpoint(&Checkpoint::new("main", 0)).await.is_err());
        assert_eq!(
            store
                .load_checkpoint("main")
                .await
                .unwrap()
                .unwrap()
                .block_number,
            42
        );
    }
}
