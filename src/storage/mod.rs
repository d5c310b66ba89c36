//! Store Interface
//!
//! The relational surface the materializer writes through. Inserts that
//! enforce a uniqueness key report conflicts as `Ok(false)` so callers can
//! absorb duplicates without treating them as failures; the owner update is
//! compare-and-set so a stale transfer can never clobber a newer owner.

pub mod memory;
pub mod sled;

use async_trait::async_trait;

use crate::error::IndexerResult;
use crate::types::{
    Checkpoint, Collection, CollectionItem, Inscription, Token, TokenKind, TokenNote,
    TransferRecord,
};

/// Store operations the block-processing core needs; read-only API
/// consumers see the same tables but are out of scope here.
#[async_trait]
pub trait IndexStore: Send + Sync {
    // ==================== Inscriptions ====================

    /// Insert an inscription. `Ok(false)` when the id is already taken.
    async fn insert_inscription(&self, inscription: &Inscription) -> IndexerResult<bool>;

    /// Fetch an inscription by id.
    async fn get_inscription(&self, id: &str) -> IndexerResult<Option<Inscription>>;

    /// Number of ESIP-6 inscriptions whose base hash equals `content_hash`.
    /// The next sibling takes sequence `count + 1`.
    async fn count_esip6_for_hash(&self, content_hash: &str) -> IndexerResult<u64>;

    /// True when `tx_hash` already produced an inscription with this base
    /// hash; makes ESIP-6 creates idempotent across block re-runs.
    async fn creation_exists(&self, tx_hash: &str, content_hash: &str) -> IndexerResult<bool>;

    /// Compare-and-set the owner. `Ok(false)` when the inscription is
    /// missing or its owner is not `expected`.
    async fn compare_and_set_owner(
        &self,
        id: &str,
        expected: &str,
        new_owner: &str,
    ) -> IndexerResult<bool>;

    // ==================== Transfers ====================

    /// Append a transfer. `Ok(false)` when its dedup key
    /// `(tx_hash, inscription_id, log_index)` was already recorded.
    async fn insert_transfer(&self, transfer: &TransferRecord) -> IndexerResult<bool>;

    /// All transfers of one inscription, oldest first.
    async fn transfers_for(&self, inscription_id: &str) -> IndexerResult<Vec<TransferRecord>>;

    // ==================== Collections ====================

    /// Insert a collection. `Ok(false)` when the id is already registered.
    async fn insert_collection(&self, collection: &Collection) -> IndexerResult<bool>;

    async fn get_collection(&self, id: &str) -> IndexerResult<Option<Collection>>;

    /// Overwrite a collection row (owner-gated edits, lock, ownership).
    async fn update_collection(&self, collection: &Collection) -> IndexerResult<()>;

    /// Current number of items; the next dense index is `count + 1`.
    async fn collection_item_count(&self, collection_id: &str) -> IndexerResult<u64>;

    /// Insert an item. `Ok(false)` on a `(collection_id, item_index)` clash.
    async fn insert_collection_item(&self, item: &CollectionItem) -> IndexerResult<bool>;

    // ==================== Tokens ====================

    /// Insert a token. `Ok(false)` when the tick is already deployed in
    /// that kind's table.
    async fn insert_token(&self, token: &Token) -> IndexerResult<bool>;

    async fn get_token(&self, kind: TokenKind, tick: &str) -> IndexerResult<Option<Token>>;

    /// Overwrite a token row (minted / reserve bookkeeping).
    async fn update_token(&self, token: &Token) -> IndexerResult<()>;

    /// Insert a note. `Ok(false)` on a `(tick, note_id)` clash.
    async fn insert_token_note(&self, kind: TokenKind, note: &TokenNote) -> IndexerResult<bool>;

    /// Current number of notes for a tick; the next dense id is `count + 1`.
    async fn token_note_count(&self, kind: TokenKind, tick: &str) -> IndexerResult<u64>;

    /// Sum of note amounts for a tick (invariant: equals `minted`).
    async fn sum_note_amounts(&self, kind: TokenKind, tick: &str) -> IndexerResult<u128>;

    /// Notes backed by one inscription, across both token tables.
    async fn notes_backed_by(
        &self,
        inscription_id: &str,
    ) -> IndexerResult<Vec<(TokenKind, TokenNote)>>;

    /// Mirror a new inscription owner into every backing note (both
    /// tables). Returns the number of notes updated.
    async fn reassign_note_owner(
        &self,
        inscription_id: &str,
        new_owner: &str,
    ) -> IndexerResult<u64>;

    // ==================== Checkpoint ====================

    async fn load_checkpoint(&self, indexer: &str) -> IndexerResult<Option<Checkpoint>>;

    /// Upsert the checkpoint. Writes that would regress a positive
    /// position to 0 are refused.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> IndexerResult<()>;

    // ==================== Stats ====================

    async fn stats(&self) -> IndexerResult<StoreStats>;
}

/// Store row counts for the status command and batch logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub inscriptions: u64,
    pub transfers: u64,
    pub collections: u64,
    pub collection_items: u64,
    pub fixed_tokens: u64,
    pub curve_tokens: u64,
    pub fixed_notes: u64,
    pub curve_notes: u64,
}

pub use self::sled::SledStore;
pub use memory::MemoryStore;
