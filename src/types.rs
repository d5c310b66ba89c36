//! Domain Types
//!
//! Entities materialized into the store, plus the typed intents the
//! classifier produces from raw transactions and event logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An indexed inscription. Content itself is never persisted; only the
/// metadata and the content-addressed identity survive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inscription {
    /// Content-addressed id: `0x` + lowercase SHA-256 of the canonical
    /// data URI, suffixed `-N` for ESIP-6 opt-in duplicates
    pub id: String,
    /// MIME type parsed from the payload (`text/plain` when absent)
    pub content_type: String,
    /// Creating EOA, or the emitting contract for ESIP-3 creations
    pub creator: String,
    /// The only mutable field
    pub current_owner: String,
    pub creation_tx: String,
    pub creation_block: u64,
    pub creation_timestamp: u64,
    /// Payload opted into non-uniqueness via `rule=esip6`
    pub esip6: bool,
    /// 1-based position among ESIP-6 siblings sharing the base hash
    pub esip6_sequence: Option<u64>,
    pub created_by_contract: bool,
    pub creator_contract: Option<String>,
}

impl Inscription {
    /// Base content hash of the id, with any ESIP-6 suffix stripped.
    pub fn base_hash(&self) -> &str {
        match self.id.find('-') {
            Some(pos) => &self.id[..pos],
            None => &self.id,
        }
    }
}

/// How a transfer reached the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Calldata transfer signed by the current owner
    Eoa,
    /// `TransferEthscription` contract event
    Esip1,
    /// `TransferEthscriptionForPreviousOwner` contract event
    Esip2,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eoa => write!(f, "eoa"),
            Self::Esip1 => write!(f, "esip1"),
            Self::Esip2 => write!(f, "esip2"),
        }
    }
}

/// Append-only transfer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub inscription_id: String,
    pub from: String,
    pub to: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub timestamp: u64,
    /// Present for contract-emitted transfers
    pub log_index: Option<u64>,
    /// Emitting contract for contract-emitted transfers
    pub contract_address: Option<String>,
    pub kind: TransferKind,
}

impl TransferRecord {
    /// Uniqueness key; replaying a block re-derives the same key, which is
    /// what makes ESIP-1 transfers (no owner check) safe to re-apply.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.tx_hash,
            self.inscription_id,
            self.log_index.map(|i| i.to_string()).unwrap_or_default()
        )
    }
}

/// A registered collection. `id` is the registering inscription's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub max_supply: u64,
    pub owner: String,
    /// Once locked, all owner mutations are rejected forever
    pub locked: bool,
}

/// One item of a collection. `item_index` is dense and 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub collection_id: String,
    pub item_index: u64,
    pub inscription_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub attributes: Option<serde_json::Value>,
}

/// Token family, selecting which logical table a tick lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    FixedDenomination,
    BondingCurve,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedDenomination => write!(f, "fixed"),
            Self::BondingCurve => write!(f, "curve"),
        }
    }
}

/// Bonding-curve pricing state; absent on fixed-denomination tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveParams {
    pub base_price: u128,
    pub price_increment: u128,
    pub reserve: u128,
}

/// A deployed fungible token.
///
/// Invariants: `max_supply % denomination == 0`, `minted <= max_supply`,
/// and `minted` is always a multiple of `denomination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub tick: String,
    pub kind: TokenKind,
    pub max_supply: u128,
    pub denomination: u128,
    pub minted: u128,
    pub curve: Option<CurveParams>,
    pub deploy_inscription_id: String,
}

/// One minted note: a transferable inscription carrying a fixed
/// denomination of a tick. `owner` mirrors the backing inscription's
/// `current_owner` at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenNote {
    pub tick: String,
    pub note_id: u64,
    pub inscription_id: String,
    pub owner: String,
    pub amount: u128,
}

/// Persisted resume position, upserted once per batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub indexer: String,
    pub block_number: u64,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(indexer: &str, block_number: u64) -> Self {
        Self {
            indexer: indexer.to_string(),
            block_number,
            updated_at: Utc::now(),
        }
    }
}

/// A typed action derived from one transaction or one log.
///
/// The classifier emits these; the materializer applies them in strict
/// block order, transaction intents before log intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// New inscription from self-transfer calldata or an ESIP-3 event
    Create {
        /// Canonical data URI (ESIP-7 gzip already stripped)
        content_uri: String,
        /// `0x` + lowercase SHA-256 of the canonical URI
        content_hash: String,
        content_type: String,
        creator: String,
        initial_owner: String,
        esip6: bool,
        /// Emitting contract when created via ESIP-3
        creator_contract: Option<String>,
    },
    /// Calldata transfer (one slice of an ESIP-5 bulk payload, or k = 1)
    Transfer {
        from: String,
        to: String,
        inscription_id: String,
    },
    /// Contract-emitted transfer (ESIP-1 or ESIP-2)
    ContractTransfer {
        contract: String,
        to: String,
        inscription_id: String,
        log_index: u64,
        /// ESIP-2 carries the owner the contract believes it escrowed for;
        /// the transfer is dropped unless this matches exactly
        expected_prev: Option<String>,
    },
}

/// Provenance shared by every intent of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxContext {
    pub tx_hash: String,
    pub block_number: u64,
    pub timestamp: u64,
}
