//! Collection State Machine
//!
//! `erc-721-ethscriptions-collection` operations. A collection is
//! registered by an inscription and keyed by that inscription's id; the
//! registering creator owns it and stays in control until `lock_collection`
//! freezes it for good. Item indices are dense and 1-based, bounded by
//! `max_supply`.

use serde::Deserialize;
use tracing::debug;

use super::parse_amount;
use crate::error::IndexerResult;
use crate::storage::IndexStore;
use crate::types::{Collection, CollectionItem, Inscription};

/// Item metadata carried by `create_collection_and_add_self` / `add`.
#[derive(Debug, Clone, Default, Deserialize)]
struct ItemPayload {
    name: Option<String>,
    description: Option<String>,
    attributes: Option<serde_json::Value>,
}

/// Apply one collection op. `Ok(false)` means the op was dropped.
pub async fn apply<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
) -> IndexerResult<bool> {
    let op = match payload.get("op").and_then(|o| o.as_str()) {
        Some(op) => op,
        None => {
            debug!("collection payload without op on {}", inscription.id);
            return Ok(false);
        }
    };

    match op {
        "create" => create(store, inscription, payload, false).await,
        "create_collection_and_add_self" => create(store, inscription, payload, true).await,
        "add_self_to_collection" | "add" => add_item(store, inscription, payload).await,
        "edit_collection" => edit(store, inscription, payload).await,
        "lock_collection" => lock(store, inscription, payload).await,
        "transfer_ownership" => transfer_ownership(store, inscription, payload).await,
        other => {
            debug!("unknown collection op {} on {}", other, inscription.id);
            Ok(false)
        }
    }
}

async fn create<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
    add_self: bool,
) -> IndexerResult<bool> {
    let name = match payload.get("name").and_then(|n| n.as_str()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            debug!("collection create without name on {}", inscription.id);
            return Ok(false);
        }
    };
    let max_supply = match payload.get("max_supply").and_then(parse_amount_u64) {
        Some(max) if max > 0 => max,
        _ => {
            debug!("collection create with bad max_supply on {}", inscription.id);
            return Ok(false);
        }
    };

    let collection = Collection {
        id: inscription.id.clone(),
        name,
        symbol: payload
            .get("symbol")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string(),
        description: payload
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or_default()
            .to_string(),
        max_supply,
        owner: inscription.creator.clone(),
        locked: false,
    };

    if !store.insert_collection(&collection).await? {
        debug!("collection {} already registered", collection.id);
        return Ok(false);
    }

    if add_self {
        let item = item_from_payload(payload, &collection.id, 1, &inscription.id);
        store.insert_collection_item(&item).await?;
    }
    Ok(true)
}

async fn add_item<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
) -> IndexerResult<bool> {
    let collection_id = match payload.get("collection_id").and_then(|c| c.as_str()) {
        Some(id) => id,
        None => {
            debug!("collection add without collection_id on {}", inscription.id);
            return Ok(false);
        }
    };

    let collection = match store.get_collection(collection_id).await? {
        Some(c) if !c.locked => c,
        Some(_) => {
            debug!("collection {} is locked, dropping add", collection_id);
            return Ok(false);
        }
        None => {
            debug!("collection {} not found, dropping add", collection_id);
            return Ok(false);
        }
    };

    let next_index = store.collection_item_count(collection_id).await? + 1;
    if next_index > collection.max_supply {
        debug!(
            "collection {} is full ({}/{}), dropping add",
            collection_id,
            next_index - 1,
            collection.max_supply
        );
        return Ok(false);
    }

    let item = item_from_payload(payload, collection_id, next_index, &inscription.id);
    Ok(store.insert_collection_item(&item).await?)
}

async fn edit<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
) -> IndexerResult<bool> {
    let mut collection = match owned_unlocked(store, inscription, payload).await? {
        Some(c) => c,
        None => return Ok(false),
    };

    // Partial metadata update: absent fields are untouched.
    if let Some(name) = payload.get("name").and_then(|n| n.as_str()) {
        collection.name = name.to_string();
    }
    if let Some(symbol) = payload.get("symbol").and_then(|s| s.as_str()) {
        collection.symbol = symbol.to_string();
    }
    if let Some(description) = payload.get("description").and_then(|d| d.as_str()) {
        collection.description = description.to_string();
    }

    store.update_collection(&collection).await?;
    Ok(true)
}

async fn lock<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
) -> IndexerResult<bool> {
    let mut collection = match owned_unlocked(store, inscription, payload).await? {
        Some(c) => c,
        None => return Ok(false),
    };

    collection.locked = true;
    store.update_collection(&collection).await?;
    Ok(true)
}

async fn transfer_ownership<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
) -> IndexerResult<bool> {
    let new_owner = match payload.get("new_owner").and_then(|o| o.as_str()) {
        Some(owner) if !owner.is_empty() => owner.to_lowercase(),
        _ => {
            debug!("ownership transfer without new_owner on {}", inscription.id);
            return Ok(false);
        }
    };

    let mut collection = match owned_unlocked(store, inscription, payload).await? {
        Some(c) => c,
        None => return Ok(false),
    };

    collection.owner = new_owner;
    store.update_collection(&collection).await?;
    Ok(true)
}

/// Shared guard for owner-gated ops: the collection must exist, be
/// unlocked, and be owned by the op inscription's creator.
async fn owned_unlocked<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
) -> IndexerResult<Option<Collection>> {
    let collection_id = match payload.get("collection_id").and_then(|c| c.as_str()) {
        Some(id) => id,
        None => {
            debug!("collection op without collection_id on {}", inscription.id);
            return Ok(None);
        }
    };
    let collection = match store.get_collection(collection_id).await? {
        Some(c) => c,
        None => {
            debug!("collection {} not found", collection_id);
            return Ok(None);
        }
    };
    if collection.locked {
        debug!("collection {} is locked", collection_id);
        return Ok(None);
    }
    if collection.owner != inscription.creator {
        debug!(
            "collection {} owner gate failed for {}",
            collection_id, inscription.creator
        );
        return Ok(None);
    }
    Ok(Some(collection))
}

fn item_from_payload(
    payload: &serde_json::Value,
    collection_id: &str,
    item_index: u64,
    inscription_id: &str,
) -> CollectionItem {
    let meta: ItemPayload = payload
        .get("item")
        .and_then(|i| serde_json::from_value(i.clone()).ok())
        .unwrap_or_default();

    CollectionItem {
        collection_id: collection_id.to_string(),
        item_index,
        inscription_id: inscription_id.to_string(),
        name: meta.name,
        description: meta.description,
        attributes: meta.attributes,
    }
}

fn parse_amount_u64(value: &serde_json::Value) -> Option<u64> {
    parse_amount(value).and_then(|v| u64::try_from(v).ok())
}
