//! Fungible Token State Machines
//!
//! `erc-20-fixed-denomination` and `erc-20-bonding-curve` share the
//! deploy/mint shape: a deploy fixes `tick`, `max` and the per-note
//! denomination `lim`; every mint creates one token note worth exactly
//! `lim`, bounded by `max`. The bonding-curve variant additionally prices
//! each note as `base_price + price_increment * notes_already_minted` and
//! accumulates that price into `reserve`.

use tracing::debug;

use super::parse_amount;
use crate::error::IndexerResult;
use crate::storage::IndexStore;
use crate::types::{CurveParams, Inscription, Token, TokenKind, TokenNote};

/// Longest accepted tick, after lowercasing.
pub const MAX_TICK_LEN: usize = 28;

/// Apply one token op. `Ok(false)` means the op was dropped.
pub async fn apply<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
    kind: TokenKind,
) -> IndexerResult<bool> {
    let op = match payload.get("op").and_then(|o| o.as_str()) {
        Some(op) => op,
        None => {
            debug!("token payload without op on {}", inscription.id);
            return Ok(false);
        }
    };

    match op {
        "deploy" => deploy(store, inscription, payload, kind).await,
        "mint" => mint(store, inscription, payload, kind).await,
        other => {
            debug!("unknown token op {} on {}", other, inscription.id);
            Ok(false)
        }
    }
}

/// Validate and normalize a tick: lowercased, non-empty, at most
/// `MAX_TICK_LEN` characters.
fn normalize_tick(payload: &serde_json::Value) -> Option<String> {
    let tick = payload.get("tick")?.as_str()?.to_lowercase();
    if tick.is_empty() || tick.chars().count() > MAX_TICK_LEN {
        return None;
    }
    Some(tick)
}

async fn deploy<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
    kind: TokenKind,
) -> IndexerResult<bool> {
    let tick = match normalize_tick(payload) {
        Some(tick) => tick,
        None => {
            debug!("deploy with invalid tick on {}", inscription.id);
            return Ok(false);
        }
    };
    let max = payload.get("max").and_then(parse_amount).unwrap_or(0);
    let lim = payload.get("lim").and_then(parse_amount).unwrap_or(0);
    if max == 0 || lim == 0 || max % lim != 0 {
        debug!(
            "deploy {} with invalid supply max={} lim={}",
            tick, max, lim
        );
        return Ok(false);
    }

    let curve = match kind {
        TokenKind::FixedDenomination => None,
        TokenKind::BondingCurve => {
            let base_price = payload.get("base_price").and_then(parse_amount);
            let price_increment = payload.get("price_increment").and_then(parse_amount);
            match (base_price, price_increment) {
                (Some(base_price), Some(price_increment)) => Some(CurveParams {
                    base_price,
                    price_increment,
                    reserve: 0,
                }),
                _ => {
                    debug!("curve deploy {} without pricing", tick);
                    return Ok(false);
                }
            }
        }
    };

    let token = Token {
        tick: tick.clone(),
        kind,
        max_supply: max,
        denomination: lim,
        minted: 0,
        curve,
        deploy_inscription_id: inscription.id.clone(),
    };

    if !store.insert_token(&token).await? {
        debug!("tick {} already deployed", tick);
        return Ok(false);
    }
    Ok(true)
}

async fn mint<S: IndexStore + ?Sized>(
    store: &S,
    inscription: &Inscription,
    payload: &serde_json::Value,
    kind: TokenKind,
) -> IndexerResult<bool> {
    let tick = match normalize_tick(payload) {
        Some(tick) => tick,
        None => {
            debug!("mint with invalid tick on {}", inscription.id);
            return Ok(false);
        }
    };
    let mut token = match store.get_token(kind, &tick).await? {
        Some(token) => token,
        None => {
            debug!("mint of undeployed tick {}", tick);
            return Ok(false);
        }
    };

    // `amt` defaults to the denomination and must equal it exactly.
    let amt = match payload.get("amt") {
        Some(value) => match parse_amount(value) {
            Some(amt) => amt,
            None => {
                debug!("mint {} with unparseable amt", tick);
                return Ok(false);
            }
        },
        None => token.denomination,
    };
    if amt != token.denomination {
        debug!(
            "mint {} with amt {} != lim {}",
            tick, amt, token.denomination
        );
        return Ok(false);
    }
    if token.minted + amt > token.max_supply {
        debug!(
            "mint {} over supply: {} + {} > {}",
            tick, token.minted, amt, token.max_supply
        );
        return Ok(false);
    }

    let notes_before = store.token_note_count(kind, &tick).await?;
    let note = TokenNote {
        tick: tick.clone(),
        note_id: notes_before + 1,
        inscription_id: inscription.id.clone(),
        // The backing inscription's owner, so invariant (6) holds even for
        // ESIP-3 creations whose initial owner differs from the creator.
        owner: inscription.current_owner.clone(),
        amount: amt,
    };
    if !store.insert_token_note(kind, &note).await? {
        debug!("note {}/{} already exists", tick, note.note_id);
        return Ok(false);
    }

    token.minted += amt;
    if let Some(curve) = token.curve.as_mut() {
        curve.reserve += curve.base_price + curve.price_increment * u128::from(notes_before);
    }
    store.update_token(&token).await?;
    Ok(true)
}
