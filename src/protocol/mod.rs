//! Protocol Handler
//!
//! JSON-payload inscriptions carry a protocol tag `p` selecting a
//! sub-state-machine. Dispatch happens only after the inscription row
//! itself was inserted; a failed protocol op never unwinds the parent
//! inscription. All ops are best effort: validation failures are logged
//! and dropped without aborting block processing.

pub mod collection;
pub mod token;

use std::sync::Arc;
use tracing::debug;

use crate::codec;
use crate::error::IndexerResult;
use crate::metrics::IndexerMetrics;
use crate::storage::IndexStore;
use crate::types::{Inscription, TokenKind};

/// Protocol tags dispatched on.
pub const COLLECTION_PROTOCOL: &str = "erc-721-ethscriptions-collection";
pub const FIXED_TOKEN_PROTOCOL: &str = "erc-20-fixed-denomination";
pub const CURVE_TOKEN_PROTOCOL: &str = "erc-20-bonding-curve";

/// Dispatches JSON-payload inscriptions to their protocol state machines.
pub struct ProtocolHandler {
    metrics: Arc<IndexerMetrics>,
}

impl ProtocolHandler {
    pub fn new(metrics: Arc<IndexerMetrics>) -> Self {
        Self { metrics }
    }

    /// Inspect a freshly created inscription and run its protocol op, if
    /// any. Non-JSON payloads and unknown tags are not protocol ops.
    pub async fn handle_create<S: IndexStore + ?Sized>(
        &self,
        store: &S,
        inscription: &Inscription,
        content_uri: &str,
    ) -> IndexerResult<()> {
        let payload = match protocol_payload(content_uri) {
            Some(p) => p,
            None => return Ok(()),
        };
        let tag = match payload.get("p").and_then(|p| p.as_str()) {
            Some(tag) => tag,
            None => return Ok(()),
        };

        let applied = match tag {
            COLLECTION_PROTOCOL => collection::apply(store, inscription, &payload).await?,
            FIXED_TOKEN_PROTOCOL => {
                token::apply(store, inscription, &payload, TokenKind::FixedDenomination).await?
            }
            CURVE_TOKEN_PROTOCOL => {
                token::apply(store, inscription, &payload, TokenKind::BondingCurve).await?
            }
            other => {
                debug!("unknown protocol tag {} on {}", other, inscription.id);
                return Ok(());
            }
        };

        if applied {
            self.metrics.protocol_op_applied();
        } else {
            self.metrics.protocol_op_dropped();
        }
        Ok(())
    }
}

/// Extract the JSON payload of a `data:application/json[...]` inscription.
fn protocol_payload(content_uri: &str) -> Option<serde_json::Value> {
    let uri = codec::parse_data_uri(content_uri)?;
    if uri.content_type() != "application/json" {
        return None;
    }
    let bytes = uri.body_bytes()?;
    serde_json::from_slice(&bytes).ok()
}

/// Parse a protocol amount, which the wire encodes as a decimal string
/// (`"1000"`) but tolerant producers emit as a bare number.
pub(crate) fn parse_amount(value: &serde_json::Value) -> Option<u128> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64().map(u128::from),
        _ => None,
    }
}
