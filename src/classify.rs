//! Transaction and Log Classification
//!
//! Inspects one transaction or one event log and produces typed intents.
//! Within a block, transaction intents apply in transaction order before
//! any log intent; the materializer relies on that contract.

use crate::codec;
use crate::rpc::{Log, Transaction};
use crate::types::Intent;

/// Event signatures the log classifier keys on.
const SIG_TRANSFER: &str = "ethscriptions_protocol_TransferEthscription(address,bytes32)";
const SIG_TRANSFER_PREV: &str =
    "ethscriptions_protocol_TransferEthscriptionForPreviousOwner(address,address,bytes32)";
const SIG_CREATE: &str = "ethscriptions_protocol_CreateEthscription(address,string)";

/// Stateless classifier with the three topic hashes precomputed.
pub struct Classifier {
    topic_transfer: String,
    topic_transfer_prev: String,
    topic_create: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            topic_transfer: codec::keccak256_hex(SIG_TRANSFER.as_bytes()),
            topic_transfer_prev: codec::keccak256_hex(SIG_TRANSFER_PREV.as_bytes()),
            topic_create: codec::keccak256_hex(SIG_CREATE.as_bytes()),
        }
    }

    /// The topic0 filter handed to `eth_getLogs`.
    pub fn topics(&self) -> Vec<String> {
        vec![
            self.topic_transfer.clone(),
            self.topic_transfer_prev.clone(),
            self.topic_create.clone(),
        ]
    }

    /// Classify one transaction. An empty vector means Ignore; ESIP-5 bulk
    /// payloads produce one transfer intent per 32-byte slice, in order.
    pub fn classify_transaction(&self, tx: &Transaction) -> Vec<Intent> {
        let to = match &tx.to {
            Some(to) => to,
            None => return Vec::new(),
        };

        if &tx.from == to {
            return self
                .classify_create_calldata(&tx.from, &tx.input)
                .into_iter()
                .collect();
        }

        classify_bulk_transfer(&tx.from, to, &tx.input)
    }

    /// Self-transfer calldata: a Create candidate when it decodes to UTF-8
    /// beginning with `data:`.
    fn classify_create_calldata(&self, from: &str, input: &str) -> Option<Intent> {
        let bytes = codec::hex_to_bytes(input).ok()?;
        let uri = codec::to_utf8(&bytes)?;
        if !uri.starts_with("data:") {
            return None;
        }

        // ESIP-6 is detected on the original URI; identity is taken over
        // the ESIP-7 canonical form.
        let esip6 = codec::has_rule_esip6(&uri);
        let canonical = codec::canonicalize_uri(&uri);
        let content_type = codec::parse_data_uri(&canonical)
            .map(|d| d.content_type())
            .unwrap_or_else(|| "text/plain".to_string());

        Some(Intent::Create {
            content_hash: codec::sha256_hex(canonical.as_bytes()),
            content_uri: canonical,
            content_type,
            creator: from.to_string(),
            initial_owner: from.to_string(),
            esip6,
            creator_contract: None,
        })
    }

    /// Classify one event log against the three protocol topics.
    pub fn classify_log(&self, log: &Log) -> Option<Intent> {
        let topic0 = log.topics.first()?;

        if topic0 == &self.topic_transfer {
            // ESIP-1: TransferEthscription(recipient, id)
            let to = codec::topic_to_address(log.topics.get(1)?)?;
            let inscription_id = log.topics.get(2)?.to_lowercase();
            return Some(Intent::ContractTransfer {
                contract: log.address.clone(),
                to,
                inscription_id,
                log_index: log.log_index,
                expected_prev: None,
            });
        }

        if topic0 == &self.topic_transfer_prev {
            // ESIP-2: TransferEthscriptionForPreviousOwner(prev, recipient, id)
            let prev = codec::topic_to_address(log.topics.get(1)?)?;
            let to = codec::topic_to_address(log.topics.get(2)?)?;
            let inscription_id = log.topics.get(3)?.to_lowercase();
            return Some(Intent::ContractTransfer {
                contract: log.address.clone(),
                to,
                inscription_id,
                log_index: log.log_index,
                expected_prev: Some(prev),
            });
        }

        if topic0 == &self.topic_create {
            // ESIP-3: CreateEthscription(initialOwner, contentURI)
            let initial_owner = codec::topic_to_address(log.topics.get(1)?)?;
            let data = codec::hex_to_bytes(&log.data).ok()?;
            let uri = codec::abi_decode_string(&data)?;
            if !uri.starts_with("data:") {
                return None;
            }

            let esip6 = codec::has_rule_esip6(&uri);
            let canonical = codec::canonicalize_uri(&uri);
            let content_type = codec::parse_data_uri(&canonical)
                .map(|d| d.content_type())
                .unwrap_or_else(|| "text/plain".to_string());

            return Some(Intent::Create {
                content_hash: codec::sha256_hex(canonical.as_bytes()),
                content_uri: canonical,
                content_type,
                creator: log.address.clone(),
                initial_owner,
                esip6,
                creator_contract: Some(log.address.clone()),
            });
        }

        None
    }
}

/// ESIP-5: calldata whose hex strips to a positive multiple of 64 is a
/// bulk transfer of 32-byte inscription ids, one intent per slice.
fn classify_bulk_transfer(from: &str, to: &str, input: &str) -> Vec<Intent> {
    let stripped = match input.strip_prefix("0x") {
        Some(s) => s,
        None => return Vec::new(),
    };
    if stripped.is_empty()
        || stripped.len() % 64 != 0
        || !stripped.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Vec::new();
    }

    stripped
        .as_bytes()
        .chunks(64)
        .map(|chunk| Intent::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            // chunks are ASCII hex by the check above
            inscription_id: format!("0x{}", String::from_utf8_lossy(chunk).to_lowercase()),
        })
        .collect()
}
