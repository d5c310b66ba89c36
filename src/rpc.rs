//! JSON-RPC Client and Endpoint Pool
//!
//! One `RpcClient` per configured endpoint, wrapped by `RpcPool` which walks
//! the endpoint list on failure. A rate-limited response (HTTP 429 or RPC
//! error code 429) rotates to the next endpoint immediately without
//! consuming further retries; other errors retry with linear-factor backoff
//! before rotating. The pool is bound to a fixed chain id (static-network
//! mode) so no per-call chain-id probe can hang against a degraded endpoint.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::codec;
use crate::config::RpcConfig;
use crate::error::{IndexerError, IndexerResult};

/// JSON-RPC request envelope
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    error: Option<RpcErrorBody>,
    #[allow(dead_code)]
    id: Option<u64>,
}

/// JSON-RPC error body
#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// A transaction as returned by `eth_getBlockByNumber` with full objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    /// Absent for contract-creation transactions
    pub to: Option<String>,
    /// `0x`-prefixed calldata
    pub input: String,
}

/// A fetched block with its transactions in chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

/// One event log from `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub tx_hash: String,
    pub log_index: u64,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    hash: String,
    from: String,
    to: Option<String>,
    input: String,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    number: String,
    timestamp: String,
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    #[serde(rename = "logIndex")]
    log_index: String,
}

impl TryFrom<RawBlock> for Block {
    type Error = IndexerError;

    fn try_from(raw: RawBlock) -> IndexerResult<Self> {
        Ok(Block {
            number: codec::parse_quantity(&raw.number)?,
            timestamp: codec::parse_quantity(&raw.timestamp)?,
            transactions: raw
                .transactions
                .into_iter()
                .map(|t| Transaction {
                    hash: t.hash.to_lowercase(),
                    from: t.from.to_lowercase(),
                    to: t.to.map(|a| a.to_lowercase()),
                    input: t.input,
                })
                .collect(),
        })
    }
}

impl TryFrom<RawLog> for Log {
    type Error = IndexerError;

    fn try_from(raw: RawLog) -> IndexerResult<Self> {
        Ok(Log {
            address: raw.address.to_lowercase(),
            topics: raw.topics.into_iter().map(|t| t.to_lowercase()).collect(),
            data: raw.data,
            tx_hash: raw.transaction_hash.to_lowercase(),
            log_index: codec::parse_quantity(&raw.log_index)?,
        })
    }
}

/// One JSON-RPC endpoint.
pub struct RpcClient {
    client: Client,
    url: String,
    request_id: std::sync::atomic::AtomicU64,
}

impl RpcClient {
    pub fn new(url: &str, timeout_secs: u64) -> IndexerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| IndexerError::RpcConnection(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            request_id: std::sync::atomic::AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make an RPC call, returning the raw `result` value. An explicit JSON
    /// `null` result is preserved (callers use it for not-yet-mined blocks).
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> IndexerResult<serde_json::Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!("RPC call: {} id={} url={}", method, id, self.url);

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexerError::RpcConnection(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(IndexerError::RateLimited(format!("HTTP 429 from {}", self.url)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexerError::RpcRequest(format!("HTTP {} - {}", status, body)));
        }

        let rpc_response: RpcResponse = response
            .json()
            .await
            .map_err(|e| IndexerError::RpcRequest(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(IndexerError::RpcResponse {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc_response.result)
    }
}

/// Hex block tag for positional params.
fn block_tag(n: u64) -> String {
    format!("0x{:x}", n)
}

/// Ordered endpoint pool with failover.
pub struct RpcPool {
    clients: Vec<RpcClient>,
    current: AtomicUsize,
    chain_id: u64,
    max_retries: u32,
    backoff_base: Duration,
    rotations: AtomicUsize,
}

impl RpcPool {
    pub fn new(config: &RpcConfig) -> IndexerResult<Self> {
        if config.urls.is_empty() {
            return Err(IndexerError::Configuration(
                "RPC pool requires at least one endpoint".to_string(),
            ));
        }

        let clients = config
            .urls
            .iter()
            .map(|url| RpcClient::new(url, config.timeout_secs))
            .collect::<IndexerResult<Vec<_>>>()?;

        Ok(Self {
            clients,
            current: AtomicUsize::new(0),
            chain_id: config.chain_id,
            max_retries: config.max_retries.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            rotations: AtomicUsize::new(0),
        })
    }

    /// The chain id every endpoint is assumed to serve.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn endpoint_count(&self) -> usize {
        self.clients.len()
    }

    /// Index of the endpoint the next call starts at.
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Total endpoint rotations since construction.
    pub fn rotation_count(&self) -> usize {
        self.rotations.load(Ordering::SeqCst)
    }

    /// Run one logical call with retries and failover across the pool.
    async fn call_with_failover(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> IndexerResult<serde_json::Value> {
        let start = self.current.load(Ordering::SeqCst);
        let n = self.clients.len();
        let mut last_error: Option<IndexerError> = None;

        for offset in 0..n {
            let idx = (start + offset) % n;
            let client = &self.clients[idx];

            let mut attempt = 1u32;
            loop {
                match client.call(method, params.clone()).await {
                    Ok(value) => {
                        self.current.store(idx, Ordering::SeqCst);
                        return Ok(value);
                    }
                    Err(e) if e.is_rate_limit() => {
                        // Rotate immediately; retries stay unconsumed.
                        warn!("endpoint {} rate limited, rotating", client.url());
                        self.rotations.fetch_add(1, Ordering::SeqCst);
                        last_error = Some(e);
                        break;
                    }
                    Err(e) => {
                        if attempt >= self.max_retries {
                            warn!(
                                "endpoint {} failed {} after {} attempts: {}",
                                client.url(),
                                method,
                                attempt,
                                e
                            );
                            self.rotations.fetch_add(1, Ordering::SeqCst);
                            last_error = Some(e);
                            break;
                        }
                        debug!(
                            "endpoint {} attempt {} failed: {}, backing off",
                            client.url(),
                            attempt,
                            e
                        );
                        tokio::time::sleep(self.backoff_base * attempt).await;
                        attempt += 1;
                    }
                }
            }
        }

        Err(IndexerError::EndpointsExhausted {
            endpoints: n,
            call: method.to_string(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no endpoints tried".to_string()),
        })
    }

    /// Current head block number.
    pub async fn get_head(&self) -> IndexerResult<u64> {
        let value = self
            .call_with_failover("eth_blockNumber", serde_json::json!([]))
            .await?;
        let tag: String = serde_json::from_value(value)?;
        codec::parse_quantity(&tag)
    }

    /// Fetch a block with full transaction objects. `Ok(None)` when the
    /// block has not been produced yet.
    pub async fn get_block(&self, number: u64) -> IndexerResult<Option<Block>> {
        let value = self
            .call_with_failover(
                "eth_getBlockByNumber",
                serde_json::json!([block_tag(number), true]),
            )
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let raw: RawBlock = serde_json::from_value(value)?;
        Ok(Some(raw.try_into()?))
    }

    /// Fetch the logs of one block whose topic0 is any of `topics`,
    /// ordered by log index.
    pub async fn get_logs(&self, number: u64, topics: &[String]) -> IndexerResult<Vec<Log>> {
        let filter = serde_json::json!({
            "fromBlock": block_tag(number),
            "toBlock": block_tag(number),
            "topics": [topics],
        });
        let value = self
            .call_with_failover("eth_getLogs", serde_json::json!([filter]))
            .await?;
        let raw: Vec<RawLog> = serde_json::from_value(value)?;
        let mut logs = raw
            .into_iter()
            .map(Log::try_from)
            .collect::<IndexerResult<Vec<_>>>()?;
        logs.sort_by_key(|l| l.log_index);
        Ok(logs)
    }
}
