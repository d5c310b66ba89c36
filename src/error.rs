//! Indexer Error Types
//!
//! Error definitions for RPC transport, decoding and store operations.

use thiserror::Error;

/// Indexer Error
#[derive(Error, Debug)]
pub enum IndexerError {
    /// RPC connection error
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    /// RPC request error
    #[error("RPC request failed: {0}")]
    RpcRequest(String),

    /// RPC response error
    #[error("RPC response error: {message}")]
    RpcResponse { code: i64, message: String },

    /// Endpoint rate limited (HTTP 429 or RPC error code 429)
    #[error("RPC endpoint rate limited: {0}")]
    RateLimited(String),

    /// Every configured endpoint failed for one call
    #[error("all {endpoints} RPC endpoints exhausted for {call}: {last_error}")]
    EndpointsExhausted {
        endpoints: usize,
        call: String,
        last_error: String,
    },

    /// Calldata / payload decoding error
    #[error("decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Checkpoint regression or other invalid checkpoint write
    #[error("invalid checkpoint write: {0}")]
    Checkpoint(String),
}

/// Indexer Result type
pub type IndexerResult<T> = Result<T, IndexerError>;

impl From<reqwest::Error> for IndexerError {
    fn from(e: reqwest::Error) -> Self {
        IndexerError::RpcConnection(e.to_string())
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        IndexerError::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for IndexerError {
    fn from(e: hex::FromHexError) -> Self {
        IndexerError::Decode(format!("Hex decode error: {}", e))
    }
}

impl IndexerError {
    /// True when the error should rotate the pool to the next endpoint
    /// without consuming further retries on the current one.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            IndexerError::RateLimited(_) | IndexerError::RpcResponse { code: 429, .. }
        )
    }
}
