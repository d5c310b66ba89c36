//! Indexer Configuration
//!
//! Configuration for the RPC endpoint pool, batch processing and storage.
//! Supports loading from environment variables with ETHSCRIPTIONS_ prefix.

use serde::{Deserialize, Serialize};
use std::env;

/// RPC pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Ordered list of JSON-RPC endpoint URLs; failover walks this order
    pub urls: Vec<String>,
    /// Fixed chain identifier bound to every client (static-network mode,
    /// no per-call chain-id probe)
    pub chain_id: u64,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Retries per endpoint before rotating (rate limits rotate immediately)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base in milliseconds; attempt N sleeps N * base
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    500
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            urls: vec!["https://mainnet.base.org".to_string()],
            chain_id: 8453,
            timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

impl RpcConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - ETHSCRIPTIONS_RPC_URLS: comma-separated endpoint URLs
    /// - ETHSCRIPTIONS_CHAIN_ID: chain identifier
    /// - ETHSCRIPTIONS_RPC_TIMEOUT: request timeout in seconds
    /// - ETHSCRIPTIONS_RPC_MAX_RETRIES: retries per endpoint
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let urls = env::var("ETHSCRIPTIONS_RPC_URLS")
            .map(|s| {
                s.split(',')
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .collect::<Vec<_>>()
            })
            .ok()
            .filter(|urls: &Vec<String>| !urls.is_empty())
            .unwrap_or(defaults.urls);

        Self {
            urls,
            chain_id: env::var("ETHSCRIPTIONS_CHAIN_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.chain_id),
            timeout_secs: env::var("ETHSCRIPTIONS_RPC_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            max_retries: env::var("ETHSCRIPTIONS_RPC_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            backoff_base_ms: env::var("ETHSCRIPTIONS_RPC_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backoff_base_ms),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory for the sled store; empty selects the in-memory store
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./ethscriptions_data".to_string(),
        }
    }
}

impl StorageConfig {
    /// Create a test configuration (in-memory store)
    pub fn test() -> Self {
        Self {
            data_dir: String::new(),
        }
    }
}

/// Indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// RPC pool configuration
    pub rpc: RpcConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Blocks per processing batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Parallel block fetches within a batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Override starting block; otherwise resume from the checkpoint
    #[serde(default)]
    pub start_block: Option<u64>,
    /// Sleep between head polls once caught up, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Checkpoint row key; allows several indexers to share a store
    #[serde(default = "default_indexer_name")]
    pub indexer_name: String,
}

fn default_batch_size() -> u64 {
    25
}

fn default_concurrency() -> usize {
    8
}

fn default_poll_interval() -> u64 {
    500
}

fn default_indexer_name() -> String {
    "ethscriptions".to_string()
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            storage: StorageConfig::default(),
            batch_size: 25,
            concurrency: 8,
            start_block: None,
            poll_interval_ms: 500,
            indexer_name: "ethscriptions".to_string(),
        }
    }
}

impl IndexerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - ETHSCRIPTIONS_BATCH_SIZE: blocks per batch
    /// - ETHSCRIPTIONS_CONCURRENCY: parallel block fetches
    /// - ETHSCRIPTIONS_START_BLOCK: starting block override
    /// - ETHSCRIPTIONS_DATA_DIR: sled data directory
    /// - ETHSCRIPTIONS_POLL_INTERVAL_MS: caught-up poll interval
    ///
    /// Also reads RPC config from its respective env vars.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            rpc: RpcConfig::from_env(),
            storage: StorageConfig {
                data_dir: env::var("ETHSCRIPTIONS_DATA_DIR")
                    .unwrap_or(defaults.storage.data_dir),
            },
            batch_size: env::var("ETHSCRIPTIONS_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            concurrency: env::var("ETHSCRIPTIONS_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.concurrency),
            start_block: env::var("ETHSCRIPTIONS_START_BLOCK")
                .ok()
                .and_then(|s| s.parse().ok()),
            poll_interval_ms: env::var("ETHSCRIPTIONS_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.poll_interval_ms),
            indexer_name: env::var("ETHSCRIPTIONS_INDEXER_NAME")
                .unwrap_or(defaults.indexer_name),
        }
    }

    /// Create a development configuration (local node, in-memory store)
    pub fn development() -> Self {
        Self {
            rpc: RpcConfig {
                urls: vec!["http://127.0.0.1:8545".to_string()],
                chain_id: 31337,
                timeout_secs: 10,
                max_retries: 2,
                backoff_base_ms: 100,
            },
            storage: StorageConfig::test(),
            batch_size: 10,
            concurrency: 4,
            start_block: None,
            poll_interval_ms: 200,
            indexer_name: "ethscriptions-dev".to_string(),
        }
    }

    /// Validate the configuration before wiring anything up
    pub fn validate(&self) -> Result<(), String> {
        if self.rpc.urls.is_empty() {
            return Err("at least one RPC endpoint is required".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be positive".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.rpc.chain_id, 8453);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.concurrency, 8);
        assert!(config.start_block.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_development_profile() {
        let config = IndexerConfig::development();
        assert_eq!(config.rpc.chain_id, 31337);
        assert!(config.storage.data_dir.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut config = IndexerConfig::default();
        config.rpc.urls.clear();
        assert!(config.validate().is_err());
    }
}
