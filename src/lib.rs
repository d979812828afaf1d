// src/lib.rs

use std::sync::Arc;

use anyhow::Result;

// Re-export commonly used types
pub use ethers_core::types::{Address, H256, I256, U256};

// Re-export modules
pub mod abi;
pub mod api;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod mcp;
pub mod rpc;
pub mod utils;

use cache::ResponseCache;
use gateway::{Gateway, MetadataRegistry};
use rpc::{RateLimiter, RpcTransport};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: config::Config,
    /// The gateway dispatcher behind every tool and HTTP surface
    pub gateway: Arc<Gateway>,
}

/// Assemble the gateway from configuration: endpoint pool, rate limiter,
/// transport, response cache, and metadata registry.
pub fn build_gateway(config: &config::Config) -> Result<Arc<Gateway>> {
    let endpoints = config.build_endpoints()?;
    let limiter = RateLimiter::new(config.rate_budgets());
    let transport = Arc::new(RpcTransport::new(endpoints, limiter, config.retry_policy()));
    let cache = Arc::new(ResponseCache::new(config.cache_policy()));
    let metadata = Arc::new(MetadataRegistry::new());

    Ok(Arc::new(Gateway::new(
        config.chain_id,
        transport,
        cache,
        metadata,
        config.cache_latest_ttl,
        config.cache_metadata_ttl,
        config.request_deadline,
    )))
}
