// src/config.rs

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::cache::CachePolicy;
use crate::rpc::{Endpoint, RateBudget, RetryPolicy};

/// One upstream endpoint as configured, with its optional API key and
/// rate budget.
#[derive(Clone, Debug, Deserialize)]
pub struct EndpointSettings {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(default)]
    pub refill_per_sec: Option<f64>,
}

/// All configuration, loaded once at startup from the environment. Every
/// policy knob (staleness margin, retry constants, deadlines) lives here
/// rather than in code.
#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub port: u16,

    // Chain settings
    pub chain_id: u64,
    pub endpoints: Vec<EndpointSettings>,

    // Cache policy
    pub cache_max_entries: usize,
    pub cache_latest_ttl: Duration,
    pub cache_metadata_ttl: Duration,
    pub staleness_margin_blocks: u64,

    // Retry policy
    pub retry_max_attempts: u32,
    pub retry_base_backoff: Duration,
    pub retry_max_backoff: Duration,
    pub attempt_timeout: Duration,

    // Overall per-request deadline
    pub request_deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            chain_id: 1,
            endpoints: vec![EndpointSettings {
                url: "http://localhost:8545".to_string(),
                api_key: None,
                capacity: None,
                refill_per_sec: None,
            }],
            cache_max_entries: 4096,
            cache_latest_ttl: Duration::from_millis(2_000),
            cache_metadata_ttl: Duration::from_secs(3_600),
            staleness_margin_blocks: 0,
            retry_max_attempts: 3,
            retry_base_backoff: Duration::from_millis(200),
            retry_max_backoff: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(10),
            request_deadline: Duration::from_secs(25),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load variables from the .env file into the environment
        dotenvy::dotenv().ok();

        let endpoints_str = env::var("RPC_ENDPOINTS").context(
            "RPC_ENDPOINTS must be set to a JSON array of {url, api_key?, capacity?, refill_per_sec?}",
        )?;
        let endpoints: Vec<EndpointSettings> =
            serde_json::from_str(&endpoints_str).context("Invalid RPC_ENDPOINTS JSON format")?;
        if endpoints.is_empty() {
            anyhow::bail!("RPC_ENDPOINTS must list at least one endpoint");
        }

        let defaults = Self::default();
        Ok(Config {
            port: env_u64("PORT", defaults.port as u64)? as u16,
            chain_id: env_u64("CHAIN_ID", defaults.chain_id)?,
            endpoints,
            cache_max_entries: env_u64(
                "CACHE_MAX_ENTRIES",
                defaults.cache_max_entries as u64,
            )? as usize,
            cache_latest_ttl: env_millis("CACHE_LATEST_TTL_MS", defaults.cache_latest_ttl)?,
            cache_metadata_ttl: env_millis("CACHE_METADATA_TTL_MS", defaults.cache_metadata_ttl)?,
            staleness_margin_blocks: env_u64(
                "STALENESS_MARGIN_BLOCKS",
                defaults.staleness_margin_blocks,
            )?,
            retry_max_attempts: env_u64("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts as u64)?
                as u32,
            retry_base_backoff: env_millis("RETRY_BASE_BACKOFF_MS", defaults.retry_base_backoff)?,
            retry_max_backoff: env_millis("RETRY_MAX_BACKOFF_MS", defaults.retry_max_backoff)?,
            attempt_timeout: env_millis("ATTEMPT_TIMEOUT_MS", defaults.attempt_timeout)?,
            request_deadline: env_millis("REQUEST_DEADLINE_MS", defaults.request_deadline)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_backoff: self.retry_base_backoff,
            max_backoff: self.retry_max_backoff,
            attempt_timeout: self.attempt_timeout,
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            max_entries: self.cache_max_entries,
            staleness_margin: self.staleness_margin_blocks,
        }
    }

    pub fn rate_budgets(&self) -> Vec<RateBudget> {
        self.endpoints
            .iter()
            .map(|e| {
                let defaults = RateBudget::default();
                RateBudget {
                    capacity: e.capacity.unwrap_or(defaults.capacity),
                    refill_per_sec: e.refill_per_sec.unwrap_or(defaults.refill_per_sec),
                }
            })
            .collect()
    }

    pub fn build_endpoints(&self) -> Result<Vec<Arc<Endpoint>>> {
        self.endpoints
            .iter()
            .enumerate()
            .map(|(id, settings)| {
                let url = Url::parse(&settings.url)
                    .with_context(|| format!("Invalid endpoint URL '{}'", settings.url))?;
                Ok(Arc::new(Endpoint::new(id, url, settings.api_key.clone())))
            })
            .collect()
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .with_context(|| format!("{key} must be a valid number"))
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_millis(env_u64(key, default.as_millis() as u64)?))
}
