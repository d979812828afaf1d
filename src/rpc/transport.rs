// src/rpc/transport.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::time::Instant;

use crate::rpc::{
    endpoint::Endpoint,
    error::{GatewayError, RpcErrorClass},
    rate_limit::RateLimiter,
    types::{CallRequest, JsonRpcRequest},
};

/// Retry/backoff knobs, loaded from configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

enum AttemptError {
    /// Worth another attempt, possibly on a different endpoint.
    Transient(GatewayError),
    /// Retrying cannot help; surface immediately.
    Fatal(GatewayError),
}

/// Executes JSON-RPC calls against the configured endpoint pool with rate
/// admission, per-attempt timeouts, retry with backoff + jitter, and
/// endpoint failover. All endpoint health and rate-budget mutation happens
/// here and in the limiter; callers never touch that state.
pub struct RpcTransport {
    client: reqwest::Client,
    endpoints: Vec<Arc<Endpoint>>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub fn new(endpoints: Vec<Arc<Endpoint>>, limiter: RateLimiter, retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            limiter,
            retry,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Token snapshot for an endpoint, read-only. The dispatcher uses this
    /// for reporting; it never mutates budgets itself.
    pub fn budget_tokens(&self, endpoint_id: usize) -> f64 {
        self.limiter.tokens(endpoint_id)
    }

    /// Prefer usable endpoints with the fullest rate budget; avoid the
    /// endpoint that just failed when an alternative exists. Falls back to
    /// the whole pool if everything is marked unreachable.
    fn pick_endpoint(&self, exclude: Option<usize>) -> Arc<Endpoint> {
        let mut pool: Vec<&Arc<Endpoint>> =
            self.endpoints.iter().filter(|e| e.is_usable()).collect();
        if pool.is_empty() {
            pool = self.endpoints.iter().collect();
        }
        if let Some(id) = exclude {
            if pool.len() > 1 {
                pool.retain(|e| e.id != id);
            }
        }
        let best = pool
            .iter()
            .max_by(|a, b| {
                self.limiter
                    .tokens(a.id)
                    .partial_cmp(&self.limiter.tokens(b.id))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("endpoint pool is never empty");
        Arc::clone(best)
    }

    /// Execute one logical call. Bounded by `deadline` across all retries;
    /// individual attempts are additionally bounded by the configured
    /// attempt timeout.
    pub async fn execute(
        &self,
        req: &CallRequest,
        deadline: Instant,
    ) -> Result<Value, GatewayError> {
        let mut last_err: Option<GatewayError> = None;
        let mut failed_on: Option<usize> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let backoff = self.backoff_for(attempt);
                let now = Instant::now();
                if now + backoff >= deadline {
                    break;
                }
                tokio::time::sleep(backoff).await;
            }

            let endpoint = self.pick_endpoint(failed_on);
            self.limiter.await_admission(endpoint.id, deadline).await?;

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let timeout = self.retry.attempt_timeout.min(deadline.duration_since(now));

            match self.attempt(&endpoint, req, timeout).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(e)) => {
                    tracing::debug!(
                        endpoint = %endpoint.url,
                        method = %req.method,
                        attempt,
                        error = %e,
                        "transient upstream failure, will retry"
                    );
                    failed_on = Some(endpoint.id);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            GatewayError::Network(format!("deadline exceeded calling {}", req.method))
        }))
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self
            .retry
            .base_backoff
            .saturating_mul(1u32 << (attempt - 1).min(16))
            .min(self.retry.max_backoff);
        let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
        exp.mul_f64(jitter)
    }

    async fn attempt(
        &self,
        endpoint: &Endpoint,
        req: &CallRequest,
        timeout: Duration,
    ) -> Result<Value, AttemptError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest::new(&req.method, &req.params, id);
        let started = Instant::now();

        let mut builder = self.client.post(endpoint.url.clone()).timeout(timeout).json(&body);
        if let Some(key) = &endpoint.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                endpoint.record_failure();
                return Err(AttemptError::Transient(GatewayError::Network(format!(
                    "{}: {e}",
                    req.method
                ))));
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            // Provider-side throttling: back off, do not penalize health.
            return Err(AttemptError::Transient(GatewayError::Throttled(format!(
                "upstream {} returned 429",
                endpoint.url
            ))));
        }
        if status.is_server_error() {
            endpoint.record_failure();
            return Err(AttemptError::Transient(GatewayError::Network(format!(
                "upstream {} returned {status}",
                endpoint.url
            ))));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(GatewayError::Protocol(format!(
                "upstream {} returned unexpected status {status}",
                endpoint.url
            ))));
        }

        let body: Value = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                endpoint.record_failure();
                return Err(AttemptError::Fatal(GatewayError::Protocol(format!(
                    "invalid JSON-RPC response body: {e}"
                ))));
            }
        };

        let latency = started.elapsed().as_millis() as u64;

        if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = err.get("message").and_then(Value::as_str).unwrap_or("").to_string();
            let class = RpcErrorClass::classify(code, &message);
            if class.penalizes_endpoint() {
                endpoint.record_failure();
            } else {
                endpoint.record_success(latency);
            }
            let mapped = class.into_gateway_error(code, &message);
            return if class.is_transient() {
                Err(AttemptError::Transient(mapped))
            } else {
                Err(AttemptError::Fatal(mapped))
            };
        }

        match body.get("result") {
            // `null` is a legitimate result (e.g. unknown tx hash).
            Some(value) => {
                endpoint.record_success(latency);
                Ok(value.clone())
            }
            None => {
                endpoint.record_failure();
                Err(AttemptError::Fatal(GatewayError::Protocol(
                    "response carried neither result nor error".to_string(),
                )))
            }
        }
    }
}
