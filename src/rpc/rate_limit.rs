// src/rpc/rate_limit.rs

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::rpc::error::GatewayError;

/// Per-endpoint token budget: bucket capacity and refill rate.
#[derive(Debug, Clone, Copy)]
pub struct RateBudget {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl Default for RateBudget {
    fn default() -> Self {
        Self { capacity: 10.0, refill_per_sec: 5.0 }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter keyed by endpoint id.
///
/// Buckets refill lazily from elapsed time on each admission check; no
/// background ticking task. Balances never go negative.
pub struct RateLimiter {
    budgets: Vec<RateBudget>,
    buckets: DashMap<usize, TokenBucket>,
}

impl RateLimiter {
    pub fn new(budgets: Vec<RateBudget>) -> Self {
        Self { budgets, buckets: DashMap::new() }
    }

    fn budget(&self, endpoint_id: usize) -> RateBudget {
        self.budgets.get(endpoint_id).copied().unwrap_or_default()
    }

    fn refill(bucket: &mut TokenBucket, budget: RateBudget, now: Instant) {
        let elapsed = now.duration_since(bucket.last_refill);
        let added = elapsed.as_secs_f64() * budget.refill_per_sec;
        if added > 0.0 {
            bucket.tokens = (bucket.tokens + added).min(budget.capacity);
            bucket.last_refill = now;
        }
    }

    /// Non-blocking admission check; consumes one token on success.
    pub fn admit(&self, endpoint_id: usize) -> bool {
        let budget = self.budget(endpoint_id);
        let now = Instant::now();
        let mut bucket = self.buckets.entry(endpoint_id).or_insert_with(|| TokenBucket {
            tokens: budget.capacity,
            last_refill: now,
        });
        Self::refill(&mut bucket, budget, now);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current token balance without consuming. Used to rank endpoints.
    pub fn tokens(&self, endpoint_id: usize) -> f64 {
        let budget = self.budget(endpoint_id);
        match self.buckets.get_mut(&endpoint_id) {
            Some(mut bucket) => {
                Self::refill(&mut bucket, budget, Instant::now());
                bucket.tokens
            }
            None => budget.capacity,
        }
    }

    /// Blocking admission: waits for refill up to `deadline`, then fails
    /// with `Throttled`.
    pub async fn await_admission(
        &self,
        endpoint_id: usize,
        deadline: Instant,
    ) -> Result<(), GatewayError> {
        loop {
            if self.admit(endpoint_id) {
                return Ok(());
            }
            let budget = self.budget(endpoint_id);
            let now = Instant::now();
            if now >= deadline {
                return Err(GatewayError::Throttled(format!(
                    "no rate budget on endpoint {endpoint_id} before deadline"
                )));
            }
            // Time until one whole token exists, bounded by the deadline.
            let deficit = (1.0 - self.tokens(endpoint_id)).max(0.0);
            let wait = if budget.refill_per_sec > 0.0 {
                Duration::from_secs_f64(deficit / budget.refill_per_sec)
            } else {
                return Err(GatewayError::Throttled(format!(
                    "endpoint {endpoint_id} has a zero refill rate"
                )));
            };
            let remaining = deadline.duration_since(now);
            tokio::time::sleep(wait.min(remaining).max(Duration::from_millis(1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: f64, refill_per_sec: f64) -> RateLimiter {
        RateLimiter::new(vec![RateBudget { capacity, refill_per_sec }])
    }

    #[tokio::test]
    async fn capacity_exhausts_then_refills() {
        let rl = limiter(2.0, 4.0);
        assert!(rl.admit(0));
        assert!(rl.admit(0));
        assert!(!rl.admit(0));

        // 4 tokens/sec: 500ms is plenty for one token.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rl.admit(0));
    }

    #[tokio::test]
    async fn await_admission_respects_deadline() {
        let rl = limiter(1.0, 0.1);
        assert!(rl.admit(0));

        let deadline = Instant::now() + Duration::from_millis(50);
        let err = rl.await_admission(0, deadline).await.unwrap_err();
        assert_eq!(err.kind(), crate::rpc::error::ErrorKind::Throttled);
    }

    #[tokio::test]
    async fn await_admission_succeeds_after_refill() {
        let rl = limiter(1.0, 20.0);
        assert!(rl.admit(0));
        assert!(!rl.admit(0));

        let deadline = Instant::now() + Duration::from_secs(1);
        rl.await_admission(0, deadline).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_endpoint_uses_default_budget() {
        let rl = RateLimiter::new(vec![]);
        assert!(rl.admit(5));
        assert!(rl.tokens(5) < RateBudget::default().capacity);
    }
}
