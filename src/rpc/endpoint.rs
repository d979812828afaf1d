// src/rpc/endpoint.rs

use std::sync::Mutex;

use url::Url;

/// Consecutive failures before an endpoint is marked Degraded / Unreachable.
const DEGRADED_AFTER: u32 = 1;
const UNREACHABLE_AFTER: u32 = 3;

/// Health of a single upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unreachable,
}

#[derive(Debug)]
struct HealthInner {
    state: HealthState,
    consecutive_failures: u32,
    last_latency_ms: Option<u64>,
}

/// One configured upstream node. Created at startup, never removed; only
/// its health mutates, and only through the transport's success/failure
/// callbacks.
#[derive(Debug)]
pub struct Endpoint {
    pub id: usize,
    pub url: Url,
    pub api_key: Option<String>,
    health: Mutex<HealthInner>,
}

impl Endpoint {
    pub fn new(id: usize, url: Url, api_key: Option<String>) -> Self {
        Self {
            id,
            url,
            api_key,
            health: Mutex::new(HealthInner {
                state: HealthState::Healthy,
                consecutive_failures: 0,
                last_latency_ms: None,
            }),
        }
    }

    pub fn health(&self) -> HealthState {
        self.health.lock().expect("endpoint health lock poisoned").state
    }

    pub fn last_latency_ms(&self) -> Option<u64> {
        self.health.lock().expect("endpoint health lock poisoned").last_latency_ms
    }

    /// Unreachable endpoints are skipped during selection while any
    /// alternative remains.
    pub fn is_usable(&self) -> bool {
        self.health() != HealthState::Unreachable
    }

    pub fn record_success(&self, latency_ms: u64) {
        let mut h = self.health.lock().expect("endpoint health lock poisoned");
        h.consecutive_failures = 0;
        h.last_latency_ms = Some(latency_ms);
        h.state = HealthState::Healthy;
    }

    pub fn record_failure(&self) {
        let mut h = self.health.lock().expect("endpoint health lock poisoned");
        h.consecutive_failures += 1;
        h.state = if h.consecutive_failures >= UNREACHABLE_AFTER {
            HealthState::Unreachable
        } else if h.consecutive_failures >= DEGRADED_AFTER {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };
        if h.state == HealthState::Unreachable {
            tracing::warn!(
                endpoint = %self.url,
                failures = h.consecutive_failures,
                "endpoint marked unreachable after consecutive errors"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new(0, Url::parse("http://localhost:8545").unwrap(), None)
    }

    #[test]
    fn health_transitions() {
        let ep = endpoint();
        assert_eq!(ep.health(), HealthState::Healthy);

        ep.record_failure();
        assert_eq!(ep.health(), HealthState::Degraded);
        assert!(ep.is_usable());

        ep.record_failure();
        ep.record_failure();
        assert_eq!(ep.health(), HealthState::Unreachable);
        assert!(!ep.is_usable());

        ep.record_success(12);
        assert_eq!(ep.health(), HealthState::Healthy);
        assert_eq!(ep.last_latency_ms(), Some(12));
    }
}
