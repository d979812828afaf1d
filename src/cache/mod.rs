// src/cache/mod.rs

pub mod fingerprint;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::rpc::error::GatewayError;
use crate::rpc::types::{BlockRef, CallOutcome};
pub use fingerprint::{fingerprint_for, Fingerprint};

/// Cache sizing and staleness policy, loaded from configuration.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub max_entries: usize,
    /// How many blocks a latest-scoped entry may trail the observed head
    /// before it must be refetched.
    pub staleness_margin: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self { max_entries: 4096, staleness_margin: 0 }
    }
}

type FetchResult = Result<(Value, Option<u64>), GatewayError>;

struct CacheEntry {
    value: Value,
    inserted: Instant,
    ttl: Duration,
    block_height: Option<u64>,
    pinned: bool,
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<Fingerprint, CacheEntry>,
    inflight: HashMap<Fingerprint, watch::Receiver<Option<FetchResult>>>,
    tick: u64,
}

/// Fingerprint-keyed response cache with TTL + head-staleness validity,
/// bounded LRU eviction, and single-flight coalescing of concurrent
/// identical fetches.
///
/// The fetch itself runs on a detached task: if the initiating request is
/// cancelled at its deadline, waiters coalesced onto the same fingerprint
/// still receive the result.
pub struct ResponseCache {
    policy: CachePolicy,
    head: AtomicU64,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            head: AtomicU64::new(0),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                inflight: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// Record an observed head height. Monotonic; stale observations from
    /// lagging endpoints never move the head backwards.
    pub fn note_head(&self, height: u64) {
        self.head.fetch_max(height, Ordering::Relaxed);
    }

    pub fn head(&self) -> u64 {
        self.head.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry_valid(&self, entry: &CacheEntry) -> bool {
        if entry.pinned {
            // Chain history is immutable: pinned entries never expire.
            return true;
        }
        if entry.ttl.is_zero() || entry.inserted.elapsed() > entry.ttl {
            return false;
        }
        match entry.block_height {
            Some(h) => self.head().saturating_sub(h) <= self.policy.staleness_margin,
            // Without a recorded height the TTL alone governs validity.
            None => true,
        }
    }

    /// Return the cached value for `fp` if still valid, join an in-flight
    /// fetch for it, or start one via `fetch`. Failed fetches are never
    /// stored, so no error (decode failures included) can turn into a
    /// cached success.
    pub async fn lookup_or_fetch<F, Fut>(
        self: &Arc<Self>,
        fp: Fingerprint,
        scope: BlockRef,
        ttl: Duration,
        fetch: F,
    ) -> Result<CallOutcome, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let (mut rx, initiated) = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            inner.tick += 1;
            let tick = inner.tick;

            if let Some(entry) = inner.entries.get_mut(&fp) {
                if self.entry_valid(entry) {
                    entry.last_used = tick;
                    return Ok(CallOutcome {
                        value: entry.value.clone(),
                        served_from_cache: true,
                        block_height: entry.block_height,
                    });
                }
            }

            if let Some(rx) = inner.inflight.get(&fp) {
                (rx.clone(), false)
            } else {
                let (tx, rx) = watch::channel(None);
                inner.inflight.insert(fp, rx.clone());
                drop(inner);

                let cache = Arc::clone(self);
                let fut = fetch();
                tokio::spawn(async move {
                    let result = fut.await;
                    cache.finish_fetch(fp, scope, ttl, &result);
                    let _ = tx.send(Some(result));
                });
                (rx, true)
            }
        };

        loop {
            if let Some(result) = rx.borrow().clone() {
                let (value, block_height) = result?;
                return Ok(CallOutcome {
                    value,
                    // Coalesced waiters did not cause an upstream call.
                    served_from_cache: !initiated,
                    block_height,
                });
            }
            rx.changed().await.map_err(|_| {
                GatewayError::Network("in-flight fetch was aborted".to_string())
            })?;
        }
    }

    fn finish_fetch(&self, fp: Fingerprint, scope: BlockRef, ttl: Duration, result: &FetchResult) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.inflight.remove(&fp);

        let (value, block_height) = match result {
            Ok(ok) => ok.clone(),
            Err(e) => {
                tracing::debug!(fingerprint = %fp, error = %e, "fetch failed, nothing cached");
                return;
            }
        };

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            fp,
            CacheEntry {
                value,
                inserted: Instant::now(),
                ttl,
                block_height,
                pinned: scope.is_pinned(),
                last_used: tick,
            },
        );

        while inner.entries.len() > self.policy.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| *k);
            match oldest {
                Some(k) => {
                    inner.entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::CallRequest;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn cache(policy: CachePolicy) -> Arc<ResponseCache> {
        Arc::new(ResponseCache::new(policy))
    }

    fn fp(tag: &str, scope: BlockRef) -> Fingerprint {
        fingerprint_for(1, &CallRequest::new("test_method", vec![json!(tag)]).at(scope))
    }

    fn counting_fetch(
        counter: &Arc<AtomicUsize>,
        value: Value,
        height: Option<u64>,
    ) -> impl Future<Output = FetchResult> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok((value, height))
        }
    }

    #[tokio::test]
    async fn pinned_entries_are_permanent() {
        let cache = cache(CachePolicy::default());
        let scope = BlockRef::Number(100);
        let fp = fp("a", scope);
        let hits = Arc::new(AtomicUsize::new(0));

        let first = cache
            .lookup_or_fetch(fp, scope, Duration::ZERO, || {
                counting_fetch(&hits, json!("0x1"), Some(100))
            })
            .await
            .unwrap();
        assert!(!first.served_from_cache);

        for _ in 0..3 {
            let again = cache
                .lookup_or_fetch(fp, scope, Duration::ZERO, || {
                    counting_fetch(&hits, json!("0x1"), Some(100))
                })
                .await
                .unwrap();
            assert!(again.served_from_cache);
            assert_eq!(again.value, json!("0x1"));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_ttl_latest_always_refetches() {
        let cache = cache(CachePolicy::default());
        let fp = fp("b", BlockRef::Latest);
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            cache
                .lookup_or_fetch(fp, BlockRef::Latest, Duration::ZERO, || {
                    counting_fetch(&hits, json!("0x2"), None)
                })
                .await
                .unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn head_advance_past_margin_invalidates_latest_entries() {
        let cache = cache(CachePolicy { max_entries: 16, staleness_margin: 0 });
        cache.note_head(100);
        let fp = fp("c", BlockRef::Latest);
        let hits = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(3600);

        cache
            .lookup_or_fetch(fp, BlockRef::Latest, ttl, || {
                counting_fetch(&hits, json!("0x3"), Some(100))
            })
            .await
            .unwrap();

        // Head unchanged: served from cache.
        let cached = cache
            .lookup_or_fetch(fp, BlockRef::Latest, ttl, || {
                counting_fetch(&hits, json!("0x3"), Some(100))
            })
            .await
            .unwrap();
        assert!(cached.served_from_cache);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Head advanced beyond the margin: must refetch.
        cache.note_head(101);
        let refetched = cache
            .lookup_or_fetch(fp, BlockRef::Latest, ttl, || {
                counting_fetch(&hits, json!("0x4"), Some(101))
            })
            .await
            .unwrap();
        assert!(!refetched.served_from_cache);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_coalesce() {
        let cache = cache(CachePolicy::default());
        let fp = fp("d", BlockRef::Latest);
        let hits = Arc::new(AtomicUsize::new(0));

        let slow_fetch = |hits: &Arc<AtomicUsize>| {
            let hits = Arc::clone(hits);
            || async move {
                hits.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok((json!("0x5"), None))
            }
        };

        let (a, b) = tokio::join!(
            cache.lookup_or_fetch(fp, BlockRef::Latest, Duration::ZERO, slow_fetch(&hits)),
            cache.lookup_or_fetch(fp, BlockRef::Latest, Duration::ZERO, slow_fetch(&hits)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(a.value, b.value);
        assert_ne!(a.served_from_cache, b.served_from_cache);
    }

    #[tokio::test]
    async fn failed_fetches_are_not_cached() {
        let cache = cache(CachePolicy::default());
        let scope = BlockRef::Number(5);
        let fp = fp("e", scope);
        let hits = Arc::new(AtomicUsize::new(0));

        let failing = {
            let hits = Arc::clone(&hits);
            || async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::decode(16, "truncated word"))
            }
        };
        let err = cache
            .lookup_or_fetch(fp, scope, Duration::ZERO, failing)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::rpc::error::ErrorKind::Decode);
        assert!(cache.is_empty());

        // A later fetch for the same fingerprint goes upstream again.
        cache
            .lookup_or_fetch(fp, scope, Duration::ZERO, || {
                counting_fetch(&hits, json!("0x6"), Some(5))
            })
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn eviction_is_least_recently_used() {
        let cache = cache(CachePolicy { max_entries: 2, staleness_margin: 0 });
        let hits = Arc::new(AtomicUsize::new(0));

        for tag in ["x", "y", "z"] {
            let scope = BlockRef::Number(1);
            cache
                .lookup_or_fetch(fp(tag, scope), scope, Duration::ZERO, || {
                    counting_fetch(&hits, json!(tag), Some(1))
                })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);

        // "x" was evicted; "z" is still resident.
        let z = cache
            .lookup_or_fetch(fp("z", BlockRef::Number(1)), BlockRef::Number(1), Duration::ZERO, || {
                counting_fetch(&hits, json!("z"), Some(1))
            })
            .await
            .unwrap();
        assert!(z.served_from_cache);

        let x = cache
            .lookup_or_fetch(fp("x", BlockRef::Number(1)), BlockRef::Number(1), Duration::ZERO, || {
                counting_fetch(&hits, json!("x"), Some(1))
            })
            .await
            .unwrap();
        assert!(!x.served_from_cache);
    }
}
