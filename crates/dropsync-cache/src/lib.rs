//! Tiered TTL cache fronting every outbound supplier call.
//!
//! Entries are keyed by (namespace, key); namespaces separate the search,
//! product-detail, stock, and logistics caches because they warrant different
//! TTLs and invalidation triggers — a stock webhook invalidates only the
//! stock entry for the affected variant, never the detail cache.
//!
//! [`ApiCache::get_or_fetch`] is single-flight: concurrent misses on the same
//! key collapse into one upstream call and the waiters share its result, so
//! burst traffic cannot hammer the supplier API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

/// Cache namespaces, one per supplier payload class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Search,
    ProductDetail,
    Stock,
    Logistics,
}

impl Namespace {
    /// Default TTL per namespace. Search and stock results go stale in
    /// minutes; product details survive hours; the logistics channel table
    /// effectively never changes between explicit resyncs.
    #[must_use]
    pub fn default_ttl(self) -> Duration {
        match self {
            Namespace::Search => Duration::from_secs(5 * 60),
            Namespace::ProductDetail => Duration::from_secs(6 * 60 * 60),
            Namespace::Stock => Duration::from_secs(3 * 60),
            Namespace::Logistics => Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Search => "search",
            Namespace::ProductDetail => "product_detail",
            Namespace::Stock => "stock",
            Namespace::Logistics => "logistics",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Counters exposed through `GET /cache/stats`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Misses that piggybacked on another caller's in-flight fetch.
    pub coalesced: u64,
}

/// Concurrent TTL cache with single-flight fetch coalescing.
#[derive(Debug, Default)]
pub struct ApiCache {
    entries: RwLock<HashMap<(Namespace, String), Entry>>,
    inflight: Mutex<HashMap<(Namespace, String), Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl ApiCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a live entry; expired entries count as misses.
    pub async fn get(&self, ns: Namespace, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        match entries.get(&(ns, key.to_owned())) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a value under the namespace's default TTL.
    pub async fn set(&self, ns: Namespace, key: &str, value: serde_json::Value) {
        self.set_with_ttl(ns, key, value, ns.default_ttl()).await;
    }

    /// Stores a value under an explicit TTL.
    pub async fn set_with_ttl(
        &self,
        ns: Namespace,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) {
        let mut entries = self.entries.write().await;
        entries.insert(
            (ns, key.to_owned()),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drops one entry; a later `get` will miss.
    pub async fn invalidate(&self, ns: Namespace, key: &str) {
        let mut entries = self.entries.write().await;
        if entries.remove(&(ns, key.to_owned())).is_some() {
            tracing::debug!(namespace = ns.as_str(), key, "cache entry invalidated");
        }
    }

    /// Clears one namespace, or everything when `ns` is `None`.
    ///
    /// Returns the number of entries removed.
    pub async fn clear(&self, ns: Option<Namespace>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        match ns {
            Some(ns) => entries.retain(|(entry_ns, _), _| *entry_ns != ns),
            None => entries.clear(),
        }
        before - entries.len()
    }

    /// Removes expired entries; called periodically so memory stays bounded
    /// by the live key space rather than everything ever cached.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Returns the cached value, or runs `fetch` exactly once to populate it.
    ///
    /// Concurrent callers missing on the same key serialize on a per-key
    /// flight lock; whichever caller wins performs the upstream call and the
    /// rest find the freshly-stored entry when they re-check. A failed fetch
    /// stores nothing, so the next caller retries upstream.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `fetch` unchanged.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        ns: Namespace,
        key: &str,
        fetch: F,
    ) -> Result<serde_json::Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value, E>>,
    {
        if let Some(value) = self.get(ns, key).await {
            return Ok(value);
        }

        let flight = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry((ns, key.to_owned()))
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = flight.lock().await;

        // Another flight may have populated the entry while we waited.
        if let Some(value) = self.get(ns, key).await {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let result = fetch().await;
        if let Ok(value) = &result {
            self.set(ns, key, value.clone()).await;
        }

        let mut inflight = self.inflight.lock().await;
        inflight.remove(&(ns, key.to_owned()));

        result
    }
}
