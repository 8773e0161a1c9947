use crate::backend::QuerySpec;
use crate::cache::config::QueryCacheConfig;
use crate::cache::metrics::{CacheMetrics, CacheMetricsSnapshot};
use crate::errors::Result;
use crate::utils::num::u128_to_u64_saturating;
use bson::Document as BsonDocument;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Key of one cached result: the collection plus every query parameter that
/// shapes the result.
///
/// # Errors
/// Fails only if the query spec cannot be serialized.
pub fn cache_key(collection: &str, spec: &QuerySpec) -> Result<String> {
    Ok(format!("{collection}|{}", serde_json::to_string(spec)?))
}

/// Thread-safe LRU of raw query results.
///
/// Population is at-least-once: two threads may both miss and run the same
/// query; the first result stored wins and entries are never overwritten.
/// Every [`QueryCache::clear`] starts a new generation, and a result read
/// under an older generation is never stored.
pub struct QueryCache {
    store: RwLock<LruCache<String, Arc<Vec<BsonDocument>>>>,
    enabled: AtomicBool,
    generation: AtomicU64,
    metrics: CacheMetrics,
}

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

impl QueryCache {
    #[must_use]
    pub fn new(config: &QueryCacheConfig) -> Self {
        Self {
            store: RwLock::new(LruCache::new(capacity(config.capacity))),
            enabled: AtomicBool::new(config.enabled),
            generation: AtomicU64::new(0),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turning the cache off also drops every entry.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Release);
        if !on {
            self.clear();
        }
        log::debug!(target: "nexusodm::cache", "query cache {}", if on { "enabled" } else { "disabled" });
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<BsonDocument>>> {
        if !self.is_enabled() {
            return None;
        }
        let start = std::time::Instant::now();
        let hit = self.store.write().get(key).cloned();
        let counter = if hit.is_some() { &self.metrics.hits } else { &self.metrics.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .total_get_ns
            .fetch_add(u128_to_u64_saturating(start.elapsed().as_nanos()), Ordering::Relaxed);
        crate::dev6!(
            "{{\"bench\":\"cache\",\"op\":\"{}\"}}",
            if hit.is_some() { "hit" } else { "miss" }
        );
        hit
    }

    /// Generation to hand back to [`QueryCache::insert`]; read it before
    /// querying the backend.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores `docs` under `key` unless an entry already exists or the cache
    /// was cleared since `generation` was read.
    pub fn insert(&self, key: String, docs: Vec<BsonDocument>, generation: u64) {
        if !self.is_enabled() {
            return;
        }
        let mut guard = self.store.write();
        if self.generation.load(Ordering::Acquire) != generation {
            log::trace!(target: "nexusodm::cache", "dropping result read before a clear: {key}");
            self.metrics.skipped_inserts.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if guard.contains(&key) {
            self.metrics.skipped_inserts.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if let Some((evicted, _)) = guard.push(key, Arc::new(docs)) {
            log::trace!(target: "nexusodm::cache", "evicted {evicted}");
            self.metrics.lru_evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        let mut guard = self.store.write();
        guard.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(guard);
        self.metrics.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_capacity(&self, n: usize) {
        self.store.write().resize(capacity(n));
    }

    pub fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }
}
