use std::sync::atomic::{AtomicU64, Ordering};

/// Simple metrics for observing cache behavior.
#[derive(Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub inserts: AtomicU64,
    pub skipped_inserts: AtomicU64,
    pub lru_evictions: AtomicU64,
    pub clears: AtomicU64,
    pub total_get_ns: AtomicU64,
}

impl CacheMetrics {
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            skipped_inserts: self.skipped_inserts.load(Ordering::Relaxed),
            lru_evictions: self.lru_evictions.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            total_get_ns: self.total_get_ns.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.hits,
            &self.misses,
            &self.inserts,
            &self.skipped_inserts,
            &self.lru_evictions,
            &self.clears,
            &self.total_get_ns,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub skipped_inserts: u64,
    pub lru_evictions: u64,
    pub clears: u64,
    pub total_get_ns: u64,
}
