//! Process-wide query cache: raw result documents keyed by the exact query
//! shape that produced them.
mod config;
mod core;
mod metrics;

pub use config::QueryCacheConfig;
pub use core::{QueryCache, cache_key};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
