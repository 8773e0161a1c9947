use crate::config::OdmConfig;

/// Configuration for the query cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self { enabled: false, capacity: 1024 }
    }
}

impl From<&OdmConfig> for QueryCacheConfig {
    fn from(c: &OdmConfig) -> Self {
        Self { enabled: c.query_cache, capacity: c.query_cache_capacity }
    }
}
