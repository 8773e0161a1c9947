pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod criteria;
pub mod document;
pub mod errors;
pub mod map_reduce;
pub mod model;
pub mod scope;
pub mod selector;
pub mod types;
pub mod utils;

pub use backend::{Backend, MemoryBackend, QuerySpec, RawCursor};
pub use cache::CacheMetricsSnapshot;
pub use config::OdmConfig;
pub use context::{ExecState, ExecutionContext};
pub use criteria::Criteria;
pub use document::Document;
pub use errors::{OdmError, Result};
pub use map_reduce::{MapReduce, OutputTarget};
pub use model::{FieldType, Model, ModelBuilder};
pub use scope::{ExtensionValue, Extensions, ScopeBody};
pub use selector::{Conditions, Pattern, field};
pub use types::{IdSort, Order, SortSpec};

use crate::cache::{QueryCache, QueryCacheConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct OdmInner {
    backend: Arc<dyn Backend>,
    config: RwLock<OdmConfig>,
    models: RwLock<HashMap<String, Arc<Model>>>,
    cache: QueryCache,
}

/// Handle to one mapper instance: the backend, the published models, the
/// query cache and the runtime configuration. Cloning is cheap and every
/// clone shares the same state.
#[derive(Clone)]
pub struct Odm {
    inner: Arc<OdmInner>,
}

impl Odm {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, config: OdmConfig) -> Self {
        let cache = QueryCache::new(&QueryCacheConfig::from(&config));
        log::info!(
            target: "nexusodm::odm",
            "odm ready (raise_not_found_error={}, query_cache={})",
            config.raise_not_found_error,
            config.query_cache
        );
        Self {
            inner: Arc::new(OdmInner {
                backend,
                config: RwLock::new(config),
                models: RwLock::new(HashMap::new()),
                cache,
            }),
        }
    }

    /// An instance over a fresh [`MemoryBackend`] with default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), OdmConfig::default())
    }

    /// Publishes a model. Its scopes are fixed from here on.
    ///
    /// # Errors
    /// `ModelAlreadyDefined` when the name is taken.
    pub fn define(&self, builder: ModelBuilder) -> Result<Arc<Model>> {
        let model = Arc::new(builder.build());
        let mut models = self.inner.models.write();
        if models.contains_key(model.name()) {
            return Err(OdmError::ModelAlreadyDefined(model.name().to_string()));
        }
        log::debug!(
            target: "nexusodm::odm",
            "defined model {} on collection {}",
            model.name(),
            model.collection()
        );
        models.insert(model.name().to_string(), Arc::clone(&model));
        Ok(model)
    }

    /// # Errors
    /// `UnknownModel` when no model of that name was defined.
    pub fn model(&self, name: &str) -> Result<Arc<Model>> {
        self.inner.models.read().get(name).cloned().ok_or_else(|| OdmError::UnknownModel(name.to_string()))
    }

    #[must_use]
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.models.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// A criteria over `model` with its default scope applied.
    ///
    /// # Errors
    /// `UnknownModel`; whatever the default scope returns.
    pub fn criteria(&self, model: &str) -> Result<Criteria> {
        Criteria::new(self.clone(), self.model(model)?, true)
    }

    /// A criteria over `model` without its default scope.
    ///
    /// # Errors
    /// `UnknownModel`; whatever the default scope returns.
    pub fn unscoped(&self, model: &str) -> Result<Criteria> {
        Criteria::new(self.clone(), self.model(model)?, false)
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    /// A snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> OdmConfig {
        self.inner.config.read().clone()
    }

    pub fn set_raise_not_found_error(&self, on: bool) {
        self.inner.config.write().raise_not_found_error = on;
    }

    pub fn set_query_cache(&self, on: bool) {
        self.inner.config.write().query_cache = on;
        self.inner.cache.set_enabled(on);
    }

    #[must_use]
    pub fn query_cache_enabled(&self) -> bool {
        self.inner.cache.is_enabled()
    }

    /// Resizes the query cache, evicting the least recently used entries
    /// when shrinking. Zero is treated as one.
    pub fn set_query_cache_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        self.inner.config.write().query_cache_capacity = capacity;
        self.inner.cache.set_capacity(capacity);
    }

    #[must_use]
    pub fn query_cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn clear_query_cache(&self) {
        self.inner.cache.clear();
    }

    #[must_use]
    pub fn cache_metrics(&self) -> CacheMetricsSnapshot {
        self.inner.cache.metrics_snapshot()
    }

    pub(crate) fn query_cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// Forgets every model and empties the query cache.
    pub fn reset(&self) {
        self.inner.models.write().clear();
        self.inner.cache.clear();
        self.inner.cache.reset_metrics();
        log::debug!(target: "nexusodm::odm", "odm reset");
    }
}

impl std::fmt::Debug for Odm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Odm")
            .field("models", &self.model_names())
            .field("config", &*self.inner.config.read())
            .field("query_cache_entries", &self.inner.cache.len())
            .finish_non_exhaustive()
    }
}

/// Initializes logging from `log4rs.yaml`, falling back to the environment
/// (`NEXUSODM_LOG_DIR`, `NEXUSODM_LOG_LEVEL`, ...).
///
/// # Errors
/// `Logging` when no configuration can be applied.
pub fn init() -> Result<()> {
    utils::logger::init().or_else(|_| utils::logger::configure_from_env())
}
