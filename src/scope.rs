//! Named and default scopes of a model.
//!
//! Scopes are registered while the model is built and never change after the
//! model is published, so lookups need no locking.

use crate::criteria::Criteria;
use crate::errors::Result;
use crate::selector::Conditions;
use bson::Bson;
use std::collections::HashMap;
use std::sync::Arc;

pub type ScopeFn = Arc<dyn Fn(&Criteria, &[Bson]) -> Result<Criteria> + Send + Sync>;
pub type DefaultScopeFn = Arc<dyn Fn(Criteria) -> Result<Criteria> + Send + Sync>;
pub type ExtensionFn = Arc<dyn Fn(&Criteria, &[Bson]) -> Result<ExtensionValue> + Send + Sync>;

#[derive(Clone)]
pub enum ScopeBody {
    /// Merged with `where` semantics.
    Conditions(Conditions),
    /// Called with the receiving criteria and the invocation arguments.
    Lambda(ScopeFn),
}

/// What an extension method hands back.
#[derive(Debug, Clone)]
pub enum ExtensionValue {
    Criteria(Criteria),
    Value(Bson),
}

/// Extra operations available only on criteria produced through a scope.
#[derive(Clone, Default)]
pub struct Extensions {
    methods: HashMap<String, ExtensionFn>,
}

impl Extensions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Criteria, &[Bson]) -> Result<ExtensionValue> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(f));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExtensionFn> {
        self.methods.get(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    /// Methods of `other` shadow same-named methods of `self`.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut methods = self.methods.clone();
        methods.extend(other.methods.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
        Self { methods }
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

#[derive(Clone)]
pub struct Scope {
    pub name: String,
    pub body: ScopeBody,
    pub extensions: Option<Arc<Extensions>>,
}

impl Scope {
    #[must_use]
    pub fn new(name: &str, body: ScopeBody, extensions: Option<Arc<Extensions>>) -> Self {
        Self { name: name.to_string(), body, extensions }
    }
}

#[derive(Clone, Default)]
pub struct ScopeRegistry {
    named: HashMap<String, Scope>,
    default: Option<DefaultScopeFn>,
}

impl ScopeRegistry {
    /// Re-registering a name replaces the earlier scope.
    pub fn register(&mut self, scope: Scope) {
        if self.named.contains_key(&scope.name) {
            log::warn!(target: "nexusodm::query", "scope '{}' redefined", scope.name);
        }
        self.named.insert(scope.name.clone(), scope);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Scope> {
        self.named.get(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.named.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    pub fn set_default(&mut self, f: DefaultScopeFn) {
        self.default = Some(f);
    }

    #[must_use]
    pub fn default_scope(&self) -> Option<&DefaultScopeFn> {
        self.default.as_ref()
    }
}
