//! The chainable query builder.
//!
//! Every builder call returns a new [`Criteria`]; the receiver is never
//! changed. Nothing touches the backend until a terminal operation runs.

mod builder;
mod finders;
mod persistence;

use crate::Odm;
use crate::errors::Result;
use crate::model::Model;
use crate::scope::Extensions;
use crate::selector::merge_selectors;
use crate::types::{MergeStrategy, Projection, QueryOptions, SortSpec};
use bson::Document as BsonDocument;
use std::sync::{Arc, OnceLock};

/// The accumulated state of one chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParts {
    pub selector: BsonDocument,
    pub projection: Option<Projection>,
    pub sort: Vec<SortSpec>,
    pub options: QueryOptions,
    pub inclusions: Vec<String>,
    /// Set by `reorder`: this sort replaces any sort it is layered on.
    pub reorder: bool,
}

impl QueryParts {
    /// `overlay` layered on top of `self`: selectors merge, projections of one
    /// mode union, sorts concatenate, options overlay, inclusions union.
    #[must_use]
    pub fn merged(&self, overlay: &Self) -> Self {
        let mut sort = if overlay.reorder { Vec::new() } else { self.sort.clone() };
        for s in &overlay.sort {
            sort.retain(|e| e.field != s.field);
            sort.push(s.clone());
        }
        let mut inclusions = self.inclusions.clone();
        for i in &overlay.inclusions {
            if !inclusions.contains(i) {
                inclusions.push(i.clone());
            }
        }
        Self {
            selector: merge_selectors(&self.selector, &overlay.selector),
            projection: merge_projections(self.projection.as_ref(), overlay.projection.as_ref()),
            sort,
            options: self.options.merged(&overlay.options),
            inclusions,
            reorder: self.reorder || overlay.reorder,
        }
    }
}

/// Same-mode projections union their fields; otherwise the overlay wins.
fn merge_projections(base: Option<&Projection>, overlay: Option<&Projection>) -> Option<Projection> {
    let union = |a: &[String], b: &[String]| {
        let mut fields = a.to_vec();
        fields.extend(b.iter().filter(|f| !a.contains(f)).cloned());
        fields
    };
    match (base, overlay) {
        (Some(Projection::Only(a)), Some(Projection::Only(b))) => Some(Projection::Only(union(a, b))),
        (Some(Projection::Without(a)), Some(Projection::Without(b))) => {
            Some(Projection::Without(union(a, b)))
        }
        (base, overlay) => overlay.or(base).cloned(),
    }
}

#[derive(Clone)]
pub struct Criteria {
    odm: Odm,
    model: Arc<Model>,
    parts: QueryParts,
    defaults: Option<Arc<QueryParts>>,
    scoped: bool,
    strategy: Option<MergeStrategy>,
    extensions: Option<Arc<Extensions>>,
    count_cache: OnceLock<u64>,
}

impl Criteria {
    /// A criteria over `model`. The default scope, if any, is evaluated now
    /// even when `scoped` is false so that [`Criteria::scoped`] can bring it
    /// back later.
    pub(crate) fn new(odm: Odm, model: Arc<Model>, scoped: bool) -> Result<Self> {
        let base = Self {
            odm,
            model,
            parts: QueryParts::default(),
            defaults: None,
            scoped: false,
            strategy: None,
            extensions: None,
            count_cache: OnceLock::new(),
        };
        let defaults = match base.model.scopes().default_scope() {
            Some(f) => Some(Arc::new(f(base.clone())?.parts)),
            None => None,
        };
        Ok(Self { defaults, scoped, ..base })
    }

    /// A copy ready to be changed: per-instance caches are dropped.
    fn chain(&self) -> Self {
        Self { count_cache: OnceLock::new(), ..self.clone() }
    }

    #[must_use]
    pub fn odm(&self) -> &Odm {
        &self.odm
    }

    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    #[must_use]
    pub const fn is_scoped(&self) -> bool {
        self.scoped
    }

    /// The parts added through this chain, without the default scope.
    #[must_use]
    pub const fn explicit_parts(&self) -> &QueryParts {
        &self.parts
    }

    /// What the query will actually run with.
    #[must_use]
    pub fn effective(&self) -> QueryParts {
        match (&self.defaults, self.scoped) {
            (Some(d), true) => d.merged(&self.parts),
            _ => self.parts.clone(),
        }
    }

    #[must_use]
    pub fn selector(&self) -> BsonDocument {
        self.effective().selector
    }

    #[must_use]
    pub fn projection(&self) -> Option<Projection> {
        self.effective().projection
    }

    #[must_use]
    pub fn sort(&self) -> Vec<SortSpec> {
        self.effective().sort
    }

    #[must_use]
    pub fn options(&self) -> QueryOptions {
        self.effective().options
    }

    #[must_use]
    pub fn inclusions(&self) -> Vec<String> {
        self.effective().inclusions
    }

    #[must_use]
    pub fn extensions(&self) -> Option<&Extensions> {
        self.extensions.as_deref()
    }
}

impl std::fmt::Debug for Criteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = self.effective();
        f.debug_struct("Criteria")
            .field("model", &self.model.name())
            .field("selector", &parts.selector)
            .field("projection", &parts.projection)
            .field("sort", &parts.sort)
            .field("options", &parts.options)
            .field("inclusions", &parts.inclusions)
            .field("scoped", &self.scoped)
            .finish_non_exhaustive()
    }
}

/// Two criteria are equal when they would issue the same query.
impl PartialEq for Criteria {
    fn eq(&self, other: &Self) -> bool {
        self.model.name() == other.model.name() && self.effective() == other.effective()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Order;
    use bson::doc;

    #[test]
    fn overlay_parts_merge() {
        let base = QueryParts {
            selector: doc! { "active": true },
            sort: vec![SortSpec::new("name", Order::Asc)],
            inclusions: vec!["albums".into()],
            ..QueryParts::default()
        };
        let overlay = QueryParts {
            selector: doc! { "likes": { "$gt": 1 } },
            sort: vec![SortSpec::new("name", Order::Desc), SortSpec::new("likes", Order::Asc)],
            inclusions: vec!["albums".into(), "label".into()],
            ..QueryParts::default()
        };
        let m = base.merged(&overlay);
        assert_eq!(m.selector, doc! { "active": true, "likes": { "$gt": 1 } });
        assert_eq!(m.sort, overlay.sort);
        assert_eq!(m.inclusions, vec!["albums".to_string(), "label".to_string()]);
    }
}
