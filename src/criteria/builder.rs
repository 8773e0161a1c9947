use super::Criteria;
use crate::errors::{OdmError, Result};
use crate::model::AssociationKind;
use crate::scope::{ExtensionValue, ScopeBody};
use crate::selector::{Conditions, Pattern, field, merge_condition};
use crate::types::{IdSort, MergeStrategy, Order, Projection, SortSpec};
use bson::{Bson, Document as BsonDocument, doc};
use std::sync::Arc;

fn non_negative(option: &'static str, n: i64) -> Result<u64> {
    u64::try_from(n).map_err(|_| OdmError::InvalidOption {
        option,
        message: format!("must not be negative, got {n}"),
    })
}

impl Criteria {
    /// Merges `conditions` into the selector.
    ///
    /// # Errors
    /// `UnsupportedQueryShape` for an `elem_match` across a referenced association.
    pub fn where_(&self, conditions: impl Into<Conditions>) -> Result<Self> {
        let mut next = self.chain();
        let strategy = next.strategy.take();
        for c in conditions.into() {
            merge_condition(&mut next.parts.selector, c, &self.model, strategy)?;
        }
        Ok(next)
    }

    /// Normalizes `conditions` into a standalone selector for this model.
    fn sub_selector(&self, conditions: impl Into<Conditions>) -> Result<BsonDocument> {
        let mut sel = BsonDocument::new();
        for c in conditions.into() {
            merge_condition(&mut sel, c, &self.model, None)?;
        }
        Ok(sel)
    }

    fn logical<I, C>(&self, operator: &str, branches: I) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Conditions>,
    {
        let branches = branches
            .into_iter()
            .map(|b| self.sub_selector(b).map(Bson::Document))
            .collect::<Result<Vec<_>>>()?;
        self.where_(Conditions::new().logical(operator, branches))
    }

    /// Adds `conditions` as one more `$and` clause.
    ///
    /// # Errors
    /// See [`Criteria::where_`].
    pub fn and(&self, conditions: impl Into<Conditions>) -> Result<Self> {
        self.logical("$and", [conditions])
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn or<I, C>(&self, branches: I) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Conditions>,
    {
        self.logical("$or", branches)
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn nor<I, C>(&self, branches: I) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Conditions>,
    {
        self.logical("$nor", branches)
    }

    fn list<I, V>(values: I) -> Bson
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Bson::Array(values.into_iter().map(Into::into).collect())
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn in_<I, V>(&self, name: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.where_((field(name).in_(), Self::list(values)))
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn not_in<I, V>(&self, name: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.where_((field(name).nin(), Self::list(values)))
    }

    /// Alias of [`Criteria::not_in`].
    ///
    /// # Errors
    /// See [`Criteria::where_`].
    pub fn nin<I, V>(&self, name: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.not_in(name, values)
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn all_in<I, V>(&self, name: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.where_((field(name).all(), Self::list(values)))
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn gt(&self, name: &str, value: impl Into<Bson>) -> Result<Self> {
        self.where_((field(name).gt(), value.into()))
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn gte(&self, name: &str, value: impl Into<Bson>) -> Result<Self> {
        self.where_((field(name).gte(), value.into()))
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn lt(&self, name: &str, value: impl Into<Bson>) -> Result<Self> {
        self.where_((field(name).lt(), value.into()))
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn lte(&self, name: &str, value: impl Into<Bson>) -> Result<Self> {
        self.where_((field(name).lte(), value.into()))
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn ne(&self, name: &str, value: impl Into<Bson>) -> Result<Self> {
        self.where_((field(name).ne(), value.into()))
    }

    /// Inclusive range.
    ///
    /// # Errors
    /// See [`Criteria::where_`].
    pub fn between(&self, name: &str, low: impl Into<Bson>, high: impl Into<Bson>) -> Result<Self> {
        self.where_([(field(name).gte(), low.into()), (field(name).lte(), high.into())])
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn field_exists(&self, name: &str, present: bool) -> Result<Self> {
        self.where_((field(name).exists(), present))
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn with_size(&self, name: &str, size: i64) -> Result<Self> {
        non_negative("size", size)?;
        self.where_((field(name).size(), Bson::Int64(size)))
    }

    /// Matches array elements satisfying every condition in `conditions`.
    ///
    /// # Errors
    /// `UnsupportedQueryShape` when `name` goes through a referenced association.
    pub fn elem_match(&self, name: &str, conditions: impl Into<Conditions>) -> Result<Self> {
        let sub = self.sub_selector(conditions)?;
        self.where_((field(name).elem_match(), sub))
    }

    /// # Errors
    /// See [`Criteria::where_`].
    pub fn matches(&self, name: &str, pattern: impl Into<Pattern>) -> Result<Self> {
        let pattern: Pattern = pattern.into();
        self.where_((field(name).regex(), Bson::from(pattern)))
    }

    /// Full-text search over the collection's text index.
    ///
    /// # Errors
    /// See [`Criteria::where_`].
    pub fn text_search(&self, terms: &str, language: Option<&str>) -> Result<Self> {
        let mut text = doc! { "$search": terms };
        if let Some(lang) = language {
            text.insert("$language", lang);
        }
        self.where_(Conditions::new().logical("$text", text))
    }

    fn with_strategy(&self, strategy: MergeStrategy) -> Self {
        let mut next = self.chain();
        next.strategy = Some(strategy);
        next
    }

    /// The next list operator merged onto an existing one unions the operands.
    #[must_use]
    pub fn union(&self) -> Self {
        self.with_strategy(MergeStrategy::Union)
    }

    #[must_use]
    pub fn intersect(&self) -> Self {
        self.with_strategy(MergeStrategy::Intersect)
    }

    #[must_use]
    pub fn override_(&self) -> Self {
        self.with_strategy(MergeStrategy::Override)
    }

    fn project(&self, fields: &[&str], only: bool) -> Result<Self> {
        let incoming: Vec<String> = fields
            .iter()
            .map(|f| if *f == "id" { "_id".to_string() } else { (*f).to_string() })
            .collect();
        if let Some(existing) = self.effective().projection
            && matches!(existing, Projection::Only(_)) != only
        {
            return Err(OdmError::ProjectionConflict(format!(
                "{} on {} after {}",
                if only { "only" } else { "without" },
                self.model.name(),
                if only { "without" } else { "only" },
            )));
        }
        // default-scope fields stay with the default scope
        let mut merged = match &self.parts.projection {
            Some(Projection::Only(existing)) if only => existing.clone(),
            Some(Projection::Without(existing)) if !only => existing.clone(),
            _ => Vec::new(),
        };
        for f in incoming {
            if !merged.contains(&f) {
                merged.push(f);
            }
        }
        let mut next = self.chain();
        next.parts.projection =
            Some(if only { Projection::Only(merged) } else { Projection::Without(merged) });
        Ok(next)
    }

    /// Loads only `fields` (plus `_id`).
    ///
    /// # Errors
    /// `ProjectionConflict` when the chain already uses `without`.
    pub fn only(&self, fields: &[&str]) -> Result<Self> {
        self.project(fields, true)
    }

    /// Loads everything except `fields`.
    ///
    /// # Errors
    /// `ProjectionConflict` when the chain already uses `only`.
    pub fn without(&self, fields: &[&str]) -> Result<Self> {
        self.project(fields, false)
    }

    /// Appends sort keys. A field sorted again moves to the end with its new order.
    #[must_use]
    pub fn order_by(&self, specs: impl IntoIterator<Item = SortSpec>) -> Self {
        let mut next = self.chain();
        for s in specs {
            next.parts.sort.retain(|e| e.field != s.field);
            next.parts.sort.push(s);
        }
        next
    }

    #[must_use]
    pub fn asc(&self, fields: &[&str]) -> Self {
        self.order_by(fields.iter().map(|f| SortSpec::new(*f, Order::Asc)))
    }

    #[must_use]
    pub fn desc(&self, fields: &[&str]) -> Self {
        self.order_by(fields.iter().map(|f| SortSpec::new(*f, Order::Desc)))
    }

    /// Replaces every sort key, including those of the default scope.
    #[must_use]
    pub fn reorder(&self, specs: impl IntoIterator<Item = SortSpec>) -> Self {
        let mut next = self.chain();
        next.parts.sort = Vec::new();
        next.parts.reorder = true;
        next.order_by(specs)
    }

    /// # Errors
    /// `InvalidOption` for a negative value.
    pub fn limit(&self, n: i64) -> Result<Self> {
        let n = non_negative("limit", n)?;
        let mut next = self.chain();
        next.parts.options.limit = Some(n);
        Ok(next)
    }

    /// # Errors
    /// `InvalidOption` for a negative value.
    pub fn skip(&self, n: i64) -> Result<Self> {
        let n = non_negative("skip", n)?;
        let mut next = self.chain();
        next.parts.options.skip = Some(n);
        Ok(next)
    }

    /// # Errors
    /// `InvalidOption` for a negative or oversized value.
    pub fn batch_size(&self, n: i64) -> Result<Self> {
        let n = u32::try_from(non_negative("batch_size", n)?).map_err(|_| OdmError::InvalidOption {
            option: "batch_size",
            message: format!("{n} exceeds {}", u32::MAX),
        })?;
        let mut next = self.chain();
        next.parts.options.batch_size = Some(n);
        Ok(next)
    }

    #[must_use]
    pub fn id_sort(&self, mode: IdSort) -> Self {
        let mut next = self.chain();
        next.parts.options.id_sort = Some(mode);
        next
    }

    /// Eager-loads `associations` for every document the query returns.
    ///
    /// # Errors
    /// `InvalidIncludes` for unknown or embedded associations; `InvalidConfig`
    /// for polymorphic belongs-to, whose target collection varies per document.
    pub fn includes(&self, associations: &[&str]) -> Result<Self> {
        let mut next = self.chain();
        for name in associations {
            let assoc = self.model.association(name).ok_or_else(|| OdmError::InvalidIncludes {
                model: self.model.name().to_string(),
                message: format!("no association named '{name}'"),
            })?;
            if assoc.polymorphic {
                return Err(OdmError::InvalidConfig(format!(
                    "cannot eager load polymorphic association '{name}' of {}",
                    self.model.name()
                )));
            }
            if matches!(assoc.kind, AssociationKind::EmbedsMany | AssociationKind::EmbedsOne) {
                return Err(OdmError::InvalidIncludes {
                    model: self.model.name().to_string(),
                    message: format!("'{name}' is embedded and always loaded with its parent"),
                });
            }
            if !next.parts.inclusions.iter().any(|i| i == name) {
                next.parts.inclusions.push((*name).to_string());
            }
        }
        Ok(next)
    }

    /// Drops the default scope's contribution; explicit conditions stay.
    #[must_use]
    pub fn unscoped(&self) -> Self {
        let mut next = self.chain();
        next.scoped = false;
        next
    }

    #[must_use]
    pub fn scoped(&self) -> Self {
        let mut next = self.chain();
        next.scoped = true;
        next
    }

    /// Layers `other` on top of this criteria.
    ///
    /// # Errors
    /// `InvalidConfig` when `other` queries a different model;
    /// `ProjectionConflict` when one side uses `only` and the other `without`.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        if other.model.name() != self.model.name() {
            return Err(OdmError::InvalidConfig(format!(
                "cannot merge {} criteria into {} criteria",
                other.model.name(),
                self.model.name()
            )));
        }
        let mut next = match &other.parts.projection {
            Some(Projection::Only(f)) => self.only(&f.iter().map(String::as_str).collect::<Vec<_>>())?,
            Some(Projection::Without(f)) => {
                self.without(&f.iter().map(String::as_str).collect::<Vec<_>>())?
            }
            None => self.chain(),
        };
        let projection = next.parts.projection.take();
        next.parts = next.parts.merged(&other.parts);
        next.parts.projection = projection;
        next.extensions = match (&self.extensions, &other.extensions) {
            (Some(a), Some(b)) => Some(Arc::new(a.merged(b))),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        Ok(next)
    }

    /// Applies the named scope of this criteria's model.
    ///
    /// A lambda scope receives this criteria and returns the chained result.
    ///
    /// # Errors
    /// `UnknownScope` when the model has no such scope; whatever the scope
    /// itself returns.
    pub fn scope(&self, name: &str, args: &[Bson]) -> Result<Self> {
        let scope = self.model.scopes().get(name).ok_or_else(|| OdmError::UnknownScope {
            model: self.model.name().to_string(),
            name: name.to_string(),
        })?;
        log::trace!(target: "nexusodm::query", "applying scope {}.{name}", self.model.name());
        let mut next = match &scope.body {
            ScopeBody::Conditions(c) => self.where_(c.clone())?,
            ScopeBody::Lambda(f) => f(self, args)?.chain(),
        };
        if let Some(ext) = &scope.extensions {
            next.extensions = Some(match &next.extensions {
                Some(existing) => Arc::new(existing.merged(ext)),
                None => Arc::clone(ext),
            });
        }
        Ok(next)
    }

    #[must_use]
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.as_ref().is_some_and(|e| e.get(name).is_some())
    }

    /// Calls an extension method attached by a scope earlier in the chain.
    ///
    /// # Errors
    /// `UnknownExtension` when no scope in the chain attached `name`.
    pub fn extension(&self, name: &str, args: &[Bson]) -> Result<ExtensionValue> {
        let f = self
            .extensions
            .as_ref()
            .and_then(|e| e.get(name))
            .ok_or_else(|| OdmError::UnknownExtension(name.to_string()))?;
        Ok(match f(self, args)? {
            ExtensionValue::Criteria(mut c) => {
                if c.extensions.is_none() {
                    c.extensions.clone_from(&self.extensions);
                }
                ExtensionValue::Criteria(c)
            }
            other => other,
        })
    }
}
