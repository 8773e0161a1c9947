use super::Criteria;
use crate::backend::{QuerySpec, compare_bson};
use crate::context::ExecutionContext;
use crate::document::{Document, get_path};
use crate::errors::{OdmError, Result};
use crate::model::AssociationKind;
use crate::selector::{Conditions, field, seedable_attributes};
use crate::types::{IdSort, Order, Projection, SortSpec, id_to_string, sort_document, value_key};
use crate::utils::num::bson_as_f64;
use bson::{Bson, Document as BsonDocument, doc};
use std::collections::HashMap;

impl Criteria {
    /// The query the backend will receive.
    #[must_use]
    pub fn query_spec(&self) -> QuerySpec {
        let parts = self.effective();
        QuerySpec {
            selector: parts.selector,
            projection: parts
                .projection
                .as_ref()
                .map(|p| self.with_join_keys(p, &parts.inclusions).to_document()),
            sort: (!parts.sort.is_empty()).then(|| sort_document(&parts.sort)),
            limit: parts.options.limit,
            skip: parts.options.skip,
            batch_size: parts.options.batch_size.or(self.odm.config().default_batch_size),
        }
    }

    /// `projection` widened so eager loading still sees the keys it joins on:
    /// foreign keys for belongs-to and many-to-many, `_id` for children.
    /// Documents keep the narrower projection for attribute access.
    fn with_join_keys(&self, projection: &Projection, inclusions: &[String]) -> Projection {
        let keys: Vec<&str> = inclusions
            .iter()
            .filter_map(|name| self.model.association(name))
            .map(|a| match a.kind {
                AssociationKind::BelongsTo | AssociationKind::HasAndBelongsToMany => a.foreign_key.as_str(),
                _ => "_id",
            })
            .collect();
        match projection {
            Projection::Only(fields) => {
                let mut fields = fields.clone();
                for k in keys {
                    if k != "_id" && !fields.iter().any(|f| f == k) {
                        fields.push(k.to_string());
                    }
                }
                Projection::Only(fields)
            }
            Projection::Without(fields) => {
                Projection::Without(fields.iter().filter(|f| !keys.contains(&f.as_str())).cloned().collect())
            }
        }
    }

    /// A lazy iterator over matching documents. Each call runs the query anew.
    #[must_use]
    pub fn iter(&self) -> ExecutionContext {
        ExecutionContext::new(self)
    }

    /// # Errors
    /// Backend failures, or the first error `f` returns.
    pub fn each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Document) -> Result<()>,
    {
        for d in self.iter() {
            f(d?)?;
        }
        Ok(())
    }

    /// # Errors
    /// Backend failures.
    pub fn to_vec(&self) -> Result<Vec<Document>> {
        self.iter().collect()
    }

    /// Matching documents counted by the backend on every call.
    ///
    /// # Errors
    /// Backend failures.
    pub fn count(&self) -> Result<u64> {
        let spec = self.query_spec();
        self.odm.backend().count(self.model.collection(), &spec.selector, spec.skip, spec.limit)
    }

    /// Like [`Criteria::count`] but remembered on this instance.
    ///
    /// # Errors
    /// Backend failures.
    pub fn size(&self) -> Result<u64> {
        if let Some(n) = self.count_cache.get() {
            return Ok(*n);
        }
        let n = self.count()?;
        Ok(*self.count_cache.get_or_init(|| n))
    }

    /// # Errors
    /// Backend failures.
    pub fn length(&self) -> Result<u64> {
        self.size()
    }

    /// # Errors
    /// Backend failures.
    pub fn distinct(&self, field: &str) -> Result<Vec<Bson>> {
        let field = if field == "id" { "_id" } else { field };
        self.odm.backend().distinct(self.model.collection(), field, &self.selector())
    }

    /// Whether anything matches; fetches at most one `_id`.
    ///
    /// # Errors
    /// Backend failures.
    pub fn exists(&self) -> Result<bool> {
        let spec = QuerySpec {
            projection: Some(doc! { "_id": 1 }),
            limit: Some(1),
            sort: None,
            ..self.query_spec()
        };
        let mut cursor = self.odm.backend().find(self.model.collection(), &spec)?;
        let found = cursor.next_batch();
        cursor.close();
        Ok(found?.is_some_and(|b| !b.is_empty()))
    }

    fn raise_not_found(&self) -> bool {
        self.odm.config().raise_not_found_error
    }

    fn lookup_ids(&self, ids: Vec<Bson>) -> Result<Vec<Document>> {
        let id_type = self.model.field_type("_id");
        let ids: Vec<Bson> = {
            let mut seen = std::collections::HashSet::new();
            ids.into_iter().map(|id| id_type.coerce(id)).filter(|id| seen.insert(value_key(id))).collect()
        };
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut by_id: HashMap<String, Document> = self
            .and((field("_id").in_(), ids.clone()))?
            .to_vec()?
            .into_iter()
            .filter_map(|d| d.id().map(value_key).map(|k| (k, d)))
            .collect();
        let missing: Vec<String> =
            ids.iter().filter(|id| !by_id.contains_key(&value_key(id))).map(id_to_string).collect();
        if !missing.is_empty() && self.raise_not_found() {
            return Err(OdmError::DocumentNotFound { model: self.model.name().to_string(), ids: missing });
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(&value_key(id))).collect())
    }

    /// Finds one document by id.
    ///
    /// # Errors
    /// `DocumentNotFound` when nothing matches and `raise_not_found_error` is on.
    pub fn find(&self, id: impl Into<Bson>) -> Result<Option<Document>> {
        Ok(self.lookup_ids(vec![id.into()])?.into_iter().next())
    }

    /// Finds documents by id, in the order requested.
    ///
    /// # Errors
    /// `DocumentNotFound` naming every missing id when `raise_not_found_error`
    /// is on; otherwise the found subset is returned.
    pub fn find_many<I, V>(&self, ids: I) -> Result<Vec<Document>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.lookup_ids(ids.into_iter().map(Into::into).collect())
    }

    fn not_found_by(&self, c: &Self) -> OdmError {
        OdmError::DocumentNotFoundBy {
            model: self.model.name().to_string(),
            conditions: c.explicit_parts().selector.to_string(),
        }
    }

    /// # Errors
    /// `DocumentNotFoundBy` when nothing matches and `raise_not_found_error` is on.
    pub fn find_by(&self, conditions: impl Into<Conditions>) -> Result<Option<Document>> {
        let c = self.where_(conditions)?;
        match c.first()? {
            None if self.raise_not_found() => Err(self.not_found_by(&c)),
            found => Ok(found),
        }
    }

    /// # Errors
    /// `DocumentNotFoundBy` whenever nothing matches.
    pub fn find_by_strict(&self, conditions: impl Into<Conditions>) -> Result<Document> {
        let c = self.where_(conditions)?;
        c.first()?.ok_or_else(|| self.not_found_by(&c))
    }

    /// Sort used by `first`/`last`: the chain's sort plus an `_id` tie-breaker.
    fn positional_sort(&self) -> Vec<SortSpec> {
        let parts = self.effective();
        let mut sort = parts.sort;
        if parts.options.id_sort != Some(IdSort::None) && !sort.iter().any(|s| s.field == "_id") {
            sort.push(SortSpec::new("_id", Order::Asc));
        }
        sort
    }

    fn window(&self, sort: Vec<SortSpec>, n: u64) -> Self {
        let mut next = self.reorder(sort);
        next.parts.options.limit = Some(n);
        next
    }

    /// # Errors
    /// Backend failures.
    pub fn first_n(&self, n: u64) -> Result<Vec<Document>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.window(self.positional_sort(), n).to_vec()
    }

    /// The last `n` documents, returned in ascending sort order.
    ///
    /// # Errors
    /// Backend failures.
    pub fn last_n(&self, n: u64) -> Result<Vec<Document>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let sort = self.positional_sort();
        if sort.is_empty() {
            let mut all = self.to_vec()?;
            let keep = usize::try_from(n).unwrap_or(usize::MAX).min(all.len());
            return Ok(all.split_off(all.len() - keep));
        }
        let inverted = sort.into_iter().map(|s| SortSpec::new(s.field, s.order.reverse())).collect();
        let mut docs = self.window(inverted, n).to_vec()?;
        docs.reverse();
        Ok(docs)
    }

    /// # Errors
    /// Backend failures.
    pub fn first(&self) -> Result<Option<Document>> {
        Ok(self.first_n(1)?.into_iter().next())
    }

    /// # Errors
    /// Backend failures.
    pub fn last(&self) -> Result<Option<Document>> {
        Ok(self.last_n(1)?.pop())
    }

    fn plucked(&self, fields: &[&str]) -> Result<Vec<Vec<Bson>>> {
        let fields: Vec<&str> = fields.iter().map(|f| if *f == "id" { "_id" } else { *f }).collect();
        let mut projection = BsonDocument::new();
        for f in &fields {
            projection.insert(*f, 1);
        }
        if !fields.contains(&"_id") {
            projection.insert("_id", 0);
        }
        let spec = QuerySpec { projection: Some(projection), ..self.query_spec() };
        let mut cursor = self.odm.backend().find(self.model.collection(), &spec)?;
        let mut rows = Vec::new();
        loop {
            let batch = match cursor.next_batch() {
                Ok(Some(b)) => b,
                Ok(None) => break,
                Err(e) => {
                    cursor.close();
                    return Err(e);
                }
            };
            for raw in batch {
                rows.push(
                    fields.iter().map(|f| get_path(&raw, f).cloned().unwrap_or(Bson::Null)).collect(),
                );
            }
        }
        cursor.close();
        Ok(rows)
    }

    /// Values of `field` for every match; `Null` where the field is absent.
    ///
    /// # Errors
    /// Backend failures.
    pub fn pluck(&self, field: &str) -> Result<Vec<Bson>> {
        Ok(self.plucked(&[field])?.into_iter().filter_map(|mut row| row.pop()).collect())
    }

    /// # Errors
    /// Backend failures.
    pub fn pluck_many(&self, fields: &[&str]) -> Result<Vec<Vec<Bson>>> {
        self.plucked(fields)
    }

    fn numbers(&self, field: &str) -> Result<Vec<f64>> {
        Ok(self.pluck(field)?.iter().filter_map(bson_as_f64).collect())
    }

    /// Sum of the numeric values of `field`; non-numeric values are skipped.
    ///
    /// # Errors
    /// Backend failures.
    pub fn sum(&self, field: &str) -> Result<f64> {
        Ok(self.numbers(field)?.iter().sum())
    }

    /// # Errors
    /// Backend failures.
    pub fn avg(&self, field: &str) -> Result<Option<f64>> {
        let values = self.numbers(field)?;
        if values.is_empty() {
            return Ok(None);
        }
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        Ok(Some(values.iter().sum::<f64>() / n))
    }

    /// # Errors
    /// Backend failures.
    pub fn min(&self, field: &str) -> Result<Option<Bson>> {
        Ok(self.pluck(field)?.into_iter().filter(|v| !matches!(v, Bson::Null)).min_by(compare_bson))
    }

    /// # Errors
    /// Backend failures.
    pub fn max(&self, field: &str) -> Result<Option<Bson>> {
        Ok(self.pluck(field)?.into_iter().filter(|v| !matches!(v, Bson::Null)).max_by(compare_bson))
    }

    /// An unsaved document seeded from the literal conditions of the chain,
    /// including the default scope's.
    #[must_use]
    pub fn new_document(&self) -> Document {
        Document::new(self.model.name(), seedable_attributes(&self.selector()))
    }

    /// # Errors
    /// Backend failures; see [`Criteria::create`].
    pub fn find_or_create_by(&self, conditions: impl Into<Conditions>) -> Result<Document> {
        self.where_(conditions)?.first_or_create()
    }

    /// # Errors
    /// Backend failures.
    pub fn find_or_initialize_by(&self, conditions: impl Into<Conditions>) -> Result<Document> {
        self.where_(conditions)?.first_or_initialize()
    }

    /// # Errors
    /// Backend failures; see [`Criteria::create`].
    pub fn first_or_create(&self) -> Result<Document> {
        match self.first()? {
            Some(d) => Ok(d),
            None => self.create(BsonDocument::new()),
        }
    }

    /// # Errors
    /// Backend failures.
    pub fn first_or_initialize(&self) -> Result<Document> {
        Ok(self.first()?.unwrap_or_else(|| self.new_document()))
    }
}
