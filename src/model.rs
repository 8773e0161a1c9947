//! Model metadata consumed by the query engine: field types for value
//! coercion, association descriptors for eager loading and `elem_match`
//! validation, the scope registry, and the teardown hook used by `destroy`.

use crate::criteria::Criteria;
use crate::document::Document;
use crate::errors::Result;
use crate::scope::{Extensions, Scope, ScopeBody, ScopeRegistry};
use crate::selector::Conditions;
use bson::Bson;
use bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;

/// Declared type of a field; drives how query operands are coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    #[default]
    Any,
    String,
    Integer,
    Float,
    Boolean,
    ObjectId,
    Array,
    Document,
}

impl FieldType {
    /// Best-effort conversion of a query operand to this type. Values that
    /// don't convert are passed through untouched and left to the backend.
    #[must_use]
    pub fn coerce(self, value: Bson) -> Bson {
        match (self, value) {
            (Self::String, Bson::Int32(i)) => Bson::String(i.to_string()),
            (Self::String, Bson::Int64(i)) => Bson::String(i.to_string()),
            (Self::String, Bson::ObjectId(o)) => Bson::String(o.to_hex()),
            (Self::Integer, Bson::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Bson::Int64(i),
                Err(_) => Bson::String(s),
            },
            #[allow(clippy::cast_possible_truncation)]
            (Self::Integer, Bson::Double(f)) if f.fract() == 0.0 && f.is_finite() => {
                Bson::Int64(f as i64)
            }
            (Self::Float, Bson::Int32(i)) => Bson::Double(f64::from(i)),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float, Bson::Int64(i)) => Bson::Double(i as f64),
            (Self::Float, Bson::String(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Bson::Double(f),
                Err(_) => Bson::String(s),
            },
            (Self::Boolean, Bson::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Bson::Boolean(true),
                "false" | "0" | "no" => Bson::Boolean(false),
                _ => Bson::String(s),
            },
            (Self::Boolean, Bson::Int32(i)) => Bson::Boolean(i != 0),
            (Self::Boolean, Bson::Int64(i)) => Bson::Boolean(i != 0),
            (Self::ObjectId, Bson::String(s)) => match ObjectId::parse_str(&s) {
                Ok(o) => Bson::ObjectId(o),
                Err(_) => Bson::String(s),
            },
            (_, v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    HasMany,
    HasOne,
    BelongsTo,
    HasAndBelongsToMany,
    EmbedsMany,
    EmbedsOne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub name: String,
    pub kind: AssociationKind,
    /// Target model name; empty for polymorphic belongs-to.
    pub target: String,
    pub foreign_key: String,
    pub polymorphic: bool,
}

impl Association {
    #[must_use]
    pub const fn is_embedded(&self) -> bool {
        matches!(self.kind, AssociationKind::EmbedsMany | AssociationKind::EmbedsOne)
    }
}

/// Per-document teardown invoked by `Criteria::destroy` before removal.
pub type TeardownHook = Arc<dyn Fn(&Document) -> Result<()> + Send + Sync>;

/// An immutable model definition. Built with [`ModelBuilder`] and published
/// through [`crate::Odm::define`].
pub struct Model {
    name: String,
    collection: String,
    fields: HashMap<String, FieldType>,
    associations: HashMap<String, Association>,
    scopes: ScopeRegistry,
    teardown: Option<TeardownHook>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("fields", &self.fields)
            .field("associations", &self.associations.keys().collect::<Vec<_>>())
            .field("scopes", &self.scopes.names())
            .finish_non_exhaustive()
    }
}

impl Model {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn field_type(&self, field: &str) -> FieldType {
        let field = if field == "id" { "_id" } else { field };
        self.fields.get(field).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    #[must_use]
    pub const fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    #[must_use]
    pub fn teardown(&self) -> Option<&TeardownHook> {
        self.teardown.as_ref()
    }
}

/// Collection name derived from a model name: `BandMember` -> `band_members`.
#[must_use]
pub fn default_collection_name(model: &str) -> String {
    let mut out = String::with_capacity(model.len() + 2);
    for (i, ch) in model.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    if !out.ends_with('s') {
        out.push('s');
    }
    out
}

pub struct ModelBuilder {
    name: String,
    collection: Option<String>,
    fields: HashMap<String, FieldType>,
    associations: HashMap<String, Association>,
    scopes: ScopeRegistry,
    teardown: Option<TeardownHook>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let mut fields = HashMap::new();
        fields.insert("_id".to_string(), FieldType::ObjectId);
        Self {
            name: name.into(),
            collection: None,
            fields,
            associations: HashMap::new(),
            scopes: ScopeRegistry::default(),
            teardown: None,
        }
    }

    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    fn associate(
        mut self,
        name: &str,
        kind: AssociationKind,
        target: &str,
        foreign_key: &str,
        polymorphic: bool,
    ) -> Self {
        self.associations.insert(
            name.to_string(),
            Association {
                name: name.to_string(),
                kind,
                target: target.to_string(),
                foreign_key: foreign_key.to_string(),
                polymorphic,
            },
        );
        self
    }

    /// Children of `target` carry `foreign_key` pointing at this model's `_id`.
    #[must_use]
    pub fn has_many(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.associate(name, AssociationKind::HasMany, target, foreign_key, false)
    }

    #[must_use]
    pub fn has_one(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.associate(name, AssociationKind::HasOne, target, foreign_key, false)
    }

    /// This model carries `foreign_key` pointing at the `target`'s `_id`.
    #[must_use]
    pub fn belongs_to(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.associate(name, AssociationKind::BelongsTo, target, foreign_key, false)
    }

    /// Target type is stored per document, so no single collection can be
    /// batch-loaded.
    #[must_use]
    pub fn belongs_to_polymorphic(self, name: &str, foreign_key: &str) -> Self {
        self.associate(name, AssociationKind::BelongsTo, "", foreign_key, true)
    }

    /// This model carries an array of target ids in `foreign_key`.
    #[must_use]
    pub fn has_and_belongs_to_many(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.associate(name, AssociationKind::HasAndBelongsToMany, target, foreign_key, false)
    }

    #[must_use]
    pub fn embeds_many(self, name: &str, target: &str) -> Self {
        self.associate(name, AssociationKind::EmbedsMany, target, name, false)
    }

    #[must_use]
    pub fn embeds_one(self, name: &str, target: &str) -> Self {
        self.associate(name, AssociationKind::EmbedsOne, target, name, false)
    }

    #[must_use]
    pub fn scope(mut self, name: &str, conditions: impl Into<Conditions>) -> Self {
        self.scopes.register(Scope::new(name, ScopeBody::Conditions(conditions.into()), None));
        self
    }

    #[must_use]
    pub fn scope_fn<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Criteria, &[Bson]) -> Result<Criteria> + Send + Sync + 'static,
    {
        self.scopes.register(Scope::new(name, ScopeBody::Lambda(Arc::new(f)), None));
        self
    }

    /// A scope whose resulting criteria also gains `extensions`.
    #[must_use]
    pub fn scope_with_extensions(mut self, name: &str, body: ScopeBody, extensions: Extensions) -> Self {
        self.scopes.register(Scope::new(name, body, Some(Arc::new(extensions))));
        self
    }

    #[must_use]
    pub fn default_scope<F>(mut self, f: F) -> Self
    where
        F: Fn(Criteria) -> Result<Criteria> + Send + Sync + 'static,
    {
        self.scopes.set_default(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Document) -> Result<()> + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> Model {
        let collection = self.collection.unwrap_or_else(|| default_collection_name(&self.name));
        Model {
            name: self.name,
            collection,
            fields: self.fields,
            associations: self.associations,
            scopes: self.scopes,
            teardown: self.teardown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_are_snake_plural() {
        assert_eq!(default_collection_name("Band"), "bands");
        assert_eq!(default_collection_name("BandMember"), "band_members");
        assert_eq!(default_collection_name("Address"), "address");
    }

    #[test]
    fn coercion_follows_declared_type() {
        assert_eq!(FieldType::Integer.coerce(Bson::String("42".into())), Bson::Int64(42));
        assert_eq!(FieldType::Integer.coerce(Bson::String("x".into())), Bson::String("x".into()));
        assert_eq!(FieldType::Float.coerce(Bson::Int32(2)), Bson::Double(2.0));
        assert_eq!(FieldType::Boolean.coerce(Bson::String("true".into())), Bson::Boolean(true));
        assert_eq!(FieldType::String.coerce(Bson::Int32(5)), Bson::String("5".into()));
        let oid = ObjectId::new();
        assert_eq!(FieldType::ObjectId.coerce(Bson::String(oid.to_hex())), Bson::ObjectId(oid));
        assert_eq!(FieldType::Any.coerce(Bson::Int32(1)), Bson::Int32(1));
    }

    #[test]
    fn id_alias_resolves_to_underscore_id() {
        let m = ModelBuilder::new("Band").build();
        assert_eq!(m.field_type("id"), FieldType::ObjectId);
        assert_eq!(m.field_type("unknown"), FieldType::Any);
    }
}
