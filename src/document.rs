//! Model instances as returned by queries or built from criteria.

use crate::errors::{OdmError, Result};
use crate::types::{MAX_PATH_DEPTH, Projection};
use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    model: String,
    attributes: BsonDocument,
    projection: Option<Projection>,
    new_record: bool,
    relations: HashMap<String, Vec<Document>>,
}

impl Document {
    /// An unsaved instance.
    #[must_use]
    pub fn new(model: &str, attributes: BsonDocument) -> Self {
        Self {
            model: model.to_string(),
            attributes,
            projection: None,
            new_record: true,
            relations: HashMap::new(),
        }
    }

    /// An instance materialized from a backend result under `projection`.
    #[must_use]
    pub fn loaded(model: &str, attributes: BsonDocument, projection: Option<Projection>) -> Self {
        Self {
            model: model.to_string(),
            attributes,
            projection,
            new_record: false,
            relations: HashMap::new(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn id(&self) -> Option<&Bson> {
        self.attributes.get("_id")
    }

    #[must_use]
    pub const fn is_new_record(&self) -> bool {
        self.new_record
    }

    pub(crate) fn mark_persisted(&mut self, id: Bson) {
        self.attributes.insert("_id", id);
        self.new_record = false;
    }

    /// Reads a (possibly dotted) field.
    ///
    /// `Ok(None)` means the field is absent from the stored document.
    ///
    /// # Errors
    /// `MissingAttribute` when the query that loaded this document excluded the field.
    pub fn get(&self, field: &str) -> Result<Option<&Bson>> {
        if let Some(p) = &self.projection
            && !p.allows(field)
        {
            return Err(OdmError::MissingAttribute {
                model: self.model.clone(),
                field: field.to_string(),
            });
        }
        Ok(get_path(&self.attributes, field))
    }

    /// # Errors
    /// See [`Document::get`].
    pub fn get_str(&self, field: &str) -> Result<Option<&str>> {
        Ok(self.get(field)?.and_then(Bson::as_str))
    }

    pub fn set(&mut self, field: &str, value: impl Into<Bson>) {
        self.attributes.insert(field, value.into());
    }

    /// Raw attribute access that bypasses projection checks.
    #[must_use]
    pub const fn attributes(&self) -> &BsonDocument {
        &self.attributes
    }

    #[must_use]
    pub fn into_attributes(self) -> BsonDocument {
        self.attributes
    }

    /// Eager-loaded documents of an association; `None` when not loaded.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&[Document]> {
        self.relations.get(name).map(Vec::as_slice)
    }

    pub(crate) fn attach_relation(&mut self, name: &str, docs: Vec<Document>) {
        self.relations.insert(name.to_string(), docs);
    }

    /// Drops every eager-loaded association so the next access goes back to the backend.
    pub fn reload_relations(&mut self) {
        self.relations.clear();
    }
}

/// Resolves a dotted path through nested documents.
#[must_use]
pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.split('.').nth(MAX_PATH_DEPTH).is_some() {
        return None;
    }
    let mut cur = doc;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let v = cur.get(part)?;
        if parts.peek().is_none() {
            return Some(v);
        }
        match v {
            Bson::Document(d) => cur = d,
            _ => return None,
        }
    }
    None
}
