use super::Criteria;
use crate::backend::UpdateReport;
use crate::document::Document;
use crate::errors::Result;
use bson::{Bson, Document as BsonDocument, doc};

/// Plain attribute documents are applied as `$set`.
fn as_update(update: BsonDocument) -> BsonDocument {
    if update.keys().any(|k| k.starts_with('$')) { update } else { doc! { "$set": update } }
}

impl Criteria {
    fn after_write(&self, op: &str, affected: u64) {
        self.odm.clear_query_cache();
        log::debug!(
            target: "nexusodm::write",
            "{op} on {} affected {affected} document(s)",
            self.model.collection()
        );
    }

    /// Inserts a document seeded from the chain's literal conditions, with
    /// `attributes` on top.
    ///
    /// # Errors
    /// `IllegalKey` and other backend failures.
    pub fn create(&self, attributes: BsonDocument) -> Result<Document> {
        let mut doc = self.new_document();
        for (k, v) in attributes {
            doc.set(&k, v);
        }
        let id = self.odm.backend().insert(self.model.collection(), doc.attributes().clone())?;
        doc.mark_persisted(id);
        self.after_write("insert", 1);
        Ok(doc)
    }

    fn write(&self, update: BsonDocument, multi: bool) -> Result<UpdateReport> {
        let report = self.odm.backend().update(
            self.model.collection(),
            &self.selector(),
            &as_update(update),
            multi,
        )?;
        self.after_write(if multi { "update_all" } else { "update" }, report.modified);
        Ok(report)
    }

    /// Updates the first match.
    ///
    /// # Errors
    /// Backend failures.
    pub fn update(&self, update: BsonDocument) -> Result<UpdateReport> {
        self.write(update, false)
    }

    /// # Errors
    /// Backend failures.
    pub fn update_all(&self, update: BsonDocument) -> Result<UpdateReport> {
        self.write(update, true)
    }

    /// Removes every match without loading it.
    ///
    /// # Errors
    /// Backend failures.
    pub fn delete(&self) -> Result<u64> {
        let report = self.odm.backend().delete(self.model.collection(), &self.selector(), true)?;
        self.after_write("delete", report.deleted);
        Ok(report.deleted)
    }

    /// Loads every match, runs the model's teardown hook on it, then removes it.
    ///
    /// # Errors
    /// The first error of the hook or the backend; documents handled before
    /// it stay removed.
    pub fn destroy(&self) -> Result<u64> {
        let docs = self.to_vec()?;
        let mut removed = 0;
        for d in &docs {
            if let Some(hook) = self.model.teardown() {
                hook(d)?;
            }
            let Some(id) = d.id() else { continue };
            removed += self
                .odm
                .backend()
                .delete(self.model.collection(), &doc! { "_id": id.clone() }, false)?
                .deleted;
        }
        self.after_write("destroy", removed);
        Ok(removed)
    }

    fn atomic(&self, op: &str, field: &str, value: Bson) -> Result<UpdateReport> {
        let field = if field == "id" { "_id" } else { field };
        self.write(doc! { op: { field: value } }, true)
    }

    /// # Errors
    /// Backend failures.
    pub fn inc(&self, field: &str, by: impl Into<Bson>) -> Result<UpdateReport> {
        self.atomic("$inc", field, by.into())
    }

    /// # Errors
    /// Backend failures.
    pub fn set(&self, field: &str, value: impl Into<Bson>) -> Result<UpdateReport> {
        self.atomic("$set", field, value.into())
    }

    /// # Errors
    /// Backend failures.
    pub fn unset(&self, field: &str) -> Result<UpdateReport> {
        self.atomic("$unset", field, Bson::String(String::new()))
    }

    /// # Errors
    /// Backend failures.
    pub fn push(&self, field: &str, value: impl Into<Bson>) -> Result<UpdateReport> {
        self.atomic("$push", field, value.into())
    }

    /// # Errors
    /// Backend failures.
    pub fn pull(&self, field: &str, value: impl Into<Bson>) -> Result<UpdateReport> {
        self.atomic("$pull", field, value.into())
    }

    /// # Errors
    /// Backend failures.
    pub fn add_to_set(&self, field: &str, value: impl Into<Bson>) -> Result<UpdateReport> {
        self.atomic("$addToSet", field, value.into())
    }

    /// Removes the first element of the array when `first` is true, else the last.
    ///
    /// # Errors
    /// Backend failures.
    pub fn pop(&self, field: &str, first: bool) -> Result<UpdateReport> {
        self.atomic("$pop", field, Bson::Int32(if first { -1 } else { 1 }))
    }

    /// # Errors
    /// Backend failures.
    pub fn rename(&self, from: &str, to: &str) -> Result<UpdateReport> {
        self.atomic("$rename", from, Bson::String(to.to_string()))
    }

    /// Bitwise update, e.g. `bit("flags", doc! { "and": 6, "or": 1 })`.
    ///
    /// # Errors
    /// Backend failures.
    pub fn bit(&self, field: &str, ops: BsonDocument) -> Result<UpdateReport> {
        self.atomic("$bit", field, Bson::Document(ops))
    }
}
