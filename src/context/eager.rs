//! Batched association loading: one query per included association per
//! fetched batch, whatever the number of parents.

use crate::criteria::Criteria;
use crate::document::Document;
use crate::errors::{OdmError, Result};
use crate::model::{Association, AssociationKind};
use crate::types::value_key;
use bson::Bson;
use std::collections::{HashMap, HashSet};

fn unique(values: impl IntoIterator<Item = Bson>) -> Vec<Bson> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(value_key(v))).collect()
}

fn non_null(v: Option<&Bson>) -> Option<&Bson> {
    v.filter(|b| !matches!(b, Bson::Null))
}

fn group_by(docs: Vec<Document>, field: &str) -> HashMap<String, Vec<Document>> {
    let mut out: HashMap<String, Vec<Document>> = HashMap::new();
    for d in docs {
        let keys: Vec<String> = match non_null(d.attributes().get(field)) {
            Some(Bson::Array(items)) => items.iter().map(value_key).collect(),
            Some(v) => vec![value_key(v)],
            None => continue,
        };
        for k in keys {
            out.entry(k).or_default().push(d.clone());
        }
    }
    out
}

/// Attaches every association in `inclusions` to `docs`.
///
/// # Errors
/// `InvalidIncludes` if an association vanished from the model; backend
/// failures of the lookups.
pub(crate) fn preload(criteria: &Criteria, inclusions: &[String], docs: &mut [Document]) -> Result<()> {
    if docs.is_empty() {
        return Ok(());
    }
    let model = criteria.model();
    for name in inclusions {
        let assoc = model.association(name).ok_or_else(|| OdmError::InvalidIncludes {
            model: model.name().to_string(),
            message: format!("no association named '{name}'"),
        })?;
        let target = criteria.odm().criteria(&assoc.target)?;
        log::debug!(
            target: "nexusodm::query",
            "eager loading {}.{name} for {} documents",
            model.name(),
            docs.len()
        );
        match assoc.kind {
            AssociationKind::BelongsTo => load_belongs_to(&target, assoc, docs)?,
            AssociationKind::HasMany | AssociationKind::HasOne => load_children(&target, assoc, docs)?,
            AssociationKind::HasAndBelongsToMany => load_many_to_many(&target, assoc, docs)?,
            AssociationKind::EmbedsMany | AssociationKind::EmbedsOne => {}
        }
    }
    Ok(())
}

fn load_belongs_to(target: &Criteria, assoc: &Association, docs: &mut [Document]) -> Result<()> {
    let fks = unique(docs.iter().filter_map(|d| non_null(d.attributes().get(&assoc.foreign_key)).cloned()));
    let by_id = if fks.is_empty() { HashMap::new() } else { group_by(target.in_("_id", fks)?.to_vec()?, "_id") };
    for d in docs.iter_mut() {
        let related = non_null(d.attributes().get(&assoc.foreign_key))
            .and_then(|fk| by_id.get(&value_key(fk)))
            .cloned()
            .unwrap_or_default();
        d.attach_relation(&assoc.name, related);
    }
    Ok(())
}

fn load_children(target: &Criteria, assoc: &Association, docs: &mut [Document]) -> Result<()> {
    let ids = unique(docs.iter().filter_map(|d| d.id().cloned()));
    let children = if ids.is_empty() {
        HashMap::new()
    } else {
        group_by(target.in_(&assoc.foreign_key, ids)?.to_vec()?, &assoc.foreign_key)
    };
    for d in docs.iter_mut() {
        let mut related =
            d.id().and_then(|id| children.get(&value_key(id))).cloned().unwrap_or_default();
        if assoc.kind == AssociationKind::HasOne {
            related.truncate(1);
        }
        d.attach_relation(&assoc.name, related);
    }
    Ok(())
}

fn load_many_to_many(target: &Criteria, assoc: &Association, docs: &mut [Document]) -> Result<()> {
    let ids_of = |d: &Document| -> Vec<Bson> {
        match d.attributes().get(&assoc.foreign_key) {
            Some(Bson::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };
    let all = unique(docs.iter().flat_map(ids_of));
    let by_id = if all.is_empty() { HashMap::new() } else { group_by(target.in_("_id", all)?.to_vec()?, "_id") };
    for d in docs.iter_mut() {
        let related = ids_of(d)
            .iter()
            .filter_map(|id| by_id.get(&value_key(id)))
            .flatten()
            .cloned()
            .collect();
        d.attach_relation(&assoc.name, related);
    }
    Ok(())
}
