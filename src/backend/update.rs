use super::eval::matches;
use crate::errors::{OdmError, Result};
use crate::selector::is_operator_document;
use crate::utils::num::{bson_as_f64, bson_as_i64};
use bson::{Bson, Document as BsonDocument};

/// Applies an update document to `doc`. Documents without `$` operators
/// replace everything but `_id`. Returns whether anything changed.
///
/// # Errors
/// `Backend` for unknown operators or operands of the wrong type.
pub fn apply_update(doc: &mut BsonDocument, update: &BsonDocument) -> Result<bool> {
    if !update.keys().any(|k| k.starts_with('$')) {
        let id = doc.get("_id").cloned();
        let mut replacement = update.clone();
        if let Some(id) = id {
            replacement.insert("_id", id);
        }
        let changed = *doc != replacement;
        *doc = replacement;
        return Ok(changed);
    }
    let mut changed = false;
    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| OdmError::Backend(format!("{op} expects a document")))?;
        for (path, operand) in fields {
            changed |= match op.as_str() {
                "$set" => set_path(doc, path, operand.clone()),
                "$unset" => unset_path(doc, path),
                "$inc" => inc_path(doc, path, operand)?,
                "$push" => push_path(doc, path, operand, false),
                "$addToSet" => push_path(doc, path, operand, true),
                "$pull" => pull_path(doc, path, operand),
                "$pop" => pop_path(doc, path, operand),
                "$rename" => rename_path(doc, path, operand)?,
                "$bit" => bit_path(doc, path, operand)?,
                other => return Err(OdmError::Backend(format!("unknown update operator {other}"))),
            };
        }
    }
    Ok(changed)
}

fn ensure_subdoc<'a>(root: &'a mut BsonDocument, key: &str) -> &'a mut BsonDocument {
    if !matches!(root.get(key), Some(Bson::Document(_))) {
        root.insert(key, Bson::Document(BsonDocument::new()));
    }
    match root.get_mut(key) {
        Some(Bson::Document(d)) => d,
        _ => unreachable!("subdocument inserted above"),
    }
}

fn traverse_to_parent<'a>(root: &'a mut BsonDocument, path: &str) -> (&'a mut BsonDocument, String) {
    match path.rsplit_once('.') {
        None => (root, path.to_string()),
        Some((parents, last)) => {
            let mut cur = root;
            for seg in parents.split('.') {
                cur = ensure_subdoc(cur, seg);
            }
            (cur, last.to_string())
        }
    }
}

fn get_path(root: &BsonDocument, path: &str) -> Option<Bson> {
    crate::document::get_path(root, path).cloned()
}

fn set_path(root: &mut BsonDocument, path: &str, value: Bson) -> bool {
    let (parent, last) = traverse_to_parent(root, path);
    let old = parent.insert(last, value.clone());
    old.as_ref() != Some(&value)
}

fn unset_path(root: &mut BsonDocument, path: &str) -> bool {
    if get_path(root, path).is_none() {
        return false;
    }
    let (parent, last) = traverse_to_parent(root, path);
    parent.remove(&last).is_some()
}

fn inc_path(root: &mut BsonDocument, path: &str, by: &Bson) -> Result<bool> {
    let current = get_path(root, path).unwrap_or(Bson::Int32(0));
    let next = match (&current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => a.checked_add(*b).map_or_else(
            || Bson::Int64(i64::from(*a) + i64::from(*b)),
            Bson::Int32,
        ),
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let a = bson_as_i64(&current).unwrap_or(0);
            let b = bson_as_i64(by).unwrap_or(0);
            Bson::Int64(a.saturating_add(b))
        }
        _ => match (bson_as_f64(&current), bson_as_f64(by)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => return Err(OdmError::Backend(format!("$inc on non-numeric field {path}"))),
        },
    };
    Ok(set_path(root, path, next))
}

fn push_path(root: &mut BsonDocument, path: &str, operand: &Bson, unique: bool) -> bool {
    let items: Vec<Bson> = match operand {
        Bson::Document(d) if d.contains_key("$each") => {
            d.get("$each").and_then(Bson::as_array).cloned().unwrap_or_default()
        }
        other => vec![other.clone()],
    };
    let mut arr = match get_path(root, path) {
        Some(Bson::Array(a)) => a,
        _ => Vec::new(),
    };
    let before = arr.len();
    for item in items {
        if unique && arr.contains(&item) {
            continue;
        }
        arr.push(item);
    }
    let grew = arr.len() != before;
    set_path(root, path, Bson::Array(arr)) || grew
}

fn pull_path(root: &mut BsonDocument, path: &str, operand: &Bson) -> bool {
    let Some(Bson::Array(arr)) = get_path(root, path) else {
        return false;
    };
    let before = arr.len();
    let kept: Vec<Bson> = arr
        .into_iter()
        .filter(|item| match operand {
            Bson::Document(cond) if is_operator_document(cond) => {
                let wrapped = bson::doc! { "v": item.clone() };
                !matches(&wrapped, &bson::doc! { "v": Bson::Document(cond.clone()) })
            }
            Bson::Document(cond) => {
                !item.as_document().is_some_and(|d| matches(d, cond))
            }
            other => item != other,
        })
        .collect();
    let removed = kept.len() != before;
    set_path(root, path, Bson::Array(kept));
    removed
}

fn pop_path(root: &mut BsonDocument, path: &str, operand: &Bson) -> bool {
    let Some(Bson::Array(mut arr)) = get_path(root, path) else {
        return false;
    };
    if arr.is_empty() {
        return false;
    }
    if bson_as_i64(operand).unwrap_or(1) < 0 {
        arr.remove(0);
    } else {
        arr.pop();
    }
    set_path(root, path, Bson::Array(arr));
    true
}

fn rename_path(root: &mut BsonDocument, path: &str, operand: &Bson) -> Result<bool> {
    let to = operand
        .as_str()
        .ok_or_else(|| OdmError::Backend(format!("$rename target for {path} must be a string")))?;
    let Some(value) = get_path(root, path) else {
        return Ok(false);
    };
    unset_path(root, path);
    set_path(root, to, value);
    Ok(true)
}

fn bit_path(root: &mut BsonDocument, path: &str, operand: &Bson) -> Result<bool> {
    let ops = operand
        .as_document()
        .ok_or_else(|| OdmError::Backend(format!("$bit on {path} expects a document")))?;
    let mut value = get_path(root, path).as_ref().and_then(bson_as_i64).unwrap_or(0);
    for (op, arg) in ops {
        let arg = bson_as_i64(arg)
            .ok_or_else(|| OdmError::Backend(format!("$bit {op} on {path} expects an integer")))?;
        value = match op.as_str() {
            "and" => value & arg,
            "or" => value | arg,
            "xor" => value ^ arg,
            other => return Err(OdmError::Backend(format!("unknown $bit operation {other}"))),
        };
    }
    let next = i32::try_from(value).map_or(Bson::Int64(value), Bson::Int32);
    Ok(set_path(root, path, next))
}
