use super::conditions::Condition;
use super::key::Op;
use crate::errors::{OdmError, Result};
use crate::model::Model;
use crate::types::{MergeStrategy, value_key};
use bson::{Bson, Document as BsonDocument, doc};

/// A non-empty document whose keys are all `$`-operators.
#[must_use]
pub fn is_operator_document(d: &BsonDocument) -> bool {
    !d.is_empty() && d.keys().all(|k| k.starts_with('$'))
}

/// Merges one condition into `selector`.
///
/// - equality replaces whatever the field held
/// - an operator joins the field's operator mapping; a literal already on the
///   field is kept as `$eq` next to it
/// - `strategy` decides how list operands meet an existing list operator
///
/// # Errors
/// `UnsupportedQueryShape` for `elem_match` across a referenced association.
pub fn merge_condition(
    selector: &mut BsonDocument,
    condition: Condition,
    model: &Model,
    strategy: Option<MergeStrategy>,
) -> Result<()> {
    match condition {
        Condition::Field { key, value } => {
            if key.op == Op::ElemMatch {
                check_elem_match(model, &key.field)?;
            }
            let value = coerce(model, &key.field, key.op, value);
            match key.op.operator() {
                None => {
                    selector.insert(key.field, value);
                }
                Some("$regex") => {
                    // a new pattern brings its own flags
                    if let Some(Bson::Document(ops)) = selector.get_mut(&key.field)
                        && is_operator_document(ops)
                    {
                        ops.remove("$options");
                    }
                    match value {
                        Bson::Document(parts) => {
                            for (op, operand) in parts {
                                add_operator(selector, &key.field, &op, operand, None);
                            }
                        }
                        other => add_operator(selector, &key.field, "$regex", other, None),
                    }
                }
                Some(op) => add_operator(selector, &key.field, op, value, strategy),
            }
        }
        Condition::Extra { field, operator, value } => {
            add_operator(selector, &field, &operator, value, None);
        }
        Condition::Logical { operator, value } => merge_logical(selector, &operator, value),
    }
    Ok(())
}

fn check_elem_match(model: &Model, path: &str) -> Result<()> {
    let head = path.split('.').next().unwrap_or(path);
    if let Some(assoc) = model.association(head)
        && !assoc.is_embedded()
    {
        return Err(OdmError::UnsupportedQueryShape(format!(
            "elem_match on '{path}' of {}: '{head}' is a referenced association and cannot be matched in place",
            model.name()
        )));
    }
    Ok(())
}

fn coerce(model: &Model, field: &str, op: Op, value: Bson) -> Bson {
    let ty = model.field_type(field);
    match op {
        Op::Eq | Op::Gt | Op::Gte | Op::Lt | Op::Lte | Op::Ne => ty.coerce(value),
        Op::In | Op::Nin | Op::All => match value {
            Bson::Array(items) => Bson::Array(items.into_iter().map(|v| ty.coerce(v)).collect()),
            single => Bson::Array(vec![ty.coerce(single)]),
        },
        Op::Exists => match value {
            Bson::Boolean(_) => value,
            other => crate::model::FieldType::Boolean.coerce(other),
        },
        Op::Size => crate::model::FieldType::Integer.coerce(value),
        Op::ElemMatch | Op::Regex => value,
    }
}

fn add_operator(
    selector: &mut BsonDocument,
    field: &str,
    op: &str,
    value: Bson,
    strategy: Option<MergeStrategy>,
) {
    match selector.get_mut(field) {
        Some(Bson::Document(ops)) if is_operator_document(ops) => {
            let merged = match (ops.get(op), strategy) {
                (Some(Bson::Array(existing)), Some(s)) => combine_lists(existing, &value, s),
                _ => value,
            };
            ops.insert(op, merged);
        }
        Some(literal) => {
            let eq = literal.clone();
            *literal = Bson::Document(doc! { "$eq": eq, op: value });
        }
        None => {
            selector.insert(field, doc! { op: value });
        }
    }
}

fn combine_lists(existing: &[Bson], incoming: &Bson, strategy: MergeStrategy) -> Bson {
    let incoming: Vec<Bson> = match incoming {
        Bson::Array(a) => a.clone(),
        other => vec![other.clone()],
    };
    match strategy {
        MergeStrategy::Override => Bson::Array(incoming),
        MergeStrategy::Union => {
            let mut out = existing.to_vec();
            for v in incoming {
                if !out.iter().any(|e| value_key(e) == value_key(&v)) {
                    out.push(v);
                }
            }
            Bson::Array(out)
        }
        MergeStrategy::Intersect => Bson::Array(
            existing
                .iter()
                .filter(|e| incoming.iter().any(|v| value_key(v) == value_key(e)))
                .cloned()
                .collect(),
        ),
    }
}

fn merge_logical(selector: &mut BsonDocument, operator: &str, value: Bson) {
    match operator {
        "$and" => {
            let incoming = match value {
                Bson::Array(a) => a,
                other => vec![other],
            };
            match selector.get_mut("$and") {
                Some(Bson::Array(existing)) => existing.extend(incoming),
                _ => {
                    selector.insert("$and", Bson::Array(incoming));
                }
            }
        }
        "$or" | "$nor" if selector.contains_key(operator) => {
            // a second disjunction must hold as well, so it goes under $and
            merge_logical(selector, "$and", Bson::Array(vec![Bson::Document(doc! { operator: value })]));
        }
        _ => {
            selector.insert(operator, value);
        }
    }
}

/// Overlays `overlay` on `base` with the rules a chained `where` follows:
/// operator mappings on one field are unioned key by key, an operator meeting
/// a literal keeps the literal as `$eq`, a later literal replaces, and
/// logical operators go through the same path as [`merge_condition`].
#[must_use]
pub fn merge_selectors(base: &BsonDocument, overlay: &BsonDocument) -> BsonDocument {
    let mut out = base.clone();
    for (k, v) in overlay {
        if k.starts_with('$') {
            merge_logical(&mut out, k, v.clone());
            continue;
        }
        match v {
            Bson::Document(incoming) if is_operator_document(incoming) => {
                for (op, operand) in incoming {
                    add_operator(&mut out, k, op, operand.clone(), None);
                }
            }
            literal => {
                out.insert(k.clone(), literal.clone());
            }
        }
    }
    out
}

/// The part of a selector that can be written back as attribute values:
/// literal conditions on plain (non-dotted) fields. Operator conditions need
/// the backend to evaluate and dotted paths can't be assigned as a field.
#[must_use]
pub fn seedable_attributes(selector: &BsonDocument) -> BsonDocument {
    let mut out = BsonDocument::new();
    for (k, v) in selector {
        if k.starts_with('$') || k.contains('.') {
            continue;
        }
        if let Bson::Document(d) = v
            && is_operator_document(d)
        {
            continue;
        }
        out.insert(k.clone(), v.clone());
    }
    out
}
