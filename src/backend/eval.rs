use crate::document::get_path;
use crate::selector::is_operator_document;
use crate::types::{MAX_PATH_DEPTH, MAX_SORT_FIELDS};
use crate::utils::num::{bson_as_f64, bson_as_i64};
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

/// Evaluates a selector document against a stored document.
#[must_use]
pub fn matches(doc: &BsonDocument, selector: &BsonDocument) -> bool {
    selector.iter().all(|(k, cond)| match k.as_str() {
        "$and" => branches(cond).all(|b| matches(doc, b)),
        "$or" => branches(cond).any(|b| matches(doc, b)),
        "$nor" => !branches(cond).any(|b| matches(doc, b)),
        "$text" => text_matches(doc, cond),
        path => field_matches(doc, path, cond),
    })
}

fn branches(cond: &Bson) -> impl Iterator<Item = &BsonDocument> {
    cond.as_array().into_iter().flatten().filter_map(Bson::as_document)
}

/// Values found at `path`, descending into arrays of embedded documents.
fn values_at<'a>(doc: &'a BsonDocument, path: &str) -> Vec<&'a Bson> {
    fn walk<'a>(cur: &'a Bson, parts: &[&str], depth: usize, out: &mut Vec<&'a Bson>) {
        if depth > MAX_PATH_DEPTH {
            return;
        }
        let Some((head, rest)) = parts.split_first() else {
            out.push(cur);
            return;
        };
        match cur {
            Bson::Document(d) => {
                if let Some(v) = d.get(*head) {
                    walk(v, rest, depth + 1, out);
                }
            }
            Bson::Array(items) => {
                if let Ok(idx) = head.parse::<usize>() {
                    if let Some(v) = items.get(idx) {
                        walk(v, rest, depth + 1, out);
                    }
                } else {
                    for item in items {
                        walk(item, parts, depth + 1, out);
                    }
                }
            }
            _ => {}
        }
    }
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(v) = doc.get(parts[0]) {
        walk(v, &parts[1..], 1, &mut out);
    }
    out
}

fn field_matches(doc: &BsonDocument, path: &str, cond: &Bson) -> bool {
    let values = values_at(doc, path);
    match cond {
        Bson::Document(ops) if is_operator_document(ops) => {
            ops.iter().all(|(op, operand)| operator_matches(&values, op, operand, ops))
        }
        literal => any_equal(&values, literal),
    }
}

/// Equality with array membership: `{tags: "a"}` matches `tags: ["a", "b"]`.
fn any_equal(values: &[&Bson], target: &Bson) -> bool {
    if matches!(target, Bson::Null) && values.is_empty() {
        return true;
    }
    values.iter().any(|v| {
        bson_equal(v, target)
            || matches!(v, Bson::Array(items) if items.iter().any(|i| bson_equal(i, target)))
    })
}

fn flattened<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(values.len());
    for &v in values {
        match v {
            Bson::Array(items) => out.extend(items.iter()),
            other => out.push(other),
        }
    }
    out
}

fn operator_matches(values: &[&Bson], op: &str, operand: &Bson, all_ops: &BsonDocument) -> bool {
    match op {
        "$eq" => any_equal(values, operand),
        "$ne" => !any_equal(values, operand),
        "$gt" => cmp_any(values, operand, |o| o == Ordering::Greater),
        "$gte" => cmp_any(values, operand, |o| o != Ordering::Less),
        "$lt" => cmp_any(values, operand, |o| o == Ordering::Less),
        "$lte" => cmp_any(values, operand, |o| o != Ordering::Greater),
        "$in" => operand
            .as_array()
            .is_some_and(|set| set.iter().any(|s| in_member(values, s))),
        "$nin" => !operand
            .as_array()
            .is_some_and(|set| set.iter().any(|s| in_member(values, s))),
        "$all" => operand.as_array().is_some_and(|set| {
            !set.is_empty() && set.iter().all(|s| any_equal(values, s))
        }),
        "$exists" => {
            let want = match operand {
                Bson::Boolean(b) => *b,
                other => bson_as_i64(other).is_some_and(|n| n != 0),
            };
            values.is_empty() != want
        }
        "$size" => bson_as_i64(operand).is_some_and(|n| {
            values.iter().any(|v| matches!(v, Bson::Array(a) if i64::try_from(a.len()).ok() == Some(n)))
        }),
        "$elemMatch" => operand.as_document().is_some_and(|crit| {
            values.iter().any(|v| match v {
                Bson::Array(items) => items.iter().any(|item| elem_matches(item, crit)),
                _ => false,
            })
        }),
        "$regex" => {
            let options = all_ops.get("$options").and_then(Bson::as_str).unwrap_or("");
            operand.as_str().is_some_and(|p| regex_any(values, p, options))
        }
        "$options" => true,
        "$not" => match operand {
            Bson::Document(inner) if is_operator_document(inner) => {
                !inner.iter().all(|(o, x)| operator_matches(values, o, x, inner))
            }
            other => !any_equal(values, other),
        },
        "$mod" => operand.as_array().is_some_and(|a| {
            match (a.first().and_then(bson_as_i64), a.get(1).and_then(bson_as_i64)) {
                (Some(d), Some(r)) if d != 0 => flattened(values)
                    .iter()
                    .any(|v| bson_as_i64(v).is_some_and(|n| n % d == r)),
                _ => false,
            }
        }),
        other => {
            log::warn!(target: "nexusodm::query", "memory backend ignores unsupported operator {other}");
            false
        }
    }
}

fn in_member(values: &[&Bson], candidate: &Bson) -> bool {
    match candidate {
        Bson::Document(d) if d.contains_key("$regex") => {
            let p = d.get("$regex").and_then(Bson::as_str).unwrap_or("");
            let o = d.get("$options").and_then(Bson::as_str).unwrap_or("");
            regex_any(values, p, o)
        }
        other => any_equal(values, other),
    }
}

fn elem_matches(item: &Bson, crit: &BsonDocument) -> bool {
    if is_operator_document(crit) {
        let single = [item];
        return crit.iter().all(|(op, x)| operator_matches(&single, op, x, crit));
    }
    item.as_document().is_some_and(|d| matches(d, crit))
}

fn cmp_any(values: &[&Bson], operand: &Bson, pred: impl Fn(Ordering) -> bool) -> bool {
    flattened(values)
        .iter()
        .any(|v| comparable(v, operand) && pred(compare_bson(v, operand)))
}

fn comparable(a: &Bson, b: &Bson) -> bool {
    (bson_as_f64(a).is_some() && bson_as_f64(b).is_some()) || type_rank(a) == type_rank(b)
}

fn regex_any(values: &[&Bson], pattern: &str, options: &str) -> bool {
    let mut builder = regex::RegexBuilder::new(pattern);
    builder
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'));
    let Ok(re) = builder.build() else {
        return false;
    };
    flattened(values).iter().any(|v| v.as_str().is_some_and(|s| re.is_match(s)))
}

/// Word match of any search term against any string value in the document.
fn text_matches(doc: &BsonDocument, cond: &Bson) -> bool {
    let Some(search) = cond.as_document().and_then(|d| d.get("$search")).and_then(Bson::as_str)
    else {
        return false;
    };
    let terms: Vec<String> = search.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return false;
    }
    fn collect(v: &Bson, words: &mut Vec<String>) {
        match v {
            Bson::String(s) => words.extend(
                s.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_lowercase),
            ),
            Bson::Array(items) => items.iter().for_each(|i| collect(i, words)),
            Bson::Document(d) => d.values().for_each(|i| collect(i, words)),
            _ => {}
        }
    }
    let mut words = Vec::new();
    for v in doc.values() {
        collect(v, &mut words);
    }
    terms.iter().any(|t| words.iter().any(|w| w == t))
}

fn bson_equal(a: &Bson, b: &Bson) -> bool {
    match (bson_as_f64(a), bson_as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Orders two documents by a backend sort document (`{field: 1 | -1}`).
#[must_use]
pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &BsonDocument) -> Ordering {
    for (field, dir) in sort.iter().take(MAX_SORT_FIELDS) {
        let ord = match (get_path(a, field), get_path(b, field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if bson_as_i64(dir).unwrap_or(1) < 0 { ord.reverse() } else { ord };
        }
    }
    Ordering::Equal
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (bson_as_f64(a), bson_as_f64(b)) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 255,
        _ => 12,
    }
}

/// Applies a backend projection document (`{field: 1}` or `{field: 0}`).
#[must_use]
pub fn project(doc: &BsonDocument, projection: &BsonDocument) -> BsonDocument {
    let including = projection.values().any(|v| bson_as_i64(v).is_some_and(|n| n != 0));
    let id_excluded = projection.get("_id").and_then(bson_as_i64) == Some(0);
    if including {
        let mut out = BsonDocument::new();
        if !id_excluded && let Some(id) = doc.get("_id") {
            out.insert("_id", id.clone());
        }
        for (k, v) in projection {
            if k == "_id" || bson_as_i64(v) == Some(0) {
                continue;
            }
            copy_path(doc, &mut out, k);
        }
        out
    } else {
        let mut out = doc.clone();
        for (k, _) in projection {
            remove_path(&mut out, k);
        }
        out
    }
}

fn copy_path(src: &BsonDocument, dst: &mut BsonDocument, path: &str) {
    match path.split_once('.') {
        None => {
            if let Some(v) = src.get(path) {
                dst.insert(path, v.clone());
            }
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = src.get(head) {
                if !matches!(dst.get(head), Some(Bson::Document(_))) {
                    dst.insert(head, BsonDocument::new());
                }
                if let Some(Bson::Document(target)) = dst.get_mut(head) {
                    copy_path(inner, target, rest);
                }
            }
        }
    }
}

fn remove_path(doc: &mut BsonDocument, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}
