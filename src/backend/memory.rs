use super::eval::{compare_docs, matches, project};
use super::update::apply_update;
use super::{Backend, DeleteReport, QuerySpec, RawCursor, UpdateReport};
use crate::errors::{OdmError, Result};
use crate::map_reduce::{MapReduceJob, MapReduceOutcome};
use crate::types::{MAX_SORT_FIELDS, value_key};
use crate::utils::num::{u64_to_usize, u128_to_u64_saturating, usize_to_u64};
use bson::oid::ObjectId;
use bson::{Bson, Document as BsonDocument};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size of every batch when the query sets none.
pub const DEFAULT_BATCH_SIZE: usize = 101;

/// An in-process store keyed by collection name. Counts round trips so tests
/// can assert how many requests a query issued.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Vec<BsonDocument>>>,
    round_trips: Arc<AtomicU64>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests served since creation or the last reset.
    #[must_use]
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::SeqCst)
    }

    pub fn reset_round_trips(&self) {
        self.round_trips.store(0, Ordering::SeqCst);
    }

    /// Documents currently stored in `collection`, in insertion order.
    #[must_use]
    pub fn snapshot(&self, collection: &str) -> Vec<BsonDocument> {
        self.collections.read().get(collection).cloned().unwrap_or_default()
    }

    fn trip(&self) {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
    }

    fn matching(&self, collection: &str, selector: &BsonDocument) -> Vec<BsonDocument> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, selector)).cloned().collect())
            .unwrap_or_default()
    }
}

fn validate_keys(doc: &BsonDocument) -> Result<()> {
    for (k, v) in doc {
        if k.starts_with('$') || k.contains('.') {
            return Err(OdmError::IllegalKey(k.clone()));
        }
        if let Bson::Document(inner) = v {
            validate_keys(inner)?;
        }
    }
    Ok(())
}

fn window<T>(items: Vec<T>, skip: Option<u64>, limit: Option<u64>) -> Vec<T> {
    let skip = skip.and_then(u64_to_usize).unwrap_or(0);
    let limit = limit.filter(|l| *l > 0).and_then(u64_to_usize).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(limit).collect()
}

impl Backend for MemoryBackend {
    fn find(&self, collection: &str, query: &QuerySpec) -> Result<Box<dyn RawCursor>> {
        self.trip();
        let start = std::time::Instant::now();
        let mut docs = self.matching(collection, &query.selector);
        if let Some(sort) = &query.sort {
            if sort.len() > MAX_SORT_FIELDS {
                log::warn!(target: "nexusodm::query", "sort spec too long: {}", sort.len());
            }
            docs.sort_by(|a, b| compare_docs(a, b, sort));
        }
        let mut docs = window(docs, query.skip, query.limit);
        if let Some(p) = &query.projection {
            for d in &mut docs {
                *d = project(d, p);
            }
        }
        let result_count = docs.len();
        let batch = query
            .batch_size
            .filter(|b| *b > 0)
            .and_then(|b| usize::try_from(b).ok())
            .unwrap_or(DEFAULT_BATCH_SIZE);
        let mut batches = VecDeque::new();
        let mut rest = docs;
        while rest.len() > batch {
            let tail = rest.split_off(batch);
            batches.push_back(rest);
            rest = tail;
        }
        batches.push_back(rest);
        crate::dev6!(
            "{{\"bench\":\"query\",\"op\":\"find\",\"collection\":\"{}\",\"duration_ms\":{},\"result_count\":{},\"batches\":{},\"limit\":{},\"skip\":{}}}",
            collection,
            u128_to_u64_saturating(start.elapsed().as_millis()),
            usize_to_u64(result_count),
            usize_to_u64(batches.len()),
            query.limit.unwrap_or(0),
            query.skip.unwrap_or(0)
        );
        Ok(Box::new(MemoryCursor {
            collection: collection.to_string(),
            batches,
            delivered_first: false,
            closed: false,
            round_trips: Arc::clone(&self.round_trips),
        }))
    }

    fn count(
        &self,
        collection: &str,
        selector: &BsonDocument,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<u64> {
        self.trip();
        let n = window(self.matching(collection, selector), skip, limit).len();
        crate::dev6!(
            "{{\"bench\":\"query\",\"op\":\"count\",\"collection\":\"{}\",\"result_count\":{}}}",
            collection,
            usize_to_u64(n)
        );
        Ok(usize_to_u64(n))
    }

    fn distinct(&self, collection: &str, field: &str, selector: &BsonDocument) -> Result<Vec<Bson>> {
        self.trip();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for d in self.matching(collection, selector) {
            let values = match crate::document::get_path(&d, field) {
                Some(Bson::Array(items)) => items.clone(),
                Some(v) => vec![v.clone()],
                None => continue,
            };
            for v in values {
                if seen.insert(value_key(&v)) {
                    out.push(v);
                }
            }
        }
        crate::dev6!(
            "{{\"bench\":\"query\",\"op\":\"distinct\",\"collection\":\"{}\",\"field\":\"{}\",\"result_count\":{}}}",
            collection,
            field,
            usize_to_u64(out.len())
        );
        Ok(out)
    }

    fn insert(&self, collection: &str, mut document: BsonDocument) -> Result<Bson> {
        self.trip();
        validate_keys(&document)?;
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert("_id", id.clone());
                id
            }
        };
        let mut guard = self.collections.write();
        let docs = guard.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get("_id") == Some(&id)) {
            return Err(OdmError::Backend(format!("duplicate _id {id} in {collection}")));
        }
        docs.push(document);
        crate::dev6!("{{\"bench\":\"write\",\"op\":\"insert\",\"collection\":\"{}\"}}", collection);
        Ok(id)
    }

    fn update(
        &self,
        collection: &str,
        selector: &BsonDocument,
        update: &BsonDocument,
        multi: bool,
    ) -> Result<UpdateReport> {
        self.trip();
        let mut report = UpdateReport::default();
        let mut guard = self.collections.write();
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(report);
        };
        for d in docs.iter_mut().filter(|d| matches(d, selector)) {
            report.matched += 1;
            let mut next = d.clone();
            if apply_update(&mut next, update)? {
                validate_keys(&next)?;
                *d = next;
                report.modified += 1;
            }
            if !multi {
                break;
            }
        }
        crate::dev6!(
            "{{\"bench\":\"write\",\"op\":\"update\",\"collection\":\"{}\",\"matched\":{},\"modified\":{}}}",
            collection,
            report.matched,
            report.modified
        );
        Ok(report)
    }

    fn delete(&self, collection: &str, selector: &BsonDocument, multi: bool) -> Result<DeleteReport> {
        self.trip();
        let mut guard = self.collections.write();
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(DeleteReport::default());
        };
        let before = docs.len();
        if multi {
            docs.retain(|d| !matches(d, selector));
        } else if let Some(pos) = docs.iter().position(|d| matches(d, selector)) {
            docs.remove(pos);
        }
        let deleted = usize_to_u64(before - docs.len());
        crate::dev6!(
            "{{\"bench\":\"write\",\"op\":\"delete\",\"collection\":\"{}\",\"deleted\":{}}}",
            collection,
            deleted
        );
        Ok(DeleteReport { deleted })
    }

    fn map_reduce(&self, collection: &str, _job: &MapReduceJob) -> Result<MapReduceOutcome> {
        self.trip();
        Err(OdmError::Backend(format!(
            "map/reduce on {collection} requires a JavaScript-capable backend"
        )))
    }
}

struct MemoryCursor {
    collection: String,
    batches: VecDeque<Vec<BsonDocument>>,
    delivered_first: bool,
    closed: bool,
    round_trips: Arc<AtomicU64>,
}

impl RawCursor for MemoryCursor {
    fn next_batch(&mut self) -> Result<Option<Vec<BsonDocument>>> {
        if self.closed {
            return Ok(None);
        }
        let Some(batch) = self.batches.pop_front() else {
            return Ok(None);
        };
        if self.delivered_first {
            self.round_trips.fetch_add(1, Ordering::SeqCst);
            crate::dev6!(
                "{{\"bench\":\"query\",\"op\":\"get_more\",\"collection\":\"{}\",\"result_count\":{}}}",
                self.collection,
                usize_to_u64(batch.len())
            );
        }
        self.delivered_first = true;
        Ok(Some(batch))
    }

    fn is_exhausted(&self) -> bool {
        self.closed || self.batches.is_empty()
    }

    fn close(&mut self) {
        self.closed = true;
        self.batches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn seeded() -> MemoryBackend {
        let b = MemoryBackend::new();
        for (name, likes) in [("a", 3), ("b", 1), ("c", 2)] {
            b.insert("bands", doc! { "name": name, "likes": likes }).unwrap();
        }
        b.reset_round_trips();
        b
    }

    #[test]
    fn find_sorts_windows_and_projects() {
        let b = seeded();
        let spec = QuerySpec {
            sort: Some(doc! { "likes": -1 }),
            skip: Some(1),
            projection: Some(doc! { "name": 1, "_id": 0 }),
            ..QuerySpec::default()
        };
        let mut cur = b.find("bands", &spec).unwrap();
        let batch = cur.next_batch().unwrap().unwrap();
        assert_eq!(batch, vec![doc! { "name": "c" }, doc! { "name": "b" }]);
        assert!(cur.is_exhausted());
        assert_eq!(b.round_trips(), 1);
    }

    #[test]
    fn later_batches_cost_a_round_trip_each() {
        let b = seeded();
        let spec = QuerySpec { batch_size: Some(1), ..QuerySpec::default() };
        let mut cur = b.find("bands", &spec).unwrap();
        let mut seen = 0;
        while let Some(batch) = cur.next_batch().unwrap() {
            seen += batch.len();
        }
        assert_eq!(seen, 3);
        assert_eq!(b.round_trips(), 3);
    }

    #[test]
    fn insert_rejects_operator_and_dotted_keys() {
        let b = MemoryBackend::new();
        assert!(matches!(b.insert("x", doc! { "$set": 1 }), Err(OdmError::IllegalKey(_))));
        assert!(matches!(b.insert("x", doc! { "a": { "b.c": 1 } }), Err(OdmError::IllegalKey(_))));
        let id = b.insert("x", doc! { "_id": 1 }).unwrap();
        assert_eq!(id, Bson::Int32(1));
        assert!(b.insert("x", doc! { "_id": 1 }).is_err());
    }

    #[test]
    fn update_delete_and_distinct() {
        let b = seeded();
        let r = b.update("bands", &doc! { "likes": { "$gte": 2 } }, &doc! { "$inc": { "likes": 1 } }, true).unwrap();
        assert_eq!(r, UpdateReport { matched: 2, modified: 2 });
        assert_eq!(b.count("bands", &doc! { "likes": { "$gt": 2 } }, None, None).unwrap(), 2);
        let d = b.delete("bands", &doc! { "name": "b" }, false).unwrap();
        assert_eq!(d.deleted, 1);
        let names = b.distinct("bands", "name", &doc! {}).unwrap();
        assert_eq!(names, vec![Bson::String("a".into()), Bson::String("c".into())]);
    }

    #[test]
    fn map_reduce_is_unsupported() {
        let b = MemoryBackend::new();
        let job = MapReduceJob::default();
        assert!(matches!(b.map_reduce("bands", &job), Err(OdmError::Backend(_))));
    }
}
