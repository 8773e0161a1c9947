#![allow(dead_code)]
use bson::{Bson, Document as BsonDocument, doc};
use nexusodm::backend::{DeleteReport, UpdateReport};
use nexusodm::map_reduce::{MapReduceJob, MapReduceOutcome};
use nexusodm::model::FieldType;
use nexusodm::{Backend, Criteria, MemoryBackend, ModelBuilder, Odm, OdmConfig, QuerySpec, RawCursor, Result, field};
use parking_lot::Mutex;
use std::sync::Arc;

/// Wraps a [`MemoryBackend`], remembering every call and answering
/// map/reduce with a canned outcome.
#[derive(Default)]
pub struct RecordingBackend {
    pub inner: MemoryBackend,
    pub calls: Mutex<Vec<String>>,
    pub jobs: Mutex<Vec<MapReduceJob>>,
    pub canned: Mutex<Option<MapReduceOutcome>>,
}

impl RecordingBackend {
    pub fn record(&self, op: &str, collection: &str) {
        self.calls.lock().push(format!("{op}:{collection}"));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn round_trips(&self) -> u64 {
        self.inner.round_trips()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
        self.inner.reset_round_trips();
    }
}

impl Backend for RecordingBackend {
    fn find(&self, collection: &str, query: &QuerySpec) -> Result<Box<dyn RawCursor>> {
        self.record("find", collection);
        self.inner.find(collection, query)
    }

    fn count(&self, collection: &str, selector: &BsonDocument, skip: Option<u64>, limit: Option<u64>) -> Result<u64> {
        self.record("count", collection);
        self.inner.count(collection, selector, skip, limit)
    }

    fn distinct(&self, collection: &str, field: &str, selector: &BsonDocument) -> Result<Vec<Bson>> {
        self.record("distinct", collection);
        self.inner.distinct(collection, field, selector)
    }

    fn insert(&self, collection: &str, document: BsonDocument) -> Result<Bson> {
        self.record("insert", collection);
        self.inner.insert(collection, document)
    }

    fn update(&self, collection: &str, selector: &BsonDocument, update: &BsonDocument, multi: bool) -> Result<UpdateReport> {
        self.record("update", collection);
        self.inner.update(collection, selector, update, multi)
    }

    fn delete(&self, collection: &str, selector: &BsonDocument, multi: bool) -> Result<DeleteReport> {
        self.record("delete", collection);
        self.inner.delete(collection, selector, multi)
    }

    fn map_reduce(&self, collection: &str, job: &MapReduceJob) -> Result<MapReduceOutcome> {
        self.record("map_reduce", collection);
        self.jobs.lock().push(job.clone());
        match self.canned.lock().clone() {
            Some(outcome) => Ok(outcome),
            None => self.inner.map_reduce(collection, job),
        }
    }
}

pub struct Fixture {
    pub odm: Odm,
    pub backend: Arc<RecordingBackend>,
}

impl Fixture {
    pub fn bands(&self) -> Criteria {
        self.odm.criteria("Band").unwrap()
    }

    pub fn albums(&self) -> Criteria {
        self.odm.criteria("Album").unwrap()
    }

    /// Inserts straight into the backend, bypassing the mapper.
    pub fn seed(&self, collection: &str, docs: Vec<BsonDocument>) -> Vec<Bson> {
        let ids = docs.into_iter().map(|d| self.backend.inner.insert(collection, d).unwrap()).collect();
        self.backend.reset();
        ids
    }
}

pub fn band_model() -> ModelBuilder {
    ModelBuilder::new("Band")
        .field("name", FieldType::String)
        .field("country", FieldType::String)
        .field("genres", FieldType::Array)
        .field("likes", FieldType::Integer)
        .field("active", FieldType::Boolean)
        .field("label_id", FieldType::ObjectId)
        .has_many("albums", "Album", "band_id")
        .has_one("manager", "Manager", "band_id")
        .belongs_to("label", "Label", "label_id")
        .has_and_belongs_to_many("tags", "Tag", "tag_ids")
        .belongs_to_polymorphic("owner", "owner_id")
        .embeds_many("members", "Member")
        .scope("english", ("country", "England"))
        .scope("rock", (field("genres").in_(), vec!["rock"]))
        .scope_fn("popular", |c, args| {
            let threshold = args.first().cloned().unwrap_or(Bson::Int32(100));
            c.gt("likes", threshold)
        })
}

pub fn setup_with(config: OdmConfig, band: ModelBuilder) -> Fixture {
    let backend = Arc::new(RecordingBackend::default());
    let odm = Odm::new(backend.clone(), config);
    odm.define(band).unwrap();
    odm.define(
        ModelBuilder::new("Album")
            .field("band_id", FieldType::ObjectId)
            .field("year", FieldType::Integer)
            .belongs_to("band", "Band", "band_id"),
    )
    .unwrap();
    odm.define(ModelBuilder::new("Label").field("name", FieldType::String)).unwrap();
    odm.define(ModelBuilder::new("Tag").field("name", FieldType::String)).unwrap();
    odm.define(ModelBuilder::new("Manager").field("band_id", FieldType::ObjectId)).unwrap();
    Fixture { odm, backend }
}

pub fn setup() -> Fixture {
    setup_with(OdmConfig::default(), band_model())
}

/// Three bands, two of them English.
pub fn seed_bands(fx: &Fixture) -> Vec<Bson> {
    fx.seed(
        "bands",
        vec![
            doc! { "name": "Depeche Mode", "country": "England", "genres": ["synth", "rock"], "likes": 300 },
            doc! { "name": "New Order", "country": "England", "genres": ["synth"], "likes": 150 },
            doc! { "name": "Tool", "country": "USA", "genres": ["rock", "metal"], "likes": 90 },
        ],
    )
}

pub fn names(docs: &[nexusodm::Document]) -> Vec<String> {
    docs.iter().map(|d| d.get_str("name").unwrap().unwrap_or_default().to_string()).collect()
}
