//! The document-store boundary. The query engine only talks to [`Backend`];
//! [`MemoryBackend`] is an in-process implementation.

mod eval;
mod memory;
mod update;

pub use eval::{compare_bson, compare_docs, matches, project};
pub use memory::{DEFAULT_BATCH_SIZE, MemoryBackend};
pub use update::apply_update;

use crate::errors::Result;
use crate::map_reduce::{MapReduceJob, MapReduceOutcome};
use bson::{Bson, Document as BsonDocument};
use serde::Serialize;

/// Everything the backend needs to run one find.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySpec {
    pub selector: BsonDocument,
    pub projection: Option<BsonDocument>,
    pub sort: Option<BsonDocument>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub batch_size: Option<u32>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}

/// A server-side cursor. The first batch is delivered by `find`; each later
/// batch is one more round trip.
pub trait RawCursor: Send {
    /// `Ok(None)` once the cursor is exhausted.
    ///
    /// # Errors
    /// Backend failures while fetching more results.
    fn next_batch(&mut self) -> Result<Option<Vec<BsonDocument>>>;

    /// True when no further batch remains on the server.
    fn is_exhausted(&self) -> bool;

    /// Releases server-side resources. Idempotent.
    fn close(&mut self);
}

pub trait Backend: Send + Sync {
    /// # Errors
    /// Backend failures, surfaced unmodified.
    fn find(&self, collection: &str, query: &QuerySpec) -> Result<Box<dyn RawCursor>>;

    /// # Errors
    /// Backend failures, surfaced unmodified.
    fn count(
        &self,
        collection: &str,
        selector: &BsonDocument,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<u64>;

    /// # Errors
    /// Backend failures, surfaced unmodified.
    fn distinct(&self, collection: &str, field: &str, selector: &BsonDocument) -> Result<Vec<Bson>>;

    /// Returns the `_id` of the stored document.
    ///
    /// # Errors
    /// `IllegalKey` for keys the store can't hold; other backend failures.
    fn insert(&self, collection: &str, document: BsonDocument) -> Result<Bson>;

    /// # Errors
    /// Backend failures, surfaced unmodified.
    fn update(
        &self,
        collection: &str,
        selector: &BsonDocument,
        update: &BsonDocument,
        multi: bool,
    ) -> Result<UpdateReport>;

    /// # Errors
    /// Backend failures, surfaced unmodified.
    fn delete(&self, collection: &str, selector: &BsonDocument, multi: bool) -> Result<DeleteReport>;

    /// # Errors
    /// Backend failures, surfaced unmodified.
    fn map_reduce(&self, collection: &str, job: &MapReduceJob) -> Result<MapReduceOutcome>;
}
