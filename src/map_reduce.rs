//! Deferred map/reduce jobs built from a criteria.
//!
//! Nothing reaches the backend until [`MapReduce::execute`] (or one of the
//! accessors that need the outcome) is called, and the outcome is memoized.

use crate::backend::QuerySpec;
use crate::criteria::Criteria;
use crate::errors::{OdmError, Result};
use bson::{Document as BsonDocument, doc};
use serde::Serialize;
use std::sync::OnceLock;

/// Where the backend writes the reduced documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputTarget {
    /// Results come back with the response.
    Inline,
    /// Replace the contents of a collection.
    Replace(String),
    /// Overwrite same-keyed documents in a collection.
    Merge(String),
    /// Re-reduce against existing same-keyed documents.
    Reduce(String),
}

impl OutputTarget {
    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        match self {
            Self::Inline => doc! { "inline": 1 },
            Self::Replace(c) => doc! { "replace": c },
            Self::Merge(c) => doc! { "merge": c },
            Self::Reduce(c) => doc! { "reduce": c },
        }
    }

    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        match self {
            Self::Inline => None,
            Self::Replace(c) | Self::Merge(c) | Self::Reduce(c) => Some(c),
        }
    }
}

/// The job descriptor handed to [`crate::backend::Backend::map_reduce`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapReduceJob {
    pub map: String,
    pub reduce: String,
    pub finalize: Option<String>,
    pub selector: BsonDocument,
    pub sort: Option<BsonDocument>,
    pub limit: Option<u64>,
    pub out: BsonDocument,
    pub scope: Option<BsonDocument>,
    pub js_mode: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapReduceCounts {
    pub input: u64,
    pub emit: u64,
    pub reduce: u64,
    pub output: u64,
}

/// What the backend reported for one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapReduceOutcome {
    /// Present for inline output.
    pub results: Option<Vec<BsonDocument>>,
    /// Present when results were written to a collection.
    pub collection: Option<String>,
    pub counts: MapReduceCounts,
    pub time_ms: u64,
}

pub struct MapReduce {
    criteria: Criteria,
    map: String,
    reduce: String,
    finalize: Option<String>,
    out: Option<OutputTarget>,
    scope: Option<BsonDocument>,
    js_mode: bool,
    verbose: bool,
    outcome: OnceLock<MapReduceOutcome>,
}

impl std::fmt::Debug for MapReduce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapReduce")
            .field("model", &self.criteria.model().name())
            .field("selector", &self.criteria.selector())
            .field("out", &self.out)
            .field("executed", &self.outcome.get().is_some())
            .finish_non_exhaustive()
    }
}

impl MapReduce {
    pub(crate) fn new(criteria: Criteria, map: &str, reduce: &str) -> Self {
        Self {
            criteria,
            map: map.to_string(),
            reduce: reduce.to_string(),
            finalize: None,
            out: None,
            scope: None,
            js_mode: false,
            verbose: false,
            outcome: OnceLock::new(),
        }
    }

    /// Sets the output directive. Builders return a fresh, unexecuted job.
    #[must_use]
    pub fn out(self, target: OutputTarget) -> Self {
        Self { out: Some(target), outcome: OnceLock::new(), ..self }
    }

    #[must_use]
    pub fn finalize(self, function: &str) -> Self {
        Self { finalize: Some(function.to_string()), outcome: OnceLock::new(), ..self }
    }

    /// Global variables visible to the map, reduce and finalize functions.
    #[must_use]
    pub fn scope(self, vars: BsonDocument) -> Self {
        Self { scope: Some(vars), outcome: OnceLock::new(), ..self }
    }

    #[must_use]
    pub fn js_mode(self) -> Self {
        Self { js_mode: true, outcome: OnceLock::new(), ..self }
    }

    #[must_use]
    pub fn verbose(self) -> Self {
        Self { verbose: true, outcome: OnceLock::new(), ..self }
    }

    /// The descriptor that would be sent, without sending it.
    ///
    /// # Errors
    /// `NoMapReduceOutput` when no output directive is set.
    pub fn command(&self) -> Result<MapReduceJob> {
        let out = self.out.as_ref().ok_or(OdmError::NoMapReduceOutput)?;
        let spec = self.criteria.query_spec();
        Ok(MapReduceJob {
            map: self.map.clone(),
            reduce: self.reduce.clone(),
            finalize: self.finalize.clone(),
            selector: spec.selector,
            sort: spec.sort,
            limit: spec.limit,
            out: out.to_document(),
            scope: self.scope.clone(),
            js_mode: self.js_mode,
            verbose: self.verbose,
        })
    }

    /// Runs the job once; later calls return the memoized outcome.
    ///
    /// # Errors
    /// `NoMapReduceOutput` before any backend call when `out` was never set;
    /// backend failures otherwise.
    pub fn execute(&self) -> Result<&MapReduceOutcome> {
        if let Some(o) = self.outcome.get() {
            return Ok(o);
        }
        let job = self.command()?;
        let collection = self.criteria.model().collection();
        log::debug!(target: "nexusodm::query", "map/reduce on {collection} out={:?}", job.out);
        let outcome = self.criteria.odm().backend().map_reduce(collection, &job)?;
        if self.out.as_ref().and_then(OutputTarget::collection).is_some() {
            self.criteria.odm().clear_query_cache();
        }
        Ok(self.outcome.get_or_init(|| outcome))
    }

    /// Reduced documents: the inline payload, or the contents of the output
    /// collection.
    ///
    /// # Errors
    /// See [`MapReduce::execute`].
    pub fn results(&self) -> Result<Vec<BsonDocument>> {
        let outcome = self.execute()?;
        if let Some(docs) = &outcome.results {
            return Ok(docs.clone());
        }
        let Some(collection) = outcome
            .collection
            .as_deref()
            .or_else(|| self.out.as_ref().and_then(OutputTarget::collection))
        else {
            return Ok(Vec::new());
        };
        let mut cursor = self.criteria.odm().backend().find(collection, &QuerySpec::default())?;
        let mut out = Vec::new();
        loop {
            match cursor.next_batch() {
                Ok(Some(batch)) => out.extend(batch),
                Ok(None) => break,
                Err(e) => {
                    cursor.close();
                    return Err(e);
                }
            }
        }
        cursor.close();
        Ok(out)
    }

    /// # Errors
    /// See [`MapReduce::execute`].
    pub fn counts(&self) -> Result<MapReduceCounts> {
        Ok(self.execute()?.counts)
    }

    /// # Errors
    /// See [`MapReduce::execute`].
    pub fn time_ms(&self) -> Result<u64> {
        Ok(self.execute()?.time_ms)
    }

    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Output directive as sent to the backend.
    #[must_use]
    pub fn output(&self) -> Option<&OutputTarget> {
        self.out.as_ref()
    }
}

impl Criteria {
    /// A deferred map/reduce job over this criteria's selector.
    #[must_use]
    pub fn map_reduce(&self, map: &str, reduce: &str) -> MapReduce {
        MapReduce::new(self.clone(), map, reduce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_targets_render_directives() {
        assert_eq!(OutputTarget::Inline.to_document(), doc! { "inline": 1 });
        assert_eq!(OutputTarget::Merge("totals".into()).to_document(), doc! { "merge": "totals" });
        assert_eq!(OutputTarget::Replace("t".into()).collection(), Some("t"));
        assert_eq!(OutputTarget::Inline.collection(), None);
    }
}
