//! Lazy execution of a criteria.
//!
//! An [`ExecutionContext`] is created per terminal call. Creating it never
//! contacts the backend; the first `next()` (or [`ExecutionContext::force`])
//! issues the find, later batches are fetched as the iterator drains them.

mod eager;

use crate::backend::{QuerySpec, RawCursor};
use crate::cache::cache_key;
use crate::criteria::Criteria;
use crate::document::Document;
use crate::errors::Result;
use crate::types::Projection;
use bson::Document as BsonDocument;
use std::collections::VecDeque;

pub(crate) use eager::preload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Unexecuted,
    Executing,
    Exhausted,
    Failed,
}

/// A forward-only iterator over the documents a criteria selects.
///
/// Holds the backend cursor while executing and releases it on exhaustion,
/// on error, on [`ExecutionContext::close`] and on drop.
pub struct ExecutionContext {
    criteria: Criteria,
    spec: QuerySpec,
    projection: Option<Projection>,
    inclusions: Vec<String>,
    state: ExecState,
    cursor: Option<Box<dyn RawCursor>>,
    buffer: VecDeque<Document>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(criteria: &Criteria) -> Self {
        Self::with_spec(criteria, criteria.query_spec())
    }

    /// A context that runs `spec` instead of the criteria's own query. The
    /// criteria still supplies the model, projection and inclusions.
    #[must_use]
    pub fn with_spec(criteria: &Criteria, spec: QuerySpec) -> Self {
        let parts = criteria.effective();
        Self {
            criteria: criteria.clone(),
            spec,
            projection: parts.projection,
            inclusions: parts.inclusions,
            state: ExecState::Unexecuted,
            cursor: None,
            buffer: VecDeque::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> ExecState {
        self.state
    }

    #[must_use]
    pub const fn query_spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Issues the query if it hasn't run yet. A no-op afterwards.
    ///
    /// # Errors
    /// Backend failures; the context is then `Failed` and yields nothing.
    pub fn force(&mut self) -> Result<()> {
        if self.state != ExecState::Unexecuted {
            return Ok(());
        }
        self.state = ExecState::Executing;
        self.start().inspect_err(|e| {
            log::warn!(target: "nexusodm::query", "find on {} failed: {e}", self.criteria.model().collection());
            self.fail();
        })
    }

    fn start(&mut self) -> Result<()> {
        let odm = self.criteria.odm().clone();
        let collection = self.criteria.model().collection().to_string();
        let cache = odm.query_cache();
        let key = if cache.is_enabled() { Some(cache_key(&collection, &self.spec)?) } else { None };
        if let Some(k) = &key
            && let Some(hit) = cache.get(k)
        {
            log::debug!(target: "nexusodm::query", "find {collection} served from query cache");
            return self.load(hit.as_ref().clone());
        }
        let generation = cache.generation();
        log::debug!(target: "nexusodm::query", "find {collection} selector={}", self.spec.selector);
        let mut cursor = odm.backend().find(&collection, &self.spec)?;
        let first = match cursor.next_batch() {
            Ok(batch) => batch.unwrap_or_default(),
            Err(e) => {
                cursor.close();
                return Err(e);
            }
        };
        // only complete results are cached
        if let Some(k) = key
            && cursor.is_exhausted()
        {
            cache.insert(k, first.clone(), generation);
        }
        self.cursor = Some(cursor);
        self.load(first)
    }

    fn load(&mut self, raw: Vec<BsonDocument>) -> Result<()> {
        let model = self.criteria.model().name().to_string();
        let mut docs: Vec<Document> = raw
            .into_iter()
            .map(|attrs| Document::loaded(&model, attrs, self.projection.clone()))
            .collect();
        if !self.inclusions.is_empty() {
            preload(&self.criteria, &self.inclusions, &mut docs)?;
        }
        self.buffer.extend(docs);
        Ok(())
    }

    /// `Ok(false)` once the cursor has nothing more.
    fn fetch_more(&mut self) -> Result<bool> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(false);
        };
        match cursor.next_batch()? {
            Some(batch) => {
                self.load(batch)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn release(&mut self) {
        if let Some(mut c) = self.cursor.take() {
            c.close();
        }
    }

    fn fail(&mut self) {
        self.state = ExecState::Failed;
        self.buffer.clear();
        self.release();
    }

    /// Stops iteration early and releases the cursor.
    pub fn close(&mut self) {
        self.release();
        self.buffer.clear();
        if self.state != ExecState::Failed {
            self.state = ExecState::Exhausted;
        }
    }
}

impl Iterator for ExecutionContext {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                ExecState::Unexecuted => {
                    if let Err(e) = self.force() {
                        return Some(Err(e));
                    }
                }
                ExecState::Exhausted | ExecState::Failed => return None,
                ExecState::Executing => {
                    if let Some(d) = self.buffer.pop_front() {
                        return Some(Ok(d));
                    }
                    match self.fetch_more() {
                        Ok(true) => {}
                        Ok(false) => {
                            self.release();
                            self.state = ExecState::Exhausted;
                            return None;
                        }
                        Err(e) => {
                            self.fail();
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("model", &self.criteria.model().name())
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}
