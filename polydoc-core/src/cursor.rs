//! Lazy, polymorphic query results.
//!
//! A [`Cursor`] holds a query and runs it on the first pull. Each record is materialized
//! with the schema named by its stored class name when that schema is related to the
//! queried one, so a query against a base type yields documents of their real subtype.

use bson::Document as RawDocument;
use std::{
    collections::VecDeque,
    ops::{Bound, RangeBounds},
    sync::Arc,
};
use tracing::debug;

use crate::{
    backend::Database,
    document::Document,
    error::DocumentStoreResult,
    query::{Query, Sort, SortDirection},
    schema::Schema,
    store::DocumentStore,
};

/// Forward-only cursor over the records of one query.
#[derive(Debug)]
pub struct Cursor<'a, B: Database> {
    store: &'a DocumentStore<B>,
    schema: Arc<Schema>,
    collection: String,
    query: Query,
    buffer: Option<VecDeque<RawDocument>>,
}

impl<'a, B: Database> Cursor<'a, B> {
    pub(crate) fn new(store: &'a DocumentStore<B>, schema: Arc<Schema>, collection: String, query: Query) -> Self {
        Self { store, schema, collection, query, buffer: None }
    }

    /// The query the cursor will run, scope included.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Adds a sort key. Earlier keys take precedence. Restarts the cursor.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self.buffer = None;
        self
    }

    /// Skips the first `n` records. Restarts the cursor.
    pub fn skip(mut self, n: usize) -> Self {
        self.query.offset = Some(n);
        self.buffer = None;
        self
    }

    /// Yields at most `n` records. Restarts the cursor.
    pub fn limit(mut self, n: usize) -> Self {
        self.query.limit = Some(n);
        self.buffer = None;
        self
    }

    /// Narrows the cursor to a window of its current results. Still lazy.
    ///
    /// `cursor.slice(..2)` keeps the first two records; `cursor.slice(1..)` drops the first.
    pub fn slice(mut self, range: impl RangeBounds<usize>) -> Self {
        let start = match range.start_bound() {
            Bound::Included(start) => *start,
            Bound::Excluded(start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        };
        // `None` is unbounded, including an inclusive end at `usize::MAX`.
        let end = match range.end_bound() {
            Bound::Included(end) => end.checked_add(1),
            Bound::Excluded(end) => Some(*end),
            Bound::Unbounded => None,
        };

        let end = match (end, self.query.limit) {
            (Some(end), Some(limit)) => Some(end.min(limit)),
            (end, limit) => end.or(limit),
        };

        self.query.offset = Some(self.query.offset.unwrap_or(0).saturating_add(start));
        self.query.limit = end.map(|end| end.saturating_sub(start));
        self.buffer = None;
        self
    }

    fn materialize(&self, record: RawDocument) -> Document {
        let schema = self.store.registry().resolve_record_schema(&self.schema, &record);
        Document::from_raw(schema, record)
    }

    async fn fetch(&self, query: Query) -> DocumentStoreResult<Vec<RawDocument>> {
        if query.limit == Some(0) {
            return Ok(Vec::new());
        }

        debug!(collection = %self.collection, ?query, "running query");
        self.store.backend().find(&self.collection, query).await
    }

    /// Returns the next document, running the query on the first call.
    pub async fn next(&mut self) -> DocumentStoreResult<Option<Document>> {
        if self.buffer.is_none() {
            let records = self.fetch(self.query.clone()).await?;
            self.buffer = Some(records.into());
        }

        let record = self.buffer.as_mut().and_then(VecDeque::pop_front);
        Ok(record.map(|record| self.materialize(record)))
    }

    /// Materializes the record at `index` of the current results without consuming the
    /// cursor.
    pub async fn nth(&self, index: usize) -> DocumentStoreResult<Option<Document>> {
        if self.query.limit.is_some_and(|limit| index >= limit) {
            return Ok(None);
        }

        let mut query = self.query.clone();
        query.offset = Some(query.offset.unwrap_or(0).saturating_add(index));
        query.limit = Some(1);

        let record = self.fetch(query).await?.into_iter().next();
        Ok(record.map(|record| self.materialize(record)))
    }

    /// Number of records the cursor yields in total, respecting skip and limit.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        let total = self
            .store
            .backend()
            .count(&self.collection, self.query.filter.clone())
            .await?;

        let remaining = total.saturating_sub(self.query.offset.unwrap_or(0) as u64);
        Ok(match self.query.limit {
            Some(limit) => remaining.min(limit as u64),
            None => remaining,
        })
    }

    /// Drains the remaining documents.
    pub async fn to_vec(mut self) -> DocumentStoreResult<Vec<Document>> {
        let mut documents = Vec::new();
        while let Some(document) = self.next().await? {
            documents.push(document);
        }
        Ok(documents)
    }
}
