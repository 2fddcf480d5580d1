//! Schema-aware gateway to one storage collection.
//!
//! A [`CollectionManager`] is a short-lived view borrowed from a
//! [`DocumentStore`](crate::store::DocumentStore). Finds are narrowed to the schema's
//! polymorphic tag when inheritance is enabled, so querying a base type also returns
//! stored subtypes while querying a subtype only returns that subtype and its own
//! descendants. Records come back as [`Document`]s of their most-derived registered type.
//!
//! # Example
//!
//! ```ignore
//! use polydoc::query::{Filter, SortDirection};
//!
//! let blogs = store.manager("Blog")?;
//! let first = blogs.find_one(Filter::eq("title", "Gun & Rose")).await?;
//!
//! let mut cursor = blogs.all().sort("title", SortDirection::Asc).limit(2);
//! while let Some(blog) = cursor.next().await? {
//!     println!("{}", blog.get_str("title")?);
//! }
//! ```
//!
//! Operations the manager does not wrap (`count`, `drop`, `ensure_index`) go to the
//! backend unchanged.

use bson::{Document as RawDocument, oid::ObjectId};
use std::sync::Arc;
use tracing::debug;

use crate::{
    backend::{Database, DbRef},
    cursor::Cursor,
    document::Document,
    error::DocumentStoreResult,
    query::{Expr, Filter, Query},
    schema::{CLASSES_FIELD, ID_FIELD, Schema},
    store::DocumentStore,
};

/// Per-schema view over one collection of a [`DocumentStore`].
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the store borrow
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct CollectionManager<'a, B: Database> {
    schema: Arc<Schema>,
    collection: String,
    store: &'a DocumentStore<B>,
}

impl<'a, B: Database> CollectionManager<'a, B> {
    /// Creates a manager for `schema` (internal use).
    ///
    /// Embedded schemas have no collection and are rejected.
    pub(crate) fn new(schema: Arc<Schema>, store: &'a DocumentStore<B>) -> DocumentStoreResult<Self> {
        let collection = schema.collection()?.to_string();
        Ok(Self { schema, collection, store })
    }

    /// Returns the name of the managed collection.
    pub fn name(&self) -> &str {
        &self.collection
    }

    /// The schema documents are materialized as, before subtype resolution.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// ANDs the polymorphic tag constraint onto `filter` when inheritance is enabled.
    fn scoped(&self, filter: Option<Expr>) -> Option<Expr> {
        if !self.schema.inheritance_enabled() {
            return filter;
        }

        let tag = Filter::eq(CLASSES_FIELD, self.schema.name());
        Some(match filter {
            Some(filter) => filter.and(tag),
            None => tag,
        })
    }

    /// Returns a lazy cursor over the matching records.
    pub fn find(&self, filter: impl Into<Option<Expr>>) -> Cursor<'a, B> {
        let query = Query::builder().filter(self.scoped(filter.into())).build();
        Cursor::new(self.store, self.schema.clone(), self.collection.clone(), query)
    }

    /// Returns a lazy cursor over every record of this schema and its subtypes.
    pub fn all(&self) -> Cursor<'a, B> {
        self.find(None::<Expr>)
    }

    /// Returns the first matching record as a document, or `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the backend fails.
    pub async fn find_one(&self, filter: impl Into<Option<Expr>>) -> DocumentStoreResult<Option<Document>> {
        let filter = self.scoped(filter.into());

        let Some(record) = self.store.backend().find_one(&self.collection, filter).await? else {
            return Ok(None);
        };

        let schema = self.store.registry().resolve_record_schema(&self.schema, &record);
        Ok(Some(Document::from_raw(schema, record)))
    }

    /// Looks a document up by identifier.
    pub async fn get(&self, id: ObjectId) -> DocumentStoreResult<Option<Document>> {
        self.find_one(Filter::eq(ID_FIELD, id)).await
    }

    /// Whether any record in this schema's scope matches `filter`.
    pub(crate) async fn exists(&self, filter: Expr) -> DocumentStoreResult<bool> {
        let filter = self.scoped(Some(filter));
        Ok(self.store.backend().find_one(&self.collection, filter).await?.is_some())
    }

    /// Inserts or replaces a raw record and returns its identifier.
    pub async fn save(&self, record: RawDocument) -> DocumentStoreResult<ObjectId> {
        let id = self.store.backend().save(&self.collection, record).await?;
        debug!(collection = %self.collection, id = %id, "saved record");
        Ok(id)
    }

    /// Deletes the record with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`](crate::error::DocumentStoreError::DocumentNotFound)
    /// when no such record exists.
    pub async fn remove(&self, id: &ObjectId) -> DocumentStoreResult<()> {
        self.store.backend().remove(&self.collection, id).await?;
        debug!(collection = %self.collection, id = %id, "removed record");
        Ok(())
    }

    /// Follows a pointer to a record of this schema's collection.
    pub async fn dereference(&self, pointer: &DbRef) -> DocumentStoreResult<Option<RawDocument>> {
        debug!(collection = %pointer.collection, id = %pointer.id, "dereferencing");
        self.store.backend().dereference(pointer).await
    }

    /// Counts matching records across the whole collection, without the polymorphic scope.
    pub async fn count(&self, filter: impl Into<Option<Expr>>) -> DocumentStoreResult<u64> {
        self.store.backend().count(&self.collection, filter.into()).await
    }

    /// Drops the whole collection, including records of sibling subtypes.
    pub async fn drop(&self) -> DocumentStoreResult<()> {
        self.store.backend().drop_collection(&self.collection).await
    }

    /// Creates an index on `field`; a unique index makes the backend reject duplicates.
    pub async fn ensure_index(&self, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.store.backend().ensure_index(&self.collection, field, unique).await
    }
}
