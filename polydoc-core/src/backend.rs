//! The storage collaborator the mapping layer talks to.
//!
//! The [`Database`] trait is the whole surface the core needs from a document database:
//! finds, saves, removes, pointer dereferencing and a handful of passthrough collection
//! operations. Connection pooling, authentication and transport belong to the
//! implementation.
//!
//! Every call is awaited in program order by the core. Implementations must be
//! `Send + Sync` so a store can be shared, but the core itself never issues concurrent
//! calls or retries failed ones.

use async_trait::async_trait;
use bson::{Bson, Document as RawDocument, doc, oid::ObjectId};
use std::fmt::Debug;

use crate::{error::DocumentStoreResult, query::{Expr, Query}};

/// Stored pointer to a record in another (or the same) collection.
///
/// Persisted as `{ "$ref": collection, "$id": id, "$db": database }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbRef {
    pub collection: String,
    pub id: ObjectId,
    pub database: Option<String>,
}

impl DbRef {
    /// Pointer to record `id` in `collection`, optionally in another database.
    pub fn new(collection: impl Into<String>, id: ObjectId, database: Option<String>) -> Self {
        Self { collection: collection.into(), id, database }
    }

    /// Encodes the pointer as a `{ $ref, $id, $db }` document.
    pub fn to_bson(&self) -> Bson {
        let mut pointer = doc! { "$ref": self.collection.as_str(), "$id": self.id };
        if let Some(database) = &self.database {
            pointer.insert("$db", database.as_str());
        }
        Bson::Document(pointer)
    }

    /// Reads a pointer back from its stored form. Returns `None` for anything else.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        let pointer = value.as_document()?;
        let collection = pointer.get("$ref")?.as_str()?;
        let id = pointer.get("$id")?.as_object_id()?;
        let database = pointer
            .get("$db")
            .and_then(Bson::as_str)
            .map(ToOwned::to_owned);

        Some(Self::new(collection, id, database))
    }
}

impl From<DbRef> for Bson {
    fn from(pointer: DbRef) -> Self {
        pointer.to_bson()
    }
}

/// A schema-less document database.
///
/// Raw records are plain BSON documents; the identifier lives under `_id`.
#[async_trait]
pub trait Database: Send + Sync + Debug {
    /// Returns every record of `collection` matching the query, in storage order unless
    /// the query sorts.
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<RawDocument>>;

    /// Returns the first record matching `filter`, or `None`.
    async fn find_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<Option<RawDocument>>;

    /// Inserts `record`, or replaces the stored record with the same `_id`.
    ///
    /// Records without an `_id` get one assigned by the backend. Returns the identifier.
    async fn save(&self, collection: &str, record: RawDocument) -> DocumentStoreResult<ObjectId>;

    /// Deletes the record with the given identifier.
    async fn remove(&self, collection: &str, id: &ObjectId) -> DocumentStoreResult<()>;

    /// Follows a stored pointer. Returns `None` when the target no longer exists.
    async fn dereference(&self, pointer: &DbRef) -> DocumentStoreResult<Option<RawDocument>>;

    /// Counts the records of `collection` matching `filter`.
    async fn count(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64>;

    /// Drops a collection and all of its records. Dropping a missing collection succeeds.
    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()>;

    /// Creates an ascending index on `field`, optionally enforcing uniqueness.
    async fn ensure_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> DocumentStoreResult<()>;

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Name of the database, stamped into stored pointers.
    fn database_name(&self) -> &str;

    /// Releases backend resources. The default does nothing.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> Database for &B
where
    B: Database,
{
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<RawDocument>> {
        (*self).find(collection, query).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<Option<RawDocument>> {
        (*self).find_one(collection, filter).await
    }

    async fn save(&self, collection: &str, record: RawDocument) -> DocumentStoreResult<ObjectId> {
        (*self).save(collection, record).await
    }

    async fn remove(&self, collection: &str, id: &ObjectId) -> DocumentStoreResult<()> {
        (*self).remove(collection, id).await
    }

    async fn dereference(&self, pointer: &DbRef) -> DocumentStoreResult<Option<RawDocument>> {
        (*self).dereference(pointer).await
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        (*self).count(collection, filter).await
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        (*self).drop_collection(collection).await
    }

    async fn ensure_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> DocumentStoreResult<()> {
        (*self).ensure_index(collection, field, unique).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        (*self).list_collections().await
    }

    fn database_name(&self) -> &str {
        (*self).database_name()
    }
}

/// Factory for [`Database`] implementations.
#[async_trait]
pub trait DatabaseBuilder {
    type Backend: Database;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
