//! In-memory storage implementation of the database collaborator.
//!
//! Records are kept per collection in insertion order, keyed by the hex form of their
//! identifier, behind an async-aware read-write lock.

use async_trait::async_trait;
use bson::{Bson, Document as RawDocument, oid::ObjectId};
use indexmap::IndexMap;
use mea::rwlock::RwLock;
use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use tracing::debug;

use polydoc_core::{
    backend::{Database, DatabaseBuilder, DbRef},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query, SortDirection},
    schema::ID_FIELD,
};

use crate::evaluator::{Comparable, DocumentEvaluator, lookup};

type CollectionMap = IndexMap<String, RawDocument>;
type StoreMap = HashMap<String, CollectionMap>;

const DEFAULT_DATABASE_NAME: &str = "memory";

/// Thread-safe in-memory document database.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so clones share
/// the same records. Queries scan the whole collection; there are no indexes.
///
/// # Example
///
/// ```ignore
/// use polydoc_memory::InMemoryStore;
/// use polydoc::backend::Database;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let id = store.save("users", doc! { "name": "Alice" }).await?;
/// let found = store.find_one("users", Some(Filter::eq("_id", id))).await?;
/// assert!(found.is_some());
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> (hex id -> record)
    store: Arc<RwLock<StoreMap>>,
    database_name: String,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store named `memory`.
    pub fn new() -> Self {
        Self::with_database_name(DEFAULT_DATABASE_NAME)
    }

    /// Creates an empty store reporting `name` as its database.
    pub fn with_database_name(name: impl Into<String>) -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            database_name: name.into(),
        }
    }

    /// Creates a builder for configuring the store.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    fn matching<'s>(
        collection: &'s CollectionMap,
        filter: Option<&Expr>,
    ) -> DocumentStoreResult<Vec<&'s RawDocument>> {
        let mut matched = Vec::new();
        for record in collection.values() {
            if DocumentEvaluator::matches(record, filter)? {
                matched.push(record);
            }
        }
        Ok(matched)
    }
}

fn sort_records(records: &mut [&RawDocument], query: &Query) {
    if query.sort.is_empty() {
        return;
    }

    records.sort_by(|a, b| {
        for key in &query.sort {
            let left = lookup(a, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);
            let right = lookup(b, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);

            let ordering = match key.direction {
                SortDirection::Asc => left.sort_cmp(&right),
                SortDirection::Desc => right.sort_cmp(&left),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl Database for InMemoryStore {
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<RawDocument>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut records = Self::matching(collection_map, query.filter.as_ref())?;
        sort_records(&mut records, &query);

        Ok(records
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<Option<RawDocument>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(None);
        };

        for record in collection_map.values() {
            if DocumentEvaluator::matches(record, filter.as_ref())? {
                return Ok(Some(record.clone()));
            }
        }

        Ok(None)
    }

    async fn save(&self, collection: &str, mut record: RawDocument) -> DocumentStoreResult<ObjectId> {
        let assigned = match record.get(ID_FIELD) {
            Some(Bson::ObjectId(id)) => Some(*id),
            None | Some(Bson::Null) => None,
            Some(other) => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "{} must be an object id, found {:?}",
                    ID_FIELD,
                    other.element_type()
                )));
            }
        };

        let id = match assigned {
            Some(id) => id,
            None => {
                let id = ObjectId::new();
                let mut stored = RawDocument::new();
                stored.insert(ID_FIELD, id);
                for (key, value) in record {
                    if key != ID_FIELD {
                        stored.insert(key, value);
                    }
                }
                record = stored;
                id
            }
        };

        let mut store = self.store.write().await;
        store
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_hex(), record);

        debug!(collection, id = %id, "stored record");
        Ok(id)
    }

    async fn remove(&self, collection: &str, id: &ObjectId) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let removed = store
            .get_mut(collection)
            .and_then(|collection_map| collection_map.shift_remove(&id.to_hex()));

        match removed {
            Some(_) => Ok(()),
            None => Err(DocumentStoreError::DocumentNotFound(id.to_hex(), collection.to_string())),
        }
    }

    async fn dereference(&self, pointer: &DbRef) -> DocumentStoreResult<Option<RawDocument>> {
        if pointer.database.as_deref().is_some_and(|database| database != self.database_name) {
            return Ok(None);
        }

        let store = self.store.read().await;
        Ok(store
            .get(&pointer.collection)
            .and_then(|collection_map| collection_map.get(&pointer.id.to_hex()))
            .cloned())
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(0);
        };

        Ok(Self::matching(collection_map, filter.as_ref())?.len() as u64)
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.store.write().await.remove(collection);
        Ok(())
    }

    async fn ensure_index(
        &self,
        _collection: &str,
        _field: &str,
        _unique: bool,
    ) -> DocumentStoreResult<()> {
        // In-memory store does not support indexing (no-op)
        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .read()
            .await
            .iter()
            .filter(|(_, collection_map)| !collection_map.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use polydoc_memory::InMemoryStore;
/// use polydoc::backend::DatabaseBuilder;
///
/// let store = InMemoryStore::builder().with_database_name("mongoltest").build().await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    database_name: Option<String>,
}

impl InMemoryStoreBuilder {
    /// Database name used to resolve pointers.
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }
}

#[async_trait]
impl DatabaseBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new, empty [`InMemoryStore`]. Never fails.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(match self.database_name {
            Some(name) => InMemoryStore::with_database_name(name),
            None => InMemoryStore::new(),
        })
    }
}
