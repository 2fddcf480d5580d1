//! The document store context.
//!
//! [`DocumentStore`] owns a [`Database`] backend and the [`SchemaRegistry`]. It is the
//! explicit context value every other operation borrows: schemas are registered on it,
//! collection managers are views over it, and documents are saved and queried through it.
//! There is no global connection; build one store and pass it around.
//!
//! # Example
//!
//! ```ignore
//! use polydoc::prelude::*;
//!
//! let mut store = DocumentStore::new(InMemoryStore::new());
//! store.register(
//!     SchemaBuilder::new("Blog")
//!         .property("title", Property::string().required())
//!         .property("tags", Property::list()),
//! )?;
//!
//! let mut blog = store.create_with("Blog", [("title", "Slash rocks")])?;
//! blog.save(&store).await?;
//! ```

use bson::Bson;
use std::sync::Arc;

use crate::{
    backend::Database,
    collection::CollectionManager,
    document::Document,
    error::DocumentStoreResult,
    schema::{Schema, SchemaBuilder, SchemaRegistry},
};

/// A schema registry bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: Database> {
    backend: B,
    registry: SchemaRegistry,
}

impl<B: Database> DocumentStore<B> {
    /// Creates a new document store with the given backend and no schemas.
    pub fn new(backend: B) -> Self {
        Self { backend, registry: SchemaRegistry::new() }
    }

    /// Returns a reference to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Every registered schema.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Registers a schema. See [`SchemaRegistry::register`].
    ///
    /// # Errors
    ///
    /// Returns a schema definition error if the schema cannot be aggregated.
    pub fn register(&mut self, builder: SchemaBuilder) -> DocumentStoreResult<Arc<Schema>> {
        self.registry.register(builder)
    }

    /// # Errors
    ///
    /// Returns an unknown schema error if nothing is registered under `name`.
    pub fn schema(&self, name: &str) -> DocumentStoreResult<Arc<Schema>> {
        self.registry.get(name)
    }

    /// Gets the collection manager of the named schema.
    ///
    /// # Errors
    ///
    /// Fails for unknown and embedded schemas.
    pub fn manager(&self, name: &str) -> DocumentStoreResult<CollectionManager<'_, B>> {
        self.manager_for(&self.schema(name)?)
    }

    /// Manager for an already resolved schema.
    pub fn manager_for(&self, schema: &Arc<Schema>) -> DocumentStoreResult<CollectionManager<'_, B>> {
        CollectionManager::new(schema.clone(), self)
    }

    /// Creates an empty, unsaved document of the named schema.
    pub fn create(&self, name: &str) -> DocumentStoreResult<Document> {
        Ok(Document::new(self.schema(name)?))
    }

    /// Creates an unsaved document of the named schema with initial values.
    pub fn create_with<K, V>(
        &self,
        name: &str,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> DocumentStoreResult<Document>
    where
        K: AsRef<str>,
        V: Into<Bson>,
    {
        Document::with_fields(self.schema(name)?, fields)
    }

    /// Drops a collection by name.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Lists every collection holding at least one record.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the store and releases the backend.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}
