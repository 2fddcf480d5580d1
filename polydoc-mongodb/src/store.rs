use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{ClientOptions, Credential, FindOptions, IndexOptions},
};
use tracing::debug;

use polydoc_core::{
    backend::{Database, DatabaseBuilder, DbRef},
    config::ConnectionConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query, QueryVisitor, SortDirection},
    schema::ID_FIELD,
};

use crate::{query::MongoQueryTranslator, sanitizer::KeySanitizer};

fn backend_error(error: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(error.to_string())
}

/// MongoDB-backed database collaborator.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(collection_name)
    }

    /// Driver options for the window and ordering of `query`.
    ///
    /// Limits beyond `i64::MAX` are clamped, since a negative limit has a different
    /// meaning to the server.
    fn find_options(query: &Query) -> FindOptions {
        let mut options = FindOptions::default();

        options.limit = query.limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
        options.skip = query.offset.map(|skip| u64::try_from(skip).unwrap_or(u64::MAX));
        if !query.sort.is_empty() {
            options.sort = Some(
                query
                    .sort
                    .iter()
                    .map(|key| {
                        let direction = match key.direction {
                            SortDirection::Asc => 1,
                            SortDirection::Desc => -1,
                        };
                        (key.field.clone(), Bson::Int32(direction))
                    })
                    .collect(),
            );
        }

        options
    }

    /// Identifier to upsert by, or `None` for a record the server should assign one to.
    ///
    /// A `Null` identifier counts as absent and is dropped from the record.
    fn take_identifier(record: &mut Document) -> DocumentStoreResult<Option<ObjectId>> {
        if matches!(record.get(ID_FIELD), Some(Bson::Null)) {
            record.remove(ID_FIELD);
        }

        match record.get(ID_FIELD) {
            Some(Bson::ObjectId(id)) => Ok(Some(*id)),
            None => Ok(None),
            Some(other) => Err(DocumentStoreError::InvalidDocument(format!(
                "{} must be an object id, found {:?}",
                ID_FIELD,
                other.element_type()
            ))),
        }
    }

    fn translate(filter: Option<&Expr>) -> DocumentStoreResult<Document> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }
}

#[async_trait]
impl Database for MongoDbStore {
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let options = Self::find_options(&query);

        let filter = Self::translate(query.filter.as_ref())?;
        debug!(collection, filter = %filter, "querying records");

        Ok(self
            .get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)?
            .into_iter()
            .map(KeySanitizer::restore_document)
            .collect())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<Option<Document>> {
        Ok(self
            .get_collection(collection)
            .find_one(Self::translate(filter.as_ref())?)
            .await
            .map_err(backend_error)?
            .map(KeySanitizer::restore_document))
    }

    async fn save(&self, collection: &str, record: Document) -> DocumentStoreResult<ObjectId> {
        let mut record = KeySanitizer::sanitize_document(&record);
        let assigned = Self::take_identifier(&mut record)?;

        match assigned {
            Some(id) => {
                self.get_collection(collection)
                    .replace_one(doc! { ID_FIELD: id }, record)
                    .upsert(true)
                    .await
                    .map_err(backend_error)?;
                Ok(id)
            }
            None => {
                let result = self
                    .get_collection(collection)
                    .insert_one(record)
                    .await
                    .map_err(backend_error)?;

                result.inserted_id.as_object_id().ok_or_else(|| {
                    DocumentStoreError::Backend(format!(
                        "server assigned a non object id identifier: {}",
                        result.inserted_id
                    ))
                })
            }
        }
    }

    async fn remove(&self, collection: &str, id: &ObjectId) -> DocumentStoreResult<()> {
        let result = self
            .get_collection(collection)
            .delete_one(doc! { ID_FIELD: *id })
            .await
            .map_err(backend_error)?;

        if result.deleted_count == 0 {
            return Err(DocumentStoreError::DocumentNotFound(id.to_hex(), collection.to_string()));
        }

        Ok(())
    }

    async fn dereference(&self, pointer: &DbRef) -> DocumentStoreResult<Option<Document>> {
        let database = pointer.database.as_deref().unwrap_or(&self.database);

        Ok(self
            .client
            .database(database)
            .collection::<Document>(&pointer.collection)
            .find_one(doc! { ID_FIELD: pointer.id })
            .await
            .map_err(backend_error)?
            .map(KeySanitizer::restore_document))
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(Self::translate(filter.as_ref())?)
            .await
            .map_err(backend_error)
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .drop()
            .await
            .map_err(backend_error)
    }

    async fn ensure_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { field: 1 })
                    .options(IndexOptions::builder().unique(unique).build())
                    .build(),
            )
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)?
            .into_iter()
            .filter(|name| !name.starts_with("system."))
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Connection settings for a [`MongoDbStore`].
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    credentials: Option<(String, String)>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            credentials: None,
        }
    }

    /// Builder carrying the location and credentials of `config`.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let builder = Self::new(&config.dsn, &config.database);
        match config.credentials() {
            Some((username, password)) => builder.with_credentials(username, password),
            None => builder,
        }
    }

    /// Authenticates with a username and password.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }
}

#[async_trait]
impl DatabaseBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if let Some((username, password)) = self.credentials {
            options.credential = Some(
                Credential::builder()
                    .username(username)
                    .password(password)
                    .build(),
            );
        }

        debug!(database = %self.database, "connecting to mongodb");

        Ok(MongoDbStore::new(
            Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
