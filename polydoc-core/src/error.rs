//! Error types and result types for schema, document and store operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`]. Validation
//! failures carry a [`ValidationError`] describing the first violated rule.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::fmt;
use thiserror::Error;

/// A single failed validation rule.
///
/// `field` is filled in by the property that ran the failing validator, so messages
/// produced by stateless validators read naturally once they reach the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field whose value violated the rule, when known.
    pub field: Option<String>,
    /// Human-readable description of the violation.
    pub message: String,
}

impl ValidationError {
    /// Error not yet tied to a field.
    pub fn new(message: impl Into<String>) -> Self {
        Self { field: None, message: message.into() }
    }

    /// Error for the named field.
    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: Some(field.into()), message: message.into() }
    }

    /// Sets the field name unless one is already present.
    pub fn in_field(mut self, field: &str) -> Self {
        if self.field.is_none() {
            self.field = Some(field.to_string());
        }
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Represents all possible errors raised by the mapping layer and its storage backends.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between BSON, JSON and Rust types.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A schema could not be registered. The schema is unusable.
    #[error("Schema definition error: {0}")]
    SchemaDefinition(String),
    /// No schema with the given name has been registered.
    #[error("Unknown schema: {0}")]
    UnknownSchema(String),
    /// The field is neither declared on the schema nor installed on the instance.
    /// The first argument is the field name, the second is the schema name.
    #[error("Unknown field {0} on {1}")]
    UnknownField(String, String),
    /// A value failed validation. Nothing was written to the store.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    /// The identifier of a document that was never persisted was requested.
    #[error("Document of type {0} has not been saved")]
    NotSaved(String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The schema has no collection of its own, as with embedded schemas.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// A record or value does not have the shape the operation requires.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error reported by the underlying storage backend, passed through as-is.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for mapping-layer operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
