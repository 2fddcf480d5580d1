//! Convenient re-exports of commonly used types from polydoc.
//!
//! ```ignore
//! use polydoc::prelude::*;
//! ```
//!
//! This provides access to:
//! - The document store, schemas and properties
//! - Documents, collection managers and cursors
//! - Backend traits and builders
//! - Filters and query construction
//! - Validators and error types

pub use polydoc_core::{
    backend::{Database, DatabaseBuilder, DbRef},
    collection::CollectionManager,
    config::ConnectionConfig,
    cursor::Cursor,
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult, ValidationError},
    property::{Property, PropertyKind},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    schema::{Schema, SchemaBuilder, SchemaRegistry},
    store::DocumentStore,
    validator::{
        Email, GeoPoint, IpAddress, Length, NumberRange, ObjectIdFormat, Predicate, Regexp,
        TypeCheck, Url, Validator,
    },
};
