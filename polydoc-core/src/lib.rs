//! An object-document mapping layer over schema-less document databases.
//!
//! This crate is the core of the polydoc project and provides:
//!
//! - **Validators** ([`validator`]) - Stateless type, format and range checks
//! - **Properties** ([`property`]) - Typed field definitions with defaults and conversions
//! - **Schemas** ([`schema`]) - Schema declaration and inheritance-aware registration
//! - **Documents** ([`document`]) - Schema-bound records with a side cache for child documents
//! - **Collection managers** ([`collection`]) - Schema-aware, polymorphic collection access
//! - **Cursors** ([`cursor`]) - Lazy results materialized as their most-derived type
//! - **Document store** ([`store`]) - The context owning the backend and the registry
//! - **Backend abstraction** ([`backend`]) - The database collaborator trait
//! - **Filters** ([`query`]) - Filter expressions passed through to backends
//! - **Configuration** ([`config`]) - Connection settings for backends
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use polydoc_core::{property::Property, schema::SchemaBuilder, store::DocumentStore};
//!
//! let mut store = DocumentStore::new(backend);
//! store.register(SchemaBuilder::new("Shape").inheritance(true).property("x", Property::any()))?;
//! store.register(SchemaBuilder::new("Circle").extends("Shape").property("radius", Property::float()))?;
//!
//! store.create("Circle")?.save(&store).await?;
//! let shapes = store.manager("Shape")?.all().to_vec().await?;
//! assert_eq!(shapes[0].class_name(), "Circle");
//! ```

#[allow(unused_extern_crates)]
extern crate self as polydoc_core;

pub mod backend;
pub mod collection;
pub mod config;
pub mod cursor;
pub mod document;
pub mod error;
pub mod property;
pub mod query;
pub mod schema;
pub mod store;
pub mod validator;
