//! Typed, validated, inheritance-aware document schemas over schema-less document stores.
//!
//! This crate is the primary entry point of polydoc. It re-exports the core types and
//! provides access to the storage backends.
//!
//! # Features
//!
//! - **Declarative schemas** - Fields with types, defaults, validators and required/unique flags
//! - **Inheritance** - Subtypes share their root's collection and are queried polymorphically
//! - **References and embedded documents** - Child documents saved with their owner
//! - **Multiple backends** - In-memory and MongoDB storage behind one `Database` trait
//!
//! # Quick Start
//!
//! ```ignore
//! use polydoc::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let mut store = DocumentStore::new(InMemoryStore::new());
//!
//!     store.register(
//!         SchemaBuilder::new("Shape")
//!             .inheritance(true)
//!             .property("x", Property::integer())
//!             .property("y", Property::integer()),
//!     )?;
//!     store.register(
//!         SchemaBuilder::new("Circle")
//!             .extends("Shape")
//!             .property("radius", Property::float().validator(NumberRange::at_least(0.0))),
//!     )?;
//!
//!     let mut circle = store.create_with("Circle", [("radius", 2.5)])?;
//!     circle.save(&store).await?;
//!
//!     // Queries against the base type yield documents of their stored subtype.
//!     let shapes = store.manager("Shape")?.all().to_vec().await?;
//!     assert_eq!(shapes[0].class_name(), "Circle");
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # References
//!
//! ```ignore
//! store.register(SchemaBuilder::new("Person").property("name", Property::string()))?;
//! store.register(SchemaBuilder::new("Post").property("author", Property::reference("Person")))?;
//!
//! let mut post = store.create("Post")?;
//! post.set_reference("author", store.create_with("Person", [("name", "Slash")])?)?;
//! post.save(&store).await?; // saves the author first, then stores a pointer to it
//!
//! let mut post = store.manager("Post")?.get(post.id()?).await?.unwrap();
//! let author = post.reference(&store, "author").await?.unwrap();
//! assert_eq!(author.get_str("name")?, "Slash");
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use polydoc_core::{
    backend, collection, config, cursor, document, error, property, query, schema, store, validator,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use polydoc_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use polydoc_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
