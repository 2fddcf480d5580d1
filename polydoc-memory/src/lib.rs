//! In-memory database backend for polydoc.
//!
//! This crate provides a thread-safe, in-memory implementation of the `Database` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for
//! development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Insertion order** - Unsorted finds return records in the order they were first saved
//! - **Document-database matching** - Array equality, dotted paths and multi-key sorts
//!
//! # Quick Start
//!
//! ```ignore
//! use polydoc::{memory::InMemoryStore, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = DocumentStore::new(InMemoryStore::new());
//!     store.register(SchemaBuilder::new("User").property("name", Property::string()))?;
//!
//!     let mut user = store.create_with("User", [("name", "Alice")])?;
//!     user.save(&store).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as polydoc_memory;

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
