//! MongoDB backend implementation for polydoc.
//!
//! This crate provides a MongoDB-based implementation of the `Database` trait, enabling
//! persistent document storage using MongoDB's query engine.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! polydoc = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native pointers** - References are stored as `$ref`/`$id`/`$db` documents
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//! - **Indexing** - Ascending and unique indexes through `ensure_index`
//!
//! # Example
//!
//! ```ignore
//! use polydoc::{backend::DatabaseBuilder, config::ConnectionConfig, mongodb::MongoDbStoreBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new("mongodb://localhost:27017", "blog");
//!     let store = MongoDbStoreBuilder::from_config(&config).build().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as polydoc_mongodb;

pub mod query;
pub mod sanitizer;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
