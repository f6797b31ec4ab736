//! In-memory document store driver for docgate.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreDriver`
//! trait. It understands the common subset of the document query and update language
//! and is meant for development, tests and small embedded deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Store-faithful identifiers** - Generates binary ids and never conflates a string id
//!   with a binary one
//! - **Query support** - Comparison, list, logical and element operators on dotted paths
//! - **Update support** - `$set`, `$inc`, `$push` and friends, plus upserts
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryDriver};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(InMemoryDriver::new());
//!     let users = client.model("users", SchemaAdapter::new(Schema::binary_id().field("name", Field::string())));
//!
//!     let user = users.insert_one(doc! { "name": "Alice" }).await?;
//!     assert!(user.get_str("_id").is_ok());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_memory;

pub mod error;
mod evaluator;
pub mod store;
mod update;

pub use error::{MemoryStoreError, MemoryStoreResult};
pub use store::{InMemoryDriver, InMemoryDriverBuilder};
