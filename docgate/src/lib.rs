//! Main docgate crate: a type-safe access layer over schema-less document stores.
//!
//! Application code talks to a collection through a [`Model`](model::Model). The model
//! validates writes with an [`Adapter`](adapter::Adapter), presents identifiers as plain
//! strings whatever the store keeps internally, and delegates everything else to a
//! [`StoreDriver`](driver::StoreDriver).
//!
//! # Features
//!
//! - **Validated writes** - Inserts are rejected before reaching the store when invalid
//! - **Partial update parsing** - Update operands are coerced field by field
//! - **String identifiers** - Binary store ids are translated on the way in and out
//! - **Multiple drivers** - In-memory and MongoDB drivers behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryDriver};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> ModelResult<()> {
//!     let client = Client::new(InMemoryDriver::builder().build().await?);
//!
//!     let users = client.model(
//!         "users",
//!         SchemaAdapter::new(
//!             Schema::binary_id()
//!                 .field("name", Field::string())
//!                 .field("age", Field::int().coerce().optional()),
//!         ),
//!     );
//!
//!     let ann = users.insert_one(doc! { "name": "Ann", "age": 31 }).await?;
//!     let id = ann.get_str("_id").unwrap_or_default().to_string();
//!
//!     users
//!         .update_one(doc! { "_id": &id }, doc! { "$set": { "age": "32" } }, UpdateOptions::default())
//!         .await?;
//!
//!     let found = users.find_by_id(&id).await?;
//!     println!("{found:?}");
//!
//!     client.shutdown().await
//! }
//! ```
//!
//! # Typed documents
//!
//! With [`TypedAdapter`](adapter::TypedAdapter) the model reads and writes serde types:
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     #[serde(rename = "_id")]
//!     id: String,
//!     name: String,
//! }
//!
//! let users = client.model("users", TypedAdapter::<User>::binary_id());
//! let user: User = users.insert_one(doc! { "name": "Ann" }).await?;
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - In-memory store for development and testing
//! - [`mongodb`] - MongoDB driver (requires the `mongodb` feature)

pub mod prelude;

pub use docgate_core::{adapter, client, document, driver, error, id, model, options};

// Re-export BSON types for convenience
pub use bson;

/// In-memory store driver.
pub mod memory {
    pub use docgate_memory::{InMemoryDriver, InMemoryDriverBuilder, MemoryStoreError};
}

/// MongoDB store driver.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docgate_mongodb::{MongoDriver, MongoDriverBuilder};
}
