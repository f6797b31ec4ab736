//! A type-safe access layer between application code and a schema-less document store.
//!
//! This crate is the core of the docgate project and provides:
//!
//! - **Models** ([`model`]) - Validated, identifier-aware CRUD operations on one collection
//! - **Adapters** ([`adapter`]) - The contract schema validation libraries implement, plus two bundled adapters
//! - **Identifier translation** ([`id`]) - Conversion between string and binary identifiers
//! - **Store drivers** ([`driver`]) - Traits for the underlying document database
//! - **Client** ([`client`]) - Owns a driver and constructs models
//! - **Options** ([`options`]) - Model configuration and per-call store options
//! - **Error handling** ([`error`]) - Error types, validation issues and result types
//! - **Document helpers** ([`document`]) - Conversions between typed values and BSON documents
//!
//! # Example
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryDriver};
//! use bson::doc;
//!
//! let client = Client::new(InMemoryDriver::new());
//! let users = client.model(
//!     "users",
//!     SchemaAdapter::new(Schema::binary_id().field("name", Field::string())),
//! );
//!
//! let ann = users.insert_one(doc! { "name": "Ann" }).await?;
//! let found = users.find_by_id(ann.get_str("_id")?).await?;
//! ```

pub mod adapter;
pub mod client;
pub mod document;
pub mod driver;
pub mod error;
pub mod id;
pub mod model;
pub mod options;
