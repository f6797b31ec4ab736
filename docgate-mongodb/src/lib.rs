//! MongoDB driver implementation for docgate.
//!
//! This crate provides a MongoDB-based implementation of the `StoreDriver` trait. Every
//! model operation maps onto the matching collection operation of the official driver;
//! filters, updates and options are forwarded as given.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docgate = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docgate::{prelude::*, mongodb::MongoDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = MongoDriver::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let client = Client::new(driver);
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_mongodb;

pub mod store;

pub use store::{MongoDriver, MongoDriverBuilder};
