//! Errors raised by the in-memory driver.
//!
//! They reach callers inside [`ModelError::Store`], unchanged, just like the errors of a
//! real database driver would.

use docgate_core::error::ModelError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryStoreError {
    /// A document with the same identifier already exists in the collection.
    #[error("Duplicate key {id} in collection {collection}")]
    DuplicateKey { collection: String, id: String },
    /// The filter or update uses an operator this driver does not implement.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// The filter is malformed.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// The update is malformed or cannot be applied to the document.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
    /// The update would change the identifier of an existing document.
    #[error("Performing an update on the path '_id' would modify the immutable field '_id'")]
    ImmutableId,
}

pub type MemoryStoreResult<T> = Result<T, MemoryStoreError>;

impl From<MemoryStoreError> for ModelError {
    fn from(err: MemoryStoreError) -> Self {
        ModelError::store(err)
    }
}
