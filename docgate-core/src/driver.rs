//! Store driver abstraction consumed by the model layer.
//!
//! A [`StoreDriver`] is the capability set of the underlying document database: insert,
//! find, update, delete, count and distinct over a named collection. Filters, updates and
//! documents handed to a driver are already in the store representation (binary
//! identifiers where the collection uses them), and drivers return raw store documents.
//!
//! # Traits
//!
//! - [`StoreDriver`]: the operations a store must provide
//! - [`StoreDriverBuilder`]: factory trait for creating driver instances
//!
//! Errors raised by a driver are wrapped in [`ModelError::Store`](crate::error::ModelError::Store)
//! without being interpreted, so callers can downcast to the driver's own error type.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::ModelResult,
    options::{
        CountOptions, FindOneAndDeleteOptions, FindOneAndUpdateOptions, FindOptions, UpdateOptions,
    },
};

/// A forward-only stream of raw store documents.
pub type DocumentCursor = BoxStream<'static, ModelResult<Document>>;

/// Acknowledgement of a single insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneOutcome {
    pub acknowledged: bool,
    /// The stored identifier, generated by the store if the document had none.
    pub inserted_id: Bson,
}

/// Acknowledgement of a bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyOutcome {
    pub acknowledged: bool,
    /// Stored identifiers, in the order the documents were given.
    pub inserted_ids: Vec<Bson>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    /// The identifier of the inserted document when the update upserted.
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted_count: u64,
}

/// Abstract interface for document store drivers.
///
/// # Thread Safety
///
/// Implementations must be thread-safe. A single driver is shared by every model
/// created from one [`Client`](crate::client::Client), and calls may be in flight
/// concurrently. Concurrency control is the store's responsibility.
///
/// # Identifiers
///
/// `insert_one` and `insert_many` must generate a binary identifier for documents
/// that lack an `_id` and report it back in the outcome.
#[async_trait]
pub trait StoreDriver: Send + Sync + Debug {
    async fn insert_one(&self, collection: &str, document: Document) -> ModelResult<InsertOneOutcome>;

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> ModelResult<InsertManyOutcome>;

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Option<Document>>;

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Vec<Document>>;

    /// Opens a lazy cursor over the matching documents.
    async fn find_cursor(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<DocumentCursor>;

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome>;

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome>;

    /// Updates one document and returns it as it is after the update.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> ModelResult<Option<Document>>;

    async fn delete_one(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome>;

    async fn delete_many(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome>;

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> ModelResult<Option<Document>>;

    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        options: CountOptions,
    ) -> ModelResult<u64>;

    async fn distinct(&self, collection: &str, key: &str, filter: Document) -> ModelResult<Vec<Bson>>;

    /// Cleanly shuts down the driver, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> ModelResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<D> StoreDriver for &D
where
    D: StoreDriver + ?Sized,
{
    async fn insert_one(&self, collection: &str, document: Document) -> ModelResult<InsertOneOutcome> {
        (**self).insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> ModelResult<InsertManyOutcome> {
        (**self).insert_many(collection, documents).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Option<Document>> {
        (**self).find_one(collection, filter, options).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Vec<Document>> {
        (**self).find(collection, filter, options).await
    }

    async fn find_cursor(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<DocumentCursor> {
        (**self).find_cursor(collection, filter, options).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        (**self)
            .update_one(collection, filter, update, options)
            .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        (**self)
            .update_many(collection, filter, update, options)
            .await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> ModelResult<Option<Document>> {
        (**self)
            .find_one_and_update(collection, filter, update, options)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        (**self).delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        (**self).delete_many(collection, filter).await
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> ModelResult<Option<Document>> {
        (**self)
            .find_one_and_delete(collection, filter, options)
            .await
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        options: CountOptions,
    ) -> ModelResult<u64> {
        (**self)
            .count_documents(collection, filter, options)
            .await
    }

    async fn distinct(&self, collection: &str, key: &str, filter: Document) -> ModelResult<Vec<Bson>> {
        (**self).distinct(collection, key, filter).await
    }
}

#[async_trait]
impl<D> StoreDriver for Arc<D>
where
    D: StoreDriver + ?Sized,
{
    async fn insert_one(&self, collection: &str, document: Document) -> ModelResult<InsertOneOutcome> {
        (**self).insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> ModelResult<InsertManyOutcome> {
        (**self).insert_many(collection, documents).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Option<Document>> {
        (**self).find_one(collection, filter, options).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Vec<Document>> {
        (**self).find(collection, filter, options).await
    }

    async fn find_cursor(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<DocumentCursor> {
        (**self).find_cursor(collection, filter, options).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        (**self)
            .update_one(collection, filter, update, options)
            .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        (**self)
            .update_many(collection, filter, update, options)
            .await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> ModelResult<Option<Document>> {
        (**self)
            .find_one_and_update(collection, filter, update, options)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        (**self).delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        (**self).delete_many(collection, filter).await
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> ModelResult<Option<Document>> {
        (**self)
            .find_one_and_delete(collection, filter, options)
            .await
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        options: CountOptions,
    ) -> ModelResult<u64> {
        (**self)
            .count_documents(collection, filter, options)
            .await
    }

    async fn distinct(&self, collection: &str, key: &str, filter: Document) -> ModelResult<Vec<Bson>> {
        (**self).distinct(collection, key, filter).await
    }
}

/// Factory trait for creating store drivers.
#[async_trait]
pub trait StoreDriverBuilder {
    type Driver: StoreDriver;

    async fn build(self) -> ModelResult<Self::Driver>;
}
