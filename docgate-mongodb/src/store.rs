use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection as MongoCollection,
    options::{self as mongo, Acknowledgment, ClientOptions, ReturnDocument, WriteConcern},
};

use docgate_core::{
    driver::{
        DeleteOutcome, DocumentCursor, InsertManyOutcome, InsertOneOutcome, StoreDriver,
        StoreDriverBuilder, UpdateOutcome,
    },
    error::{ModelError, ModelResult},
    options::{
        CountOptions, FindOneAndDeleteOptions, FindOneAndUpdateOptions, FindOptions, UpdateOptions,
    },
};

/// [`StoreDriver`] backed by a MongoDB database.
///
/// Errors raised by the official driver are passed through untouched inside
/// [`ModelError::Store`] and can be downcast to [`mongodb::error::Error`].
#[derive(Debug)]
pub struct MongoDriver {
    client: Client,
    database: String,
}

impl MongoDriver {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDriverBuilder {
        MongoDriverBuilder::new(dsn, database)
    }

    /// The underlying client, for operations outside the model layer.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

fn find_options(options: FindOptions) -> mongo::FindOptions {
    let mut converted = mongo::FindOptions::default();
    converted.sort = options.sort;
    converted.skip = options.skip;
    converted.limit = options.limit;
    converted.projection = options.projection;
    converted
}

fn find_one_options(options: FindOptions) -> mongo::FindOneOptions {
    let mut converted = mongo::FindOneOptions::default();
    converted.sort = options.sort;
    converted.skip = options.skip;
    converted.projection = options.projection;
    converted
}

fn update_options(options: UpdateOptions) -> mongo::UpdateOptions {
    let mut converted = mongo::UpdateOptions::default();
    converted.upsert = options.upsert;
    converted.array_filters = options.array_filters;
    converted
}

fn find_one_and_update_options(options: FindOneAndUpdateOptions) -> mongo::FindOneAndUpdateOptions {
    let mut converted = mongo::FindOneAndUpdateOptions::default();
    converted.return_document = Some(ReturnDocument::After);
    converted.upsert = options.upsert;
    converted.sort = options.sort;
    converted.projection = options.projection;
    converted.array_filters = options.array_filters;
    converted
}

fn find_one_and_delete_options(options: FindOneAndDeleteOptions) -> mongo::FindOneAndDeleteOptions {
    let mut converted = mongo::FindOneAndDeleteOptions::default();
    converted.sort = options.sort;
    converted.projection = options.projection;
    converted
}

fn count_options(options: CountOptions) -> mongo::CountOptions {
    let mut converted = mongo::CountOptions::default();
    converted.skip = options.skip;
    converted.limit = options.limit;
    converted
}

/// Whether writes under `concern` wait for an acknowledgement. Only `w: 0` without
/// journaling is fire-and-forget.
fn is_acknowledged(concern: Option<&WriteConcern>) -> bool {
    concern.is_none_or(|concern| {
        concern.w != Some(Acknowledgment::Nodes(0)) || concern.journal == Some(true)
    })
}

#[async_trait]
impl StoreDriver for MongoDriver {
    async fn insert_one(&self, collection: &str, document: Document) -> ModelResult<InsertOneOutcome> {
        let target = self.get_collection(collection);
        let result = target
            .insert_one(document)
            .await
            .map_err(ModelError::store)?;

        tracing::trace!(collection, id = %result.inserted_id, "Inserted document");

        Ok(InsertOneOutcome {
            acknowledged: is_acknowledged(target.write_concern()),
            inserted_id: result.inserted_id,
        })
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> ModelResult<InsertManyOutcome> {
        let count = documents.len();
        let target = self.get_collection(collection);
        let mut result = target
            .insert_many(documents)
            .await
            .map_err(ModelError::store)?;

        let inserted_ids = (0..count)
            .filter_map(|index| result.inserted_ids.remove(&index))
            .collect::<Vec<_>>();

        Ok(InsertManyOutcome {
            acknowledged: is_acknowledged(target.write_concern()),
            inserted_ids,
        })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(filter)
            .with_options(find_one_options(options))
            .await
            .map_err(ModelError::store)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Vec<Document>> {
        self.get_collection(collection)
            .find(filter)
            .with_options(find_options(options))
            .await
            .map_err(ModelError::store)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(ModelError::store)
    }

    async fn find_cursor(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<DocumentCursor> {
        let cursor = self
            .get_collection(collection)
            .find(filter)
            .with_options(find_options(options))
            .await
            .map_err(ModelError::store)?;

        Ok(cursor.map_err(ModelError::store).boxed())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        let result = self
            .get_collection(collection)
            .update_one(filter, update)
            .with_options(update_options(options))
            .await
            .map_err(ModelError::store)?;

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        let result = self
            .get_collection(collection)
            .update_many(filter, update)
            .with_options(update_options(options))
            .await
            .map_err(ModelError::store)?;

        tracing::debug!(
            collection,
            matched = result.matched_count,
            modified = result.modified_count,
            "Updated documents"
        );

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> ModelResult<Option<Document>> {
        self.get_collection(collection)
            .find_one_and_update(filter, update)
            .with_options(find_one_and_update_options(options))
            .await
            .map_err(ModelError::store)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        let result = self
            .get_collection(collection)
            .delete_one(filter)
            .await
            .map_err(ModelError::store)?;

        Ok(DeleteOutcome { deleted_count: result.deleted_count })
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        let result = self
            .get_collection(collection)
            .delete_many(filter)
            .await
            .map_err(ModelError::store)?;

        tracing::debug!(collection, deleted = result.deleted_count, "Deleted documents");

        Ok(DeleteOutcome { deleted_count: result.deleted_count })
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> ModelResult<Option<Document>> {
        self.get_collection(collection)
            .find_one_and_delete(filter)
            .with_options(find_one_and_delete_options(options))
            .await
            .map_err(ModelError::store)
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        options: CountOptions,
    ) -> ModelResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .with_options(count_options(options))
            .await
            .map_err(ModelError::store)
    }

    async fn distinct(&self, collection: &str, key: &str, filter: Document) -> ModelResult<Vec<Bson>> {
        self.get_collection(collection)
            .distinct(key, filter)
            .await
            .map_err(ModelError::store)
    }

    async fn shutdown(self) -> ModelResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Connects a [`MongoDriver`] from a connection string.
pub struct MongoDriverBuilder {
    dsn: String,
    database: String,
}

impl MongoDriverBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreDriverBuilder for MongoDriverBuilder {
    type Driver = MongoDriver;

    async fn build(self) -> ModelResult<Self::Driver> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| ModelError::Initialization(e.to_string()))?;

        Ok(MongoDriver::new(
            Client::with_options(options).map_err(|e| ModelError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
