//! The model layer: validated, identifier-aware operations on one collection.
//!
//! A [`Model`] binds one collection to one [`Adapter`]. Every operation follows the same
//! protocol:
//!
//! 1. validate the input through the adapter when the operation requires it
//! 2. rewrite identifiers into the store representation
//! 3. delegate to the [`StoreDriver`]
//! 4. rewrite identifiers back into strings
//! 5. validate the output when the model is configured to do so
//!
//! A model holds no per-call state, so concurrent calls through one instance are
//! independent. Nothing is retried and driver errors are passed through unchanged.
//!
//! # Example
//!
//! ```ignore
//! use docgate::prelude::*;
//! use bson::doc;
//!
//! let users = client.model("users", SchemaAdapter::new(
//!     Schema::binary_id()
//!         .field("name", Field::string())
//!         .field("age", Field::int()),
//! ));
//!
//! let ann = users.insert_one(doc! { "name": "Ann", "age": 31 }).await?;
//! let id = ann.get_str("_id")?;
//!
//! users
//!     .update_one(doc! { "_id": id }, doc! { "$set": { "age": 32 } }, UpdateOptions::default())
//!     .await?;
//! ```

use bson::{Bson, Document, doc, oid::ObjectId};
use futures::{StreamExt, stream::BoxStream};
use std::fmt;

use crate::{
    adapter::{Adapter, parse_update},
    document::{ID_FIELD, has_id, strip_nulls},
    driver::{DeleteOutcome, StoreDriver, UpdateOutcome},
    error::{ModelError, ModelResult},
    id::{IdMode, IdTranslator, is_binary_source, to_store},
    options::{
        CountOptions, FindOneAndDeleteOptions, FindOneAndUpdateOptions, FindOptions, ModelOptions,
        UpdateOptions,
    },
};

/// Typed access to one collection through a validation [`Adapter`].
///
/// Application-facing filters and updates express identifiers as strings. Whether the
/// store keeps them as strings or binary ids is resolved once, from the adapter's
/// [`id_field_type`](Adapter::id_field_type), when the model is created.
///
/// # Type Parameters
///
/// * `D` - The store driver
/// * `A` - The adapter bound to this collection's schema
pub struct Model<'a, D: ?Sized, A> {
    collection: String,
    driver: &'a D,
    adapter: A,
    options: ModelOptions,
    ids: IdTranslator,
}

impl<'a, D, A> Model<'a, D, A>
where
    D: StoreDriver + ?Sized,
    A: Adapter,
{
    /// Creates a model with default options.
    pub fn new(collection: impl Into<String>, driver: &'a D, adapter: A) -> Self {
        Self::with_options(collection, driver, adapter, ModelOptions::default())
    }

    pub fn with_options(
        collection: impl Into<String>,
        driver: &'a D,
        adapter: A,
        options: ModelOptions,
    ) -> Self {
        let ids = IdTranslator::new(IdMode::from(adapter.id_field_type()));

        Self {
            collection: collection.into(),
            driver,
            adapter,
            options,
            ids,
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn id_mode(&self) -> IdMode {
        self.ids.mode()
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Validates and inserts a single document, returning the stored document.
    ///
    /// The document is validated before anything is written. When the collection uses
    /// binary identifiers and none was supplied, the store generates one; it is attached
    /// to the document, which is then validated once more to produce the result.
    ///
    /// # Errors
    ///
    /// - [`ModelError::ValidationFailed`] if the adapter rejects the document
    /// - [`ModelError::InvalidIdentifier`] if a supplied binary identifier is malformed
    /// - [`ModelError::InsertNotAcknowledged`] if the store does not acknowledge the write
    pub async fn insert_one(&self, document: Document) -> ModelResult<A::Output> {
        let id_supplied = has_id(&document);
        let validated = self.adapter.validate_for_insert(&document)?;
        let mut encoded = self.adapter.encode(&validated)?;

        tracing::debug!(
            collection = %self.collection,
            id_mode = ?self.ids.mode(),
            id_supplied,
            "insert_one"
        );

        if !id_supplied && self.ids.mode() == IdMode::Binary {
            encoded.remove(ID_FIELD);

            let outcome = self
                .driver
                .insert_one(&self.collection, encoded.clone())
                .await?;
            self.ensure_acknowledged(outcome.acknowledged)?;

            encoded.insert(ID_FIELD, self.ids.id_from_store(outcome.inserted_id));
            return Ok(self.adapter.validate(&encoded)?);
        }

        let stored = self.ids.rewrite_document_for_store(encoded.clone())?;
        let outcome = self.driver.insert_one(&self.collection, stored).await?;
        self.ensure_acknowledged(outcome.acknowledged)?;

        encoded.insert(ID_FIELD, self.ids.id_from_store(outcome.inserted_id));
        self.adapter.decode(encoded)
    }

    /// Validates every document, then inserts all of them in one bulk write.
    ///
    /// Binary identifiers are generated up front for documents lacking one so every
    /// document is validated the same way. The first failure aborts the call before
    /// the store is contacted; there is no partial success.
    ///
    /// # Errors
    ///
    /// Same as [`Model::insert_one`].
    pub async fn insert_many(&self, documents: Vec<Document>) -> ModelResult<Vec<A::Output>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = documents
            .into_iter()
            .map(|mut document| {
                if self.ids.mode() == IdMode::Binary && !has_id(&document) {
                    document.insert(ID_FIELD, ObjectId::new().to_hex());
                }

                let validated = self.adapter.validate(&document)?;
                self.adapter.encode(&validated)
            })
            .collect::<ModelResult<Vec<_>>>()?;

        let stored = prepared
            .iter()
            .cloned()
            .map(|document| self.ids.rewrite_document_for_store(document))
            .collect::<ModelResult<Vec<_>>>()?;

        tracing::debug!(
            collection = %self.collection,
            id_mode = ?self.ids.mode(),
            count = stored.len(),
            "insert_many"
        );

        let outcome = self.driver.insert_many(&self.collection, stored).await?;
        self.ensure_acknowledged(outcome.acknowledged)?;

        if outcome.inserted_ids.len() != prepared.len() {
            return Err(ModelError::InsertCountMismatch {
                collection: self.collection.clone(),
                expected: prepared.len(),
                reported: outcome.inserted_ids.len(),
            });
        }

        prepared
            .into_iter()
            .zip(outcome.inserted_ids)
            .map(|(mut document, id)| {
                document.insert(ID_FIELD, self.ids.id_from_store(id));
                self.adapter.decode(document)
            })
            .collect()
    }

    /// Finds the first document matching `filter`.
    pub async fn find_one(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Option<A::Output>> {
        let filter = self.ids.rewrite_filter_for_store(filter)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "find_one");

        self.driver
            .find_one(&self.collection, filter, options)
            .await?
            .map(|document| self.read(document))
            .transpose()
    }

    /// Finds every document matching `filter`.
    pub async fn find(&self, filter: Document, options: FindOptions) -> ModelResult<Vec<A::Output>> {
        let filter = self.ids.rewrite_filter_for_store(filter)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "find");

        self.driver
            .find(&self.collection, filter, options)
            .await?
            .into_iter()
            .map(|document| self.read(document))
            .collect()
    }

    /// Streams the documents matching `filter` lazily.
    ///
    /// The stream is forward-only and cannot be restarted. Each item goes through the
    /// same read policy as [`Model::find`].
    pub async fn find_cursor(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<BoxStream<'_, ModelResult<A::Output>>> {
        let filter = self.ids.rewrite_filter_for_store(filter)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "find_cursor");

        let cursor = self
            .driver
            .find_cursor(&self.collection, filter, options)
            .await?;

        Ok(cursor
            .map(move |document| document.and_then(|document| self.read(document)))
            .boxed())
    }

    /// Looks a document up by its application identifier.
    ///
    /// The lookup first matches `_id` against the string as given. On a miss, and only
    /// if the string is a well-formed binary identifier, a second lookup uses the binary
    /// form. This tolerates collections holding both representations at the price of up
    /// to two round-trips per call.
    pub async fn find_by_id(&self, id: &str) -> ModelResult<Option<A::Output>> {
        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), id, "find_by_id");

        if let Some(document) = self
            .driver
            .find_one(&self.collection, doc! { ID_FIELD: id }, FindOptions::default())
            .await?
        {
            return self.read(document).map(Some);
        }

        if !is_binary_source(id) {
            return Ok(None);
        }

        tracing::debug!(
            collection = %self.collection,
            id,
            "no document with string id, retrying with binary id"
        );

        self.driver
            .find_one(
                &self.collection,
                doc! { ID_FIELD: to_store(id)? },
                FindOptions::default(),
            )
            .await?
            .map(|document| self.read(document))
            .transpose()
    }

    /// Updates the first document matching `filter`.
    ///
    /// Field mappings of `$set`, `$setOnInsert`, `$push`, `$addToSet`, `$min` and `$max`
    /// go through the adapter's partial validation. Fields that fail it are forwarded
    /// unchanged rather than failing the update.
    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        let (filter, update) = self.prepare_update(filter, update)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "update_one");

        let outcome = self
            .driver
            .update_one(&self.collection, filter, update, options)
            .await?;

        Ok(self.normalize_update(outcome))
    }

    /// Updates every document matching `filter`. See [`Model::update_one`].
    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        let (filter, update) = self.prepare_update(filter, update)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "update_many");

        let outcome = self
            .driver
            .update_many(&self.collection, filter, update, options)
            .await?;

        Ok(self.normalize_update(outcome))
    }

    /// Updates the first document matching `filter` and returns it after the update.
    ///
    /// The returned document follows the read policy of [`Model::find_one`].
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> ModelResult<Option<A::Output>> {
        let (filter, update) = self.prepare_update(filter, update)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "find_one_and_update");

        self.driver
            .find_one_and_update(&self.collection, filter, update, options)
            .await?
            .map(|document| self.read(document))
            .transpose()
    }

    pub async fn delete_one(&self, filter: Document) -> ModelResult<DeleteOutcome> {
        let filter = self.ids.rewrite_filter_for_store(filter)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "delete_one");

        self.driver.delete_one(&self.collection, filter).await
    }

    pub async fn delete_many(&self, filter: Document) -> ModelResult<DeleteOutcome> {
        let filter = self.ids.rewrite_filter_for_store(filter)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "delete_many");

        self.driver.delete_many(&self.collection, filter).await
    }

    /// Deletes the first document matching `filter` and returns it.
    ///
    /// The deleted document is returned without validation, whatever the read policy.
    pub async fn find_one_and_delete(
        &self,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> ModelResult<Option<A::Output>> {
        let filter = self.ids.rewrite_filter_for_store(filter)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "find_one_and_delete");

        self.driver
            .find_one_and_delete(&self.collection, filter, options)
            .await?
            .map(|document| self.read_raw(document))
            .transpose()
    }

    pub async fn count_documents(&self, filter: Document, options: CountOptions) -> ModelResult<u64> {
        let filter = self.ids.rewrite_filter_for_store(filter)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), "count_documents");

        self.driver
            .count_documents(&self.collection, filter, options)
            .await
    }

    /// Returns the distinct values of `key` among documents matching `filter`.
    ///
    /// Distinct identifiers are reported in their string form.
    pub async fn distinct(&self, key: &str, filter: Document) -> ModelResult<Vec<Bson>> {
        let filter = self.ids.rewrite_filter_for_store(filter)?;

        tracing::debug!(collection = %self.collection, id_mode = ?self.ids.mode(), key, "distinct");

        let values = self.driver.distinct(&self.collection, key, filter).await?;

        if key != ID_FIELD {
            return Ok(values);
        }

        Ok(values
            .into_iter()
            .map(|value| self.ids.id_from_store(value))
            .collect())
    }

    fn prepare_update(&self, filter: Document, update: Document) -> ModelResult<(Document, Document)> {
        let filter = self.ids.rewrite_filter_for_store(filter)?;
        let update = self
            .ids
            .rewrite_update_for_store(parse_update(&self.adapter, update))?;

        Ok((filter, update))
    }

    fn normalize_update(&self, mut outcome: UpdateOutcome) -> UpdateOutcome {
        outcome.upserted_id = outcome.upserted_id.map(|id| self.ids.id_from_store(id));
        outcome
    }

    /// Applies the read policy to a document coming out of the store.
    fn read(&self, document: Document) -> ModelResult<A::Output> {
        if !self.options.parse_on_find {
            return self.read_raw(document);
        }

        let document = self.ids.rewrite_document_from_store(document);
        Ok(self.adapter.validate(&document)?)
    }

    fn read_raw(&self, document: Document) -> ModelResult<A::Output> {
        let document = self.ids.rewrite_document_from_store(document);
        self.adapter.decode(strip_nulls(document))
    }

    fn ensure_acknowledged(&self, acknowledged: bool) -> ModelResult<()> {
        if acknowledged {
            Ok(())
        } else {
            Err(ModelError::InsertNotAcknowledged(self.collection.clone()))
        }
    }
}

impl<D: ?Sized, A> fmt::Debug for Model<'_, D, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("collection", &self.collection)
            .field("id_mode", &self.ids.mode())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
