//! In-memory [`StoreDriver`] implementation.
//!
//! Collections are kept as insertion-ordered vectors of BSON documents behind an
//! async-aware read-write lock. Identifiers are compared by exact BSON value, so a
//! document stored under a string `_id` and one stored under a binary `_id` with the
//! same hex digits are different documents.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::StreamExt;
use mea::rwlock::RwLock;
use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use docgate_core::{
    driver::{
        DeleteOutcome, DocumentCursor, InsertManyOutcome, InsertOneOutcome, StoreDriver,
        StoreDriverBuilder, UpdateOutcome,
    },
    error::ModelResult,
    options::{
        CountOptions, FindOneAndDeleteOptions, FindOneAndUpdateOptions, FindOptions, UpdateOptions,
    },
};

use crate::{
    error::{MemoryStoreError, MemoryStoreResult},
    evaluator::{Comparable, DocumentEvaluator, lookup, truthy},
    update::{DocumentUpdater, upsert_seed},
};

type Collection = Vec<Document>;
type StoreMap = HashMap<String, Collection>;

const ID_FIELD: &str = "_id";

/// Thread-safe in-memory document store.
///
/// `InMemoryDriver` is cloneable; clones share the same underlying data, so one
/// instance can back several clients or be inspected by tests after use.
///
/// Queries scan every document of a collection. There are no indexes beyond the
/// uniqueness check on `_id`.
///
/// # Example
///
/// ```ignore
/// use docgate_memory::InMemoryDriver;
/// use docgate_core::driver::StoreDriver;
/// use bson::doc;
///
/// let driver = InMemoryDriver::new();
/// let outcome = driver.insert_one("users", doc! { "name": "Ann" }).await?;
/// assert!(outcome.inserted_id.as_object_id().is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryDriver {
    /// collection name -> documents, in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryDriver {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryDriverBuilder {
        InMemoryDriverBuilder::default()
    }

    /// Names of the collections that have received at least one write.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names = self.store.read().await.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

/// Moves `_id` to the front of the document, generating a binary one if it is missing.
fn with_id(document: Document) -> (Document, Bson) {
    let id = document
        .get(ID_FIELD)
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    let mut stored = Document::new();
    stored.insert(ID_FIELD, id.clone());
    for (key, value) in document {
        if key != ID_FIELD {
            stored.insert(key, value);
        }
    }

    (stored, id)
}

fn ensure_unique(name: &str, documents: &[Document], id: &Bson) -> MemoryStoreResult<()> {
    if documents.iter().any(|document| document.get(ID_FIELD) == Some(id)) {
        return Err(MemoryStoreError::DuplicateKey {
            collection: name.to_string(),
            id: id.to_string(),
        });
    }

    Ok(())
}

fn descending(direction: &Bson) -> bool {
    match direction {
        Bson::Int32(n) => *n < 0,
        Bson::Int64(n) => *n < 0,
        Bson::Double(n) => *n < 0.0,
        _ => false,
    }
}

/// Orders two documents by a sort specification such as `{ "age": -1, "name": 1 }`.
fn compare(left: &Document, right: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let a = lookup(left, path)
            .first()
            .map(|value| Comparable::from(*value))
            .unwrap_or(Comparable::Null);
        let b = lookup(right, path)
            .first()
            .map(|value| Comparable::from(*value))
            .unwrap_or(Comparable::Null);

        let ordering = if descending(direction) { b.sort_cmp(&a) } else { a.sort_cmp(&b) };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Positions of the documents matching `filter`, ordered by `sort` when given.
fn positions(
    documents: &[Document],
    filter: &Document,
    sort: Option<&Document>,
) -> MemoryStoreResult<Vec<usize>> {
    let mut matched = Vec::new();
    for (position, document) in documents.iter().enumerate() {
        if DocumentEvaluator::new(document).matches(filter)? {
            matched.push(position);
        }
    }

    if let Some(sort) = sort {
        matched.sort_by(|a, b| compare(&documents[*a], &documents[*b], sort));
    }

    Ok(matched)
}

/// Applies a top-level inclusion or exclusion projection.
fn project(document: &Document, projection: Option<&Document>) -> Document {
    let Some(projection) = projection.filter(|projection| !projection.is_empty()) else {
        return document.clone();
    };

    let inclusive = projection
        .iter()
        .any(|(key, flag)| key != ID_FIELD && truthy(flag));

    if inclusive {
        let keep_id = projection.get(ID_FIELD).is_none_or(truthy);
        document
            .iter()
            .filter(|(key, _)| {
                if key.as_str() == ID_FIELD {
                    keep_id
                } else {
                    projection.get(key.as_str()).is_some_and(truthy)
                }
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    } else {
        document
            .iter()
            .filter(|(key, _)| projection.get(key.as_str()).is_none_or(truthy))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Applies `update` to the matching documents of a collection.
///
/// Every matched document is updated on a copy first, so a failure leaves the collection
/// untouched. Returns the outcome and the position of the first document written.
fn update_collection(
    name: &str,
    documents: &mut Collection,
    filter: &Document,
    update: &Document,
    upsert: bool,
    multi: bool,
    sort: Option<&Document>,
) -> MemoryStoreResult<(UpdateOutcome, Option<usize>)> {
    let updater = DocumentUpdater::new(update)?;
    let mut matched = positions(documents, filter, sort)?;
    if !multi {
        matched.truncate(1);
    }

    if matched.is_empty() {
        if !upsert {
            return Ok((
                UpdateOutcome { matched_count: 0, modified_count: 0, upserted_id: None },
                None,
            ));
        }

        let mut seed = upsert_seed(filter)?;
        updater.apply(&mut seed, true)?;
        let (inserted, id) = with_id(seed);
        ensure_unique(name, documents, &id)?;
        documents.push(inserted);

        tracing::trace!(collection = name, id = %id, "Upserted document");

        return Ok((
            UpdateOutcome { matched_count: 0, modified_count: 0, upserted_id: Some(id) },
            Some(documents.len() - 1),
        ));
    }

    let mut pending = Vec::with_capacity(matched.len());
    for position in &matched {
        let mut updated = documents[*position].clone();
        if updater.apply(&mut updated, false)? {
            pending.push((*position, updated));
        }
    }

    let modified_count = pending.len() as u64;
    for (position, updated) in pending {
        documents[position] = updated;
    }

    Ok((
        UpdateOutcome {
            matched_count: matched.len() as u64,
            modified_count,
            upserted_id: None,
        },
        matched.first().copied(),
    ))
}

fn reject_array_filters(array_filters: &Option<Vec<Document>>) -> MemoryStoreResult<()> {
    match array_filters {
        Some(_) => Err(MemoryStoreError::UnsupportedOperator("arrayFilters".into())),
        None => Ok(()),
    }
}

impl InMemoryDriver {
    async fn select(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> MemoryStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let matched = positions(documents, filter, options.sort.as_ref())?;
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit.map(i64::unsigned_abs) {
            Some(0) | None => usize::MAX,
            Some(limit) => limit as usize,
        };

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|position| project(&documents[position], options.projection.as_ref()))
            .collect())
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
        multi: bool,
    ) -> MemoryStoreResult<UpdateOutcome> {
        reject_array_filters(&options.array_filters)?;

        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();
        let (outcome, _) = update_collection(
            collection,
            documents,
            &filter,
            &update,
            options.upsert.unwrap_or(false),
            multi,
            None,
        )?;

        tracing::debug!(
            collection,
            matched = outcome.matched_count,
            modified = outcome.modified_count,
            upserted = outcome.upserted_id.is_some(),
            "Updated documents"
        );

        Ok(outcome)
    }

    async fn delete(&self, collection: &str, filter: Document, multi: bool) -> MemoryStoreResult<DeleteOutcome> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(DeleteOutcome { deleted_count: 0 });
        };

        let mut matched = positions(documents, &filter, None)?;
        if !multi {
            matched.truncate(1);
        }

        for position in matched.iter().rev() {
            documents.remove(*position);
        }

        tracing::debug!(collection, deleted = matched.len(), "Deleted documents");

        Ok(DeleteOutcome { deleted_count: matched.len() as u64 })
    }
}

#[async_trait]
impl StoreDriver for InMemoryDriver {
    async fn insert_one(&self, collection: &str, document: Document) -> ModelResult<InsertOneOutcome> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        let (document, id) = with_id(document);
        ensure_unique(collection, documents, &id)?;
        documents.push(document);

        tracing::trace!(collection, id = %id, "Inserted document");

        Ok(InsertOneOutcome { acknowledged: true, inserted_id: id })
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> ModelResult<InsertManyOutcome> {
        let mut store = self.store.write().await;
        let stored = store.entry(collection.to_string()).or_default();

        let prepared = documents.into_iter().map(with_id).collect::<Vec<_>>();
        for (index, (_, id)) in prepared.iter().enumerate() {
            ensure_unique(collection, stored, id)?;
            if prepared[..index].iter().any(|(_, earlier)| earlier == id) {
                return Err(MemoryStoreError::DuplicateKey {
                    collection: collection.to_string(),
                    id: id.to_string(),
                }
                .into());
            }
        }

        let mut inserted_ids = Vec::with_capacity(prepared.len());
        for (document, id) in prepared {
            stored.push(document);
            inserted_ids.push(id);
        }

        tracing::debug!(collection, count = inserted_ids.len(), "Inserted documents");

        Ok(InsertManyOutcome { acknowledged: true, inserted_ids })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Option<Document>> {
        let options = FindOptions { limit: Some(1), ..options };
        Ok(self.select(collection, &filter, &options).await?.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Vec<Document>> {
        let documents = self.select(collection, &filter, &options).await?;
        tracing::trace!(collection, count = documents.len(), "Found documents");

        Ok(documents)
    }

    async fn find_cursor(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<DocumentCursor> {
        let documents = self.select(collection, &filter, &options).await?;
        Ok(futures::stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        Ok(self.update(collection, filter, update, options, false).await?)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        Ok(self.update(collection, filter, update, options, true).await?)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> ModelResult<Option<Document>> {
        reject_array_filters(&options.array_filters)?;

        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();
        let (_, written) = update_collection(
            collection,
            documents,
            &filter,
            &update,
            options.upsert.unwrap_or(false),
            false,
            options.sort.as_ref(),
        )?;

        Ok(written.map(|position| project(&documents[position], options.projection.as_ref())))
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        Ok(self.delete(collection, filter, false).await?)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        Ok(self.delete(collection, filter, true).await?)
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> ModelResult<Option<Document>> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(None);
        };

        let matched = positions(documents, &filter, options.sort.as_ref())?;
        let Some(position) = matched.first().copied() else {
            return Ok(None);
        };

        let removed = documents.remove(position);
        tracing::trace!(collection, "Deleted document");

        Ok(Some(project(&removed, options.projection.as_ref())))
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        options: CountOptions,
    ) -> ModelResult<u64> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(0);
        };

        let matched = positions(documents, &filter, None)?.len() as u64;
        let remaining = matched.saturating_sub(options.skip.unwrap_or(0));

        Ok(match options.limit {
            Some(limit) if limit > 0 => remaining.min(limit),
            _ => remaining,
        })
    }

    async fn distinct(&self, collection: &str, key: &str, filter: Document) -> ModelResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut values: Vec<Bson> = Vec::new();
        for document in DocumentEvaluator::filter_documents(documents.iter(), &filter)? {
            for found in lookup(document, key) {
                let candidates = match found {
                    Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                    value => vec![value],
                };

                for candidate in candidates {
                    let seen = values
                        .iter()
                        .any(|value| Comparable::from(value) == Comparable::from(candidate));
                    if !seen {
                        values.push(candidate.clone());
                    }
                }
            }
        }

        Ok(values)
    }
}

/// Builder for [`InMemoryDriver`] instances.
///
/// ```ignore
/// use docgate_memory::InMemoryDriver;
/// use docgate_core::driver::StoreDriverBuilder;
///
/// let driver = InMemoryDriver::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryDriverBuilder;

#[async_trait]
impl StoreDriverBuilder for InMemoryDriverBuilder {
    type Driver = InMemoryDriver;

    async fn build(self) -> ModelResult<Self::Driver> {
        Ok(InMemoryDriver::new())
    }
}
