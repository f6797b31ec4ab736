#![allow(dead_code)]

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use docgate::{memory::InMemoryDriver, prelude::*};

pub const HEX: &str = "65f1c0ffee0000000000abcd";

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct Calls {
    pub insert_one: AtomicUsize,
    pub insert_many: AtomicUsize,
    pub find_one: AtomicUsize,
    pub update: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Wraps the in-memory driver, counting calls. It can refuse to acknowledge inserts or
/// under-report the ids of bulk inserts.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    pub inner: InMemoryDriver,
    pub calls: Arc<Calls>,
    unacknowledged: Arc<AtomicBool>,
    drop_last_id: Arc<AtomicBool>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unacknowledged() -> Self {
        let driver = Self::default();
        driver.unacknowledged.store(true, Ordering::SeqCst);
        driver
    }

    pub fn dropping_last_id() -> Self {
        let driver = Self::default();
        driver.drop_last_id.store(true, Ordering::SeqCst);
        driver
    }

    fn acknowledged(&self) -> bool {
        !self.unacknowledged.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreDriver for RecordingDriver {
    async fn insert_one(&self, collection: &str, document: Document) -> ModelResult<InsertOneOutcome> {
        self.calls.insert_one.fetch_add(1, Ordering::SeqCst);
        let mut outcome = self.inner.insert_one(collection, document).await?;
        outcome.acknowledged = self.acknowledged();
        Ok(outcome)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> ModelResult<InsertManyOutcome> {
        self.calls.insert_many.fetch_add(1, Ordering::SeqCst);
        let mut outcome = self.inner.insert_many(collection, documents).await?;
        outcome.acknowledged = self.acknowledged();
        if self.drop_last_id.load(Ordering::SeqCst) {
            outcome.inserted_ids.pop();
        }
        Ok(outcome)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Option<Document>> {
        self.calls.find_one.fetch_add(1, Ordering::SeqCst);
        self.inner.find_one(collection, filter, options).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<Vec<Document>> {
        self.inner.find(collection, filter, options).await
    }

    async fn find_cursor(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> ModelResult<DocumentCursor> {
        self.inner.find_cursor(collection, filter, options).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.inner.update_one(collection, filter, update, options).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateOutcome> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.inner.update_many(collection, filter, update, options).await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> ModelResult<Option<Document>> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.inner
            .find_one_and_update(collection, filter, update, options)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> ModelResult<DeleteOutcome> {
        self.inner.delete_many(collection, filter).await
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        options: FindOneAndDeleteOptions,
    ) -> ModelResult<Option<Document>> {
        self.inner
            .find_one_and_delete(collection, filter, options)
            .await
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        options: CountOptions,
    ) -> ModelResult<u64> {
        self.inner.count_documents(collection, filter, options).await
    }

    async fn distinct(&self, collection: &str, key: &str, filter: Document) -> ModelResult<Vec<Bson>> {
        self.inner.distinct(collection, key, filter).await
    }
}

/// Counts `validate` calls made by the model on top of another adapter.
#[derive(Debug)]
pub struct CountingAdapter<A> {
    pub inner: A,
    pub validations: Arc<AtomicUsize>,
}

impl<A> CountingAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            validations: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<A: Adapter> Adapter for CountingAdapter<A> {
    type Output = A::Output;

    fn validate(&self, data: &Document) -> AdapterResult<Self::Output> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.inner.validate(data)
    }

    fn validate_for_insert(&self, data: &Document) -> AdapterResult<Self::Output> {
        self.inner.validate_for_insert(data)
    }

    fn parse_update_fields(&self, fields: &Document) -> Option<Document> {
        self.inner.parse_update_fields(fields)
    }

    fn id_field_type(&self) -> IdFieldType {
        self.inner.id_field_type()
    }

    fn encode(&self, output: &Self::Output) -> ModelResult<Document> {
        self.inner.encode(output)
    }

    fn decode(&self, document: Document) -> ModelResult<Self::Output> {
        self.inner.decode(document)
    }
}

/// `users`: binary identifiers, a required name, a coerced age and a defaulted role.
pub fn users() -> SchemaAdapter {
    SchemaAdapter::new(
        Schema::binary_id()
            .field("name", Field::string())
            .field("age", Field::int().coerce().optional())
            .field("role", Field::string().default("member")),
    )
}

/// `accounts`: caller supplied string identifiers.
pub fn accounts() -> SchemaAdapter {
    SchemaAdapter::new(Schema::string_id().field("owner", Field::string()))
}

pub fn oid(hex: &str) -> bson::oid::ObjectId {
    bson::oid::ObjectId::parse_str(hex).expect("valid object id")
}

pub fn by_id(id: &str) -> Document {
    doc! { "_id": id }
}
