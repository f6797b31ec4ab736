mod common;

use bson::{Bson, Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, atomic::Ordering};
use tracing_test::traced_test;

use docgate::{
    memory::{InMemoryDriver, MemoryStoreError},
    prelude::*,
};

use common::{Calls, CountingAdapter, HEX, RecordingDriver, accounts, by_id, oid, users};

async fn raw(driver: &RecordingDriver, collection: &str, filter: Document) -> Option<Document> {
    driver
        .inner
        .find_one(collection, filter, FindOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn binary_identifiers_round_trip_as_strings() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());

    let ann = model.insert_one(doc! { "name": "Ann", "age": 31 }).await.unwrap();
    let id = ann.get_str("_id").unwrap().to_string();
    assert!(ObjectId::parse_str(&id).is_ok());
    assert_eq!(ann.get_str("role").unwrap(), "member");

    let stored = raw(client.driver(), "users", doc! { "_id": oid(&id) }).await.unwrap();
    assert_eq!(stored.get_object_id("_id").unwrap(), oid(&id));

    let found = model.find_one(by_id(&id), FindOptions::default()).await.unwrap().unwrap();
    assert_eq!(found.get_str("_id").unwrap(), id);
    assert_eq!(found.get_str("name").unwrap(), "Ann");
}

#[tokio::test]
async fn supplied_binary_identifier_is_stored_as_binary() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());

    let ann = model.insert_one(doc! { "_id": HEX, "name": "Ann" }).await.unwrap();
    assert_eq!(ann.get_str("_id").unwrap(), HEX);

    assert!(raw(client.driver(), "users", doc! { "_id": oid(HEX) }).await.is_some());
    assert!(raw(client.driver(), "users", doc! { "_id": HEX }).await.is_none());
}

#[tokio::test]
async fn string_identifiers_are_never_converted() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("accounts", accounts());
    assert_eq!(model.id_mode(), IdMode::String);

    model.insert_one(doc! { "_id": HEX, "owner": "Ann" }).await.unwrap();

    assert!(raw(client.driver(), "accounts", doc! { "_id": HEX }).await.is_some());
    assert!(raw(client.driver(), "accounts", doc! { "_id": oid(HEX) }).await.is_none());

    let found = model.find_one(by_id(HEX), FindOptions::default()).await.unwrap();
    assert_eq!(found.and_then(|d| d.get_str("owner").ok().map(str::to_string)), Some("Ann".into()));
}

#[tokio::test]
async fn identifier_filters_are_rewritten_in_every_form() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());

    let ids = model
        .insert_many(vec![
            doc! { "name": "Ann" },
            doc! { "name": "Bob" },
            doc! { "name": "Cid" },
        ])
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.get_str("_id").unwrap().to_string())
        .collect::<Vec<_>>();

    let bare = model.find(by_id(&ids[0]), FindOptions::default()).await.unwrap();
    let eq = model
        .find(doc! { "_id": { "$eq": ids[0].as_str() } }, FindOptions::default())
        .await
        .unwrap();
    assert_eq!(bare, eq);
    assert_eq!(bare.len(), 1);

    let listed = model
        .find(doc! { "_id": { "$in": [ids[0].as_str(), ids[2].as_str()] } }, FindOptions::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    let others = model
        .count_documents(doc! { "_id": { "$ne": ids[1].as_str() } }, CountOptions::default())
        .await
        .unwrap();
    assert_eq!(others, 2);

    let either = model
        .find(
            doc! { "$or": [{ "_id": ids[1].as_str() }, { "name": "Cid" }] },
            FindOptions::default().sort(doc! { "name": 1 }),
        )
        .await
        .unwrap();
    let names = either
        .iter()
        .map(|d| d.get_str("name").unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Bob", "Cid"]);
}

#[tokio::test]
async fn string_and_binary_filters_find_the_same_document() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());
    model.insert_one(doc! { "_id": HEX, "name": "Ann" }).await.unwrap();

    let by_string = model.find_one(by_id(HEX), FindOptions::default()).await.unwrap();
    let by_binary = model
        .find_one(doc! { "_id": oid(HEX) }, FindOptions::default())
        .await
        .unwrap();

    assert!(by_string.is_some());
    assert_eq!(by_string, by_binary);
}

#[tokio::test]
async fn malformed_identifiers_are_rejected_before_the_store() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());

    let err = model
        .find_one(by_id("not-an-id"), FindOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidIdentifier(ref id) if id == "not-an-id"));
    assert_eq!(Calls::get(&client.driver().calls.find_one), 0);
}

#[tokio::test]
async fn invalid_documents_never_reach_the_store() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());

    let err = model.insert_one(doc! { "age": "old" }).await.unwrap_err();
    let issues = err.issues().expect("validation issues");
    assert!(issues.has_path("name"));
    assert!(issues.has_path("age"));

    assert_eq!(Calls::get(&client.driver().calls.insert_one), 0);
}

#[tokio::test]
async fn invalid_defaults_fail_before_the_store() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model(
        "codes",
        SchemaAdapter::new(
            Schema::binary_id()
                .field("name", Field::string())
                .field("code", Field::string().min(3.0).default("a")),
        ),
    );

    let err = model.insert_one(doc! { "name": "Ann" }).await.unwrap_err();
    assert!(matches!(err, ModelError::ValidationFailed(ref issues) if issues.has_path("code")));

    assert_eq!(Calls::get(&client.driver().calls.insert_one), 0);
    assert_eq!(model.count_documents(doc! {}, CountOptions::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn string_identifier_inserts_require_an_identifier() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("accounts", accounts());

    let err = model.insert_one(doc! { "owner": "Ann" }).await.unwrap_err();
    assert!(matches!(err, ModelError::ValidationFailed(ref issues) if issues.has_path("_id")));
    assert_eq!(Calls::get(&client.driver().calls.insert_one), 0);

    let binary = client.model("users", users());
    assert!(binary.insert_one(doc! { "name": "Ann" }).await.is_ok());
}

#[tokio::test]
async fn insert_many_fails_fast_without_partial_writes() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());

    let err = model
        .insert_many(vec![doc! { "name": "Ann" }, doc! { "age": 3 }])
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::ValidationFailed(_)));
    assert_eq!(Calls::get(&client.driver().calls.insert_many), 0);
    assert_eq!(model.count_documents(doc! {}, CountOptions::default()).await.unwrap(), 0);

    assert!(model.insert_many(vec![]).await.unwrap().is_empty());
    assert_eq!(Calls::get(&client.driver().calls.insert_many), 0);
}

#[tokio::test]
async fn insert_many_returns_documents_in_order() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());

    let inserted = model
        .insert_many(vec![doc! { "name": "Ann" }, doc! { "_id": HEX, "name": "Bob" }])
        .await
        .unwrap();

    assert_eq!(inserted[0].get_str("name").unwrap(), "Ann");
    assert_eq!(inserted[1].get_str("_id").unwrap(), HEX);
    assert_ne!(inserted[0].get_str("_id").unwrap(), HEX);
    assert_eq!(Calls::get(&client.driver().calls.insert_many), 1);

    let generated = oid(inserted[0].get_str("_id").unwrap());
    assert!(raw(client.driver(), "users", doc! { "_id": generated }).await.is_some());
    assert!(raw(client.driver(), "users", doc! { "_id": oid(HEX) }).await.is_some());
}

#[tokio::test]
async fn update_parses_fields_and_keeps_the_ones_that_fail() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());
    let id = model
        .insert_one(doc! { "name": "Ann", "age": 31 })
        .await
        .unwrap()
        .get_str("_id")
        .unwrap()
        .to_string();

    let outcome = model
        .update_one(
            by_id(&id),
            doc! { "$set": { "age": "32", "name": 7 }, "$unset": { "role": "" } },
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!((outcome.matched_count, outcome.modified_count), (1, 1));

    let stored = raw(client.driver(), "users", doc! { "_id": oid(&id) }).await.unwrap();
    assert_eq!(stored.get("age"), Some(&Bson::Int64(32)));
    assert_eq!(stored.get("name"), Some(&Bson::Int32(7)));
    assert!(stored.get("role").is_none());
}

#[tokio::test]
async fn update_by_identifier_touches_exactly_one_document() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());
    let inserted = model
        .insert_many(vec![doc! { "name": "Ann" }, doc! { "name": "Bob" }])
        .await
        .unwrap();
    let id = inserted[1].get_str("_id").unwrap();

    let outcome = model
        .update_many(by_id(id), doc! { "$set": { "age": 40 } }, UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.matched_count, 1);

    let aged = model
        .find(doc! { "age": 40 }, FindOptions::default())
        .await
        .unwrap();
    assert_eq!(aged.len(), 1);
    assert_eq!(aged[0].get_str("_id").unwrap(), id);
}

#[tokio::test]
async fn upserted_identifiers_are_strings() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());

    let outcome = model
        .update_one(
            doc! { "name": "Dee" },
            doc! { "$set": { "age": "20" } },
            UpdateOptions::default().upsert(true),
        )
        .await
        .unwrap();

    let id = outcome.upserted_id.expect("upserted");
    let id = id.as_str().expect("string identifier");
    let found = model.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(found.get("age"), Some(&Bson::Int64(20)));
}

#[tokio::test]
async fn reads_skip_validation_unless_configured() {
    let client = Client::new(RecordingDriver::new());
    client
        .driver()
        .inner
        .insert_one("users", doc! { "_id": oid(HEX), "name": "Ann", "nickname": Bson::Null })
        .await
        .unwrap();

    let adapter = CountingAdapter::new(users());
    let validations = adapter.validations.clone();
    let lenient = client.model("users", adapter);

    let found = lenient.find_by_id(HEX).await.unwrap().unwrap();
    assert_eq!(found, doc! { "_id": HEX, "name": "Ann" });
    assert_eq!(validations.load(Ordering::SeqCst), 0);

    let adapter = CountingAdapter::new(users());
    let validations = adapter.validations.clone();
    let strict = client.model_with_options("users", adapter, ModelOptions::default().parse_on_find(true));

    let found = strict.find(doc! {}, FindOptions::default()).await.unwrap();
    assert_eq!(found, vec![doc! { "_id": HEX, "name": "Ann", "role": "member" }]);
    assert_eq!(validations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn strict_reads_fail_on_invalid_stored_documents() {
    let client = Client::new(RecordingDriver::new());
    client
        .driver()
        .inner
        .insert_one("users", doc! { "_id": oid(HEX), "age": 3 })
        .await
        .unwrap();

    let strict = client.model_with_options("users", users(), ModelOptions::default().parse_on_find(true));

    let err = strict.find_one(doc! {}, FindOptions::default()).await.unwrap_err();
    assert!(matches!(err, ModelError::ValidationFailed(ref issues) if issues.has_path("name")));

    let removed = strict
        .find_one_and_delete(by_id(HEX), FindOneAndDeleteOptions::default())
        .await
        .unwrap();
    assert_eq!(removed, Some(doc! { "_id": HEX, "age": 3 }));
}

#[tokio::test]
async fn find_by_id_falls_back_to_binary_identifiers() {
    let client = Client::new(RecordingDriver::new());
    let driver = client.driver();
    driver
        .inner
        .insert_many(
            "users",
            vec![
                doc! { "_id": oid(HEX), "name": "Ann" },
                doc! { "_id": "legacy-1", "name": "Bob" },
            ],
        )
        .await
        .unwrap();
    let model = client.model("users", users());

    let ann = model.find_by_id(HEX).await.unwrap().unwrap();
    assert_eq!(ann.get_str("_id").unwrap(), HEX);
    assert_eq!(Calls::get(&driver.calls.find_one), 2);

    let bob = model.find_by_id("legacy-1").await.unwrap().unwrap();
    assert_eq!(bob.get_str("name").unwrap(), "Bob");
    assert_eq!(Calls::get(&driver.calls.find_one), 3);

    assert!(model.find_by_id("missing").await.unwrap().is_none());
    assert_eq!(Calls::get(&driver.calls.find_one), 4);

    assert!(model.find_by_id(&ObjectId::new().to_hex()).await.unwrap().is_none());
    assert_eq!(Calls::get(&driver.calls.find_one), 6);
}

#[tokio::test]
async fn cursors_stream_translated_documents() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());
    model
        .insert_many(vec![
            doc! { "name": "Ann", "age": 31 },
            doc! { "name": "Bob", "age": 25 },
            doc! { "name": "Cid", "age": 40 },
        ])
        .await
        .unwrap();

    let cursor = model
        .find_cursor(
            doc! { "age": { "$gt": 30 } },
            FindOptions::default().sort(doc! { "age": -1 }),
        )
        .await
        .unwrap();
    let documents = cursor.try_collect::<Vec<_>>().await.unwrap();

    let names = documents
        .iter()
        .map(|d| d.get_str("name").unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Cid", "Ann"]);
    assert!(documents.iter().all(|d| matches!(d.get("_id"), Some(Bson::String(_)))));
}

#[tokio::test]
async fn distinct_identifiers_come_back_as_strings() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());
    let inserted = model
        .insert_many(vec![
            doc! { "name": "Ann", "role": "admin" },
            doc! { "name": "Bob" },
            doc! { "name": "Cid" },
        ])
        .await
        .unwrap();

    let ids = model.distinct("_id", doc! {}).await.unwrap();
    let expected = inserted
        .iter()
        .map(|d| Bson::String(d.get_str("_id").unwrap().to_string()))
        .collect::<Vec<_>>();
    assert_eq!(ids, expected);

    let roles = model.distinct("role", doc! {}).await.unwrap();
    assert_eq!(roles, vec![Bson::from("admin"), Bson::from("member")]);
}

#[tokio::test]
async fn find_one_and_update_returns_the_updated_document() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());
    let id = model
        .insert_one(doc! { "name": "Ann", "age": 31 })
        .await
        .unwrap()
        .get_str("_id")
        .unwrap()
        .to_string();

    let updated = model
        .find_one_and_update(
            by_id(&id),
            doc! { "$set": { "age": "33" } },
            FindOneAndUpdateOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.get_str("_id").unwrap(), id);
    assert_eq!(updated.get("age"), Some(&Bson::Int64(33)));

    let missing = model
        .find_one_and_update(
            by_id(&ObjectId::new().to_hex()),
            doc! { "$set": { "age": 1 } },
            FindOneAndUpdateOptions::default(),
        )
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn deletes_translate_identifiers() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());
    let ids = model
        .insert_many(vec![
            doc! { "name": "Ann" },
            doc! { "name": "Bob" },
            doc! { "name": "Cid" },
        ])
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.get_str("_id").unwrap().to_string())
        .collect::<Vec<_>>();

    let outcome = model.delete_one(by_id(&ids[0])).await.unwrap();
    assert_eq!(outcome.deleted_count, 1);

    let outcome = model
        .delete_many(doc! { "_id": { "$in": [ids[1].as_str(), ids[2].as_str()] } })
        .await
        .unwrap();
    assert_eq!(outcome.deleted_count, 2);

    let removed = model
        .find_one_and_delete(by_id(&ids[0]), FindOneAndDeleteOptions::default())
        .await
        .unwrap();
    assert!(removed.is_none());
}

#[tokio::test]
async fn unacknowledged_inserts_are_errors() {
    let client = Client::new(RecordingDriver::unacknowledged());
    let model = client.model("users", users());

    let err = model.insert_one(doc! { "name": "Ann" }).await.unwrap_err();
    assert!(matches!(err, ModelError::InsertNotAcknowledged(ref collection) if collection == "users"));

    let err = model.insert_many(vec![doc! { "name": "Ann" }]).await.unwrap_err();
    assert!(matches!(err, ModelError::InsertNotAcknowledged(_)));
}

#[tokio::test]
async fn bulk_inserts_must_report_every_identifier() {
    let client = Client::new(RecordingDriver::dropping_last_id());
    let model = client.model("users", users());

    let err = model
        .insert_many(vec![doc! { "name": "Ann" }, doc! { "name": "Bob" }])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ModelError::InsertCountMismatch { expected: 2, reported: 1, ref collection } if collection == "users"
    ));
}

#[tokio::test]
async fn store_errors_pass_through_unchanged() {
    let client = Client::new(RecordingDriver::new());
    let model = client.model("users", users());
    model.insert_one(doc! { "_id": HEX, "name": "Ann" }).await.unwrap();

    let err = model
        .insert_one(doc! { "_id": HEX, "name": "Bob" })
        .await
        .unwrap_err();

    match err {
        ModelError::Store(inner) => assert!(matches!(
            inner.downcast_ref::<MemoryStoreError>(),
            Some(MemoryStoreError::DuplicateKey { .. })
        )),
        other => panic!("expected a store error, got {other:?}"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    age: Option<i32>,
}

#[tokio::test]
async fn typed_models_read_and_write_serde_types() {
    let client = Client::new(InMemoryDriver::new());
    let model = client.model("users", TypedAdapter::<User>::binary_id());

    let ann = model.insert_one(doc! { "name": "Ann", "age": 31 }).await.unwrap();
    assert!(ObjectId::parse_str(&ann.id).is_ok());
    assert_eq!(ann.age, Some(31));

    let found = model.find_by_id(&ann.id).await.unwrap();
    assert_eq!(found, Some(ann.clone()));

    let err = model.insert_one(doc! { "age": 5 }).await.unwrap_err();
    assert!(matches!(err, ModelError::ValidationFailed(ref issues) if issues.has_path("name")));

    let stored = client
        .driver()
        .find_one("users", doc! { "_id": oid(&ann.id) }, FindOptions::default())
        .await
        .unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn null_identifiers_are_generated_for_every_adapter() {
    let client = Client::new(InMemoryDriver::new());
    let typed = client.model("people", TypedAdapter::<User>::binary_id());
    let schema = client.model("users", users());

    let ann = typed
        .insert_one(doc! { "_id": Bson::Null, "name": "Ann" })
        .await
        .unwrap();
    assert!(ObjectId::parse_str(&ann.id).is_ok());
    assert_eq!(typed.find_by_id(&ann.id).await.unwrap(), Some(ann));

    let bob = schema
        .insert_one(doc! { "_id": Bson::Null, "name": "Bob" })
        .await
        .unwrap();
    assert!(ObjectId::parse_str(bob.get_str("_id").unwrap()).is_ok());
}

#[traced_test]
#[tokio::test]
async fn every_operation_logs_collection_and_id_mode() {
    let client = Client::new(InMemoryDriver::new());
    let model = client.model("accounts", accounts());
    model.insert_one(doc! { "_id": "acct-1", "owner": "Ann" }).await.unwrap();

    model.find_by_id("acct-1").await.unwrap();
    model.count_documents(doc! {}, CountOptions::default()).await.unwrap();
    model.distinct("owner", doc! {}).await.unwrap();

    assert!(logs_contain("find_by_id"));
    assert!(logs_contain("count_documents"));
    assert!(logs_contain("distinct"));
    assert!(logs_contain("collection=accounts"));
    assert!(logs_contain("id_mode=String"));
}

#[tokio::test]
async fn clients_accept_shared_dynamic_drivers() {
    let driver: Arc<dyn StoreDriver> = Arc::new(InMemoryDriver::new());
    let client = Client::new(driver);

    let model = client.model("users", users());
    model.insert_one(doc! { "name": "Ann" }).await.unwrap();
    assert_eq!(model.count_documents(doc! {}, CountOptions::default()).await.unwrap(), 1);
    assert_eq!(model.collection_name(), "users");

    client.shutdown().await.unwrap();
}
