//! Adapter validating documents by deserializing them into a serde type.

use bson::{Document, oid::ObjectId};
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, marker::PhantomData};

use crate::{
    adapter::{Adapter, AdapterResult},
    document::{ID_FIELD, from_document, has_id, to_document},
    error::{ModelResult, ValidationIssues},
    id::IdFieldType,
};

/// Uses a `Serialize + Deserialize` type as the schema.
///
/// The identifier field must be declared on `T` as a string (typically
/// `#[serde(rename = "_id")] id: String`). This adapter cannot validate partial
/// field sets, so update operators are forwarded as given.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     #[serde(rename = "_id")]
///     id: String,
///     name: String,
/// }
///
/// let users = client.model("users", TypedAdapter::<User>::binary_id());
/// ```
pub struct TypedAdapter<T> {
    id_field_type: IdFieldType,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedAdapter<T> {
    pub fn new(id_field_type: IdFieldType) -> Self {
        Self {
            id_field_type,
            _marker: PhantomData,
        }
    }

    /// The store generates binary identifiers for documents inserted without one.
    pub fn binary_id() -> Self {
        Self::new(IdFieldType::Binary)
    }

    /// Identifiers are caller supplied strings.
    pub fn string_id() -> Self {
        Self::new(IdFieldType::String)
    }
}

impl<T> Clone for TypedAdapter<T> {
    fn clone(&self) -> Self {
        Self::new(self.id_field_type)
    }
}

impl<T> fmt::Debug for TypedAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedAdapter")
            .field("type", &std::any::type_name::<T>())
            .field("id_field_type", &self.id_field_type)
            .finish()
    }
}

impl<T> Adapter for TypedAdapter<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    type Output = T;

    fn validate(&self, data: &Document) -> AdapterResult<T> {
        from_document(data.clone()).map_err(|err| {
            let message = err.to_string();
            ValidationIssues::single(missing_field(&message), message)
        })
    }

    /// When the identifier is absent (or `null`) and may be generated by the store, the
    /// document is checked with a placeholder identifier standing in for it. The
    /// placeholder is carried by the returned value and is replaced once the store
    /// assigns the real one.
    fn validate_for_insert(&self, data: &Document) -> AdapterResult<T> {
        if has_id(data) {
            return self.validate(data);
        }

        match self.id_field_type {
            IdFieldType::String => Err(ValidationIssues::single(ID_FIELD, "Required")),
            IdFieldType::Binary | IdFieldType::None => {
                let mut candidate = data.clone();
                candidate.insert(ID_FIELD, ObjectId::new().to_hex());
                self.validate(&candidate)
            }
        }
    }

    fn id_field_type(&self) -> IdFieldType {
        self.id_field_type
    }

    fn encode(&self, output: &T) -> ModelResult<Document> {
        to_document(output)
    }

    fn decode(&self, document: Document) -> ModelResult<T> {
        from_document(document)
    }
}

/// Pulls the field name out of serde's "missing field `name`" messages.
fn missing_field(message: &str) -> String {
    message
        .split_once("missing field `")
        .and_then(|(_, rest)| rest.split_once('`'))
        .map(|(field, _)| field.to_string())
        .unwrap_or_default()
}
