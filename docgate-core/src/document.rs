//! Helpers for moving between typed values and BSON documents.
//!
//! Documents handled by this crate are plain [`bson::Document`] maps. Every document
//! carries its identifier under [`ID_FIELD`].

use bson::{Bson, Document, de::deserialize_from_document, ser::serialize_to_document};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ModelResult;

/// Name of the identifier field in every document.
pub const ID_FIELD: &str = "_id";

/// Serializes a value into a BSON document.
///
/// # Errors
///
/// Returns [`ModelError::Serialization`](crate::error::ModelError::Serialization) if the value does not serialize to a document.
pub fn to_document<T: Serialize>(value: &T) -> ModelResult<Document> {
    Ok(serialize_to_document(value)?)
}

/// Deserializes a BSON document into a typed value.
///
/// # Errors
///
/// Returns [`ModelError::Serialization`](crate::error::ModelError::Serialization) if the document does not match `T`.
pub fn from_document<T: DeserializeOwned>(document: Document) -> ModelResult<T> {
    Ok(deserialize_from_document(document)?)
}

/// Whether the document carries an identifier. `Null` and `Undefined` count as absent.
pub fn has_id(document: &Document) -> bool {
    document
        .get(ID_FIELD)
        .is_some_and(|id| !matches!(id, Bson::Null | Bson::Undefined))
}

/// Removes `Null` and `Undefined` fields, descending into nested documents.
///
/// Array elements are kept as-is so positional meaning is not lost.
pub fn strip_nulls(document: Document) -> Document {
    document
        .into_iter()
        .filter_map(|(key, value)| match value {
            Bson::Null | Bson::Undefined => None,
            Bson::Document(inner) => Some((key, Bson::Document(strip_nulls(inner)))),
            other => Some((key, other)),
        })
        .collect()
}
