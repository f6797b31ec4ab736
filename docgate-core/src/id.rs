//! Identifier translation between the application and the store.
//!
//! Application code always sees identifiers as strings. Inside the store a collection
//! keeps its identifiers either as binary [`ObjectId`]s or as plain strings, fixed once
//! per collection by the schema's declared [`IdFieldType`]. [`IdTranslator`] funnels
//! every conversion between the two representations through one place:
//!
//! - [`to_store`] / [`to_app`] convert a single identifier value
//! - [`IdTranslator::rewrite_filter_for_store`] rewrites identifier conditions in filters
//! - [`IdTranslator::rewrite_document_for_store`] / [`IdTranslator::rewrite_document_from_store`]
//!   convert the identifier field of one document
//!
//! # Example
//!
//! ```ignore
//! use docgate::id::{IdMode, IdTranslator};
//! use bson::doc;
//!
//! let translator = IdTranslator::new(IdMode::Binary);
//! let filter = translator.rewrite_filter_for_store(doc! {
//!     "_id": { "$in": ["65f1c0ffee0000000000abcd"] },
//! })?;
//! ```

use bson::{Bson, Document, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::{
    document::ID_FIELD,
    error::{ModelError, ModelResult},
};

/// How a schema declares its identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFieldType {
    /// The identifier is a string end-to-end and must be supplied by the caller.
    String,
    /// The identifier is stored as a binary object id.
    Binary,
    /// The schema does not declare an identifier.
    None,
}

/// The identifier representation used by one collection inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdMode {
    String,
    Binary,
}

impl From<IdFieldType> for IdMode {
    /// Undeclared identifiers fall back to store generated binary ids.
    fn from(field_type: IdFieldType) -> Self {
        match field_type {
            IdFieldType::String => IdMode::String,
            IdFieldType::Binary | IdFieldType::None => IdMode::Binary,
        }
    }
}

/// Converts an application identifier into the store's binary identifier.
///
/// # Errors
///
/// Returns [`ModelError::InvalidIdentifier`] if `value` is not a 24 character hex string.
pub fn to_store(value: &str) -> ModelResult<ObjectId> {
    ObjectId::parse_str(value).map_err(|_| ModelError::InvalidIdentifier(value.to_string()))
}

/// Converts a binary identifier into its application string form.
pub fn to_app(value: &ObjectId) -> String {
    value.to_hex()
}

/// Returns `true` if `value` can be converted with [`to_store`].
pub fn is_binary_source(value: &str) -> bool {
    ObjectId::parse_str(value).is_ok()
}

/// Operators whose operand is a single identifier value.
const SCALAR_OPERATORS: [&str; 6] = ["$eq", "$ne", "$gt", "$gte", "$lt", "$lte"];

/// Operators whose operand is a list of identifier values.
const LIST_OPERATORS: [&str; 3] = ["$in", "$nin", "$all"];

/// Logical operators whose operand is a list of filters.
const LOGICAL_OPERATORS: [&str; 3] = ["$and", "$or", "$nor"];

/// Field-aware identifier rewriting for one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdTranslator {
    mode: IdMode,
}

impl IdTranslator {
    pub fn new(mode: IdMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> IdMode {
        self.mode
    }

    /// Rewrites every string identifier in `filter` into the store representation.
    ///
    /// The identifier field is recognised at the top level of the filter (and inside
    /// `$and`/`$or`/`$nor` branches), either as a bare equality value or under comparison
    /// and list operators. Each list element is converted on its own, so already binary
    /// values survive untouched. For string identifier collections this is the identity.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidIdentifier`] when a string identifier is malformed.
    pub fn rewrite_filter_for_store(&self, filter: Document) -> ModelResult<Document> {
        if self.mode == IdMode::String {
            return Ok(filter);
        }

        filter
            .into_iter()
            .map(|(key, value)| {
                let value = if key == ID_FIELD {
                    Self::rewrite_condition(value)?
                } else if LOGICAL_OPERATORS.contains(&key.as_str()) {
                    self.rewrite_branches(value)?
                } else {
                    value
                };

                Ok((key, value))
            })
            .collect()
    }

    /// Converts the identifier field of a document bound for the store.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidIdentifier`] when a string identifier is malformed.
    pub fn rewrite_document_for_store(&self, mut document: Document) -> ModelResult<Document> {
        if self.mode == IdMode::Binary {
            let id = match document.get(ID_FIELD) {
                Some(Bson::String(id)) => Some(to_store(id)?),
                _ => None,
            };
            if let Some(id) = id {
                document.insert(ID_FIELD, id);
            }
        }

        Ok(document)
    }

    /// Converts identifiers carried inside update operators (`$set`, `$setOnInsert`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidIdentifier`] when a string identifier is malformed.
    pub fn rewrite_update_for_store(&self, update: Document) -> ModelResult<Document> {
        update
            .into_iter()
            .map(|(op, operand)| match operand {
                Bson::Document(fields) => Ok((op, Bson::Document(self.rewrite_document_for_store(fields)?))),
                other => Ok((op, other)),
            })
            .collect()
    }

    /// Converts the identifier field of a document read from the store. Never fails.
    pub fn rewrite_document_from_store(&self, mut document: Document) -> Document {
        let id = match document.get(ID_FIELD) {
            Some(Bson::ObjectId(id)) => Some(to_app(id)),
            _ => None,
        };
        if let Some(id) = id {
            document.insert(ID_FIELD, id);
        }

        document
    }

    /// Converts an identifier value reported by the store (inserted or upserted id).
    pub fn id_from_store(&self, value: Bson) -> Bson {
        match value {
            Bson::ObjectId(id) => Bson::String(to_app(&id)),
            other => other,
        }
    }

    fn rewrite_branches(&self, value: Bson) -> ModelResult<Bson> {
        match value {
            Bson::Array(branches) => Ok(Bson::Array(
                branches
                    .into_iter()
                    .map(|branch| match branch {
                        Bson::Document(doc) => Ok(Bson::Document(self.rewrite_filter_for_store(doc)?)),
                        other => Ok(other),
                    })
                    .collect::<ModelResult<Vec<_>>>()?,
            )),
            other => Ok(other),
        }
    }

    fn rewrite_condition(value: Bson) -> ModelResult<Bson> {
        match value {
            Bson::String(_) => Self::rewrite_value(value),
            Bson::Document(ops) if ops.keys().all(|key| key.starts_with('$')) => Ok(Bson::Document(
                ops.into_iter()
                    .map(|(op, operand)| {
                        let operand = if SCALAR_OPERATORS.contains(&op.as_str()) {
                            Self::rewrite_value(operand)?
                        } else if LIST_OPERATORS.contains(&op.as_str()) {
                            Self::rewrite_list(operand)?
                        } else if op == "$not" {
                            Self::rewrite_condition(operand)?
                        } else {
                            operand
                        };

                        Ok((op, operand))
                    })
                    .collect::<ModelResult<Document>>()?,
            )),
            other => Ok(other),
        }
    }

    fn rewrite_list(value: Bson) -> ModelResult<Bson> {
        match value {
            Bson::Array(values) => Ok(Bson::Array(
                values
                    .into_iter()
                    .map(Self::rewrite_value)
                    .collect::<ModelResult<Vec<_>>>()?,
            )),
            other => Self::rewrite_value(other),
        }
    }

    fn rewrite_value(value: Bson) -> ModelResult<Bson> {
        match value {
            Bson::String(id) => Ok(Bson::ObjectId(to_store(&id)?)),
            other => Ok(other),
        }
    }
}
