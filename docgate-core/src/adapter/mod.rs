//! The adapter contract through which validation libraries plug into a [`Model`](crate::model::Model).
//!
//! An [`Adapter`] is a stateless strategy bound to exactly one schema. The model never
//! inspects which library sits behind it: it only asks the adapter to validate whole
//! documents, to validate the partial field sets carried by update operators, and to
//! report how the schema declares its identifier.
//!
//! Two adapters ship with this crate:
//!
//! - [`TypedAdapter`] - validation by deserializing into a serde type
//! - [`SchemaAdapter`] - a declarative field schema with defaults and coercion

mod schema;
mod typed;

pub use schema::{Field, FieldKind, Schema, SchemaAdapter};
pub use typed::TypedAdapter;

use bson::{Bson, Document};
use std::sync::Arc;

use crate::{error::{ModelResult, ValidationIssues}, id::IdFieldType};

/// Update operators whose operand is a field to value mapping that can be validated field by field.
pub const FIELD_MAPPING_OPERATORS: [&str; 6] =
    ["$set", "$setOnInsert", "$push", "$addToSet", "$min", "$max"];

/// Result of an adapter validation.
pub type AdapterResult<T> = Result<T, ValidationIssues>;

/// A schema validation strategy for one collection.
///
/// # Example
///
/// ```ignore
/// use docgate::adapter::{Adapter, SchemaAdapter, Schema, Field};
///
/// let adapter = SchemaAdapter::new(
///     Schema::binary_id()
///         .field("name", Field::string())
///         .field("age", Field::int().min(0)),
/// );
/// let user = adapter.validate(&bson::doc! { "name": "Ann", "age": 31 })?;
/// ```
pub trait Adapter: Send + Sync {
    /// The typed value produced by a successful validation.
    type Output: Send + Sync;

    /// Validates a whole document. Must not mutate the input.
    fn validate(&self, data: &Document) -> AdapterResult<Self::Output>;

    /// Validates a document about to be inserted.
    ///
    /// Identical to [`Adapter::validate`] except that the identifier may be absent
    /// when the schema's identifier is not a string, since the store generates it.
    fn validate_for_insert(&self, data: &Document) -> AdapterResult<Self::Output>;

    /// Validates each entry of a flat field to value mapping on its own.
    ///
    /// Fields that fail validation, or have no schema entry, keep their original value.
    /// Returns `None` when the adapter does not support partial validation.
    fn parse_update_fields(&self, _fields: &Document) -> Option<Document> {
        None
    }

    /// Reports how the schema declares its identifier field.
    fn id_field_type(&self) -> IdFieldType {
        IdFieldType::None
    }

    /// Converts a validated value back into a document.
    fn encode(&self, output: &Self::Output) -> ModelResult<Document>;

    /// Converts a raw document into the output type without validating it.
    fn decode(&self, document: Document) -> ModelResult<Self::Output>;
}

impl<A: Adapter + ?Sized> Adapter for Arc<A> {
    type Output = A::Output;

    fn validate(&self, data: &Document) -> AdapterResult<Self::Output> {
        (**self).validate(data)
    }

    fn validate_for_insert(&self, data: &Document) -> AdapterResult<Self::Output> {
        (**self).validate_for_insert(data)
    }

    fn parse_update_fields(&self, fields: &Document) -> Option<Document> {
        (**self).parse_update_fields(fields)
    }

    fn id_field_type(&self) -> IdFieldType {
        (**self).id_field_type()
    }

    fn encode(&self, output: &Self::Output) -> ModelResult<Document> {
        (**self).encode(output)
    }

    fn decode(&self, document: Document) -> ModelResult<Self::Output> {
        (**self).decode(document)
    }
}

/// Passes every field-mapping operator of `update` through [`Adapter::parse_update_fields`].
///
/// Operators without a mapping operand (`$inc`, `$unset`, `$rename`, `$bit`, ...) and
/// adapters without partial validation leave the update untouched. Never fails.
pub fn parse_update<A: Adapter + ?Sized>(adapter: &A, update: Document) -> Document {
    update
        .into_iter()
        .map(|(op, operand)| {
            let operand = match operand {
                Bson::Document(fields) if FIELD_MAPPING_OPERATORS.contains(&op.as_str()) => {
                    Bson::Document(adapter.parse_update_fields(&fields).unwrap_or(fields))
                }
                other => other,
            };

            (op, operand)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    /// Upper-cases every string field it sees.
    struct Shouting;

    impl Adapter for Shouting {
        type Output = Document;

        fn validate(&self, data: &Document) -> AdapterResult<Document> {
            Ok(data.clone())
        }

        fn validate_for_insert(&self, data: &Document) -> AdapterResult<Document> {
            Ok(data.clone())
        }

        fn parse_update_fields(&self, fields: &Document) -> Option<Document> {
            Some(
                fields
                    .iter()
                    .map(|(key, value)| match value {
                        Bson::String(s) => (key.clone(), Bson::String(s.to_uppercase())),
                        other => (key.clone(), other.clone()),
                    })
                    .collect(),
            )
        }

        fn encode(&self, output: &Document) -> ModelResult<Document> {
            Ok(output.clone())
        }

        fn decode(&self, document: Document) -> ModelResult<Document> {
            Ok(document)
        }
    }

    struct Silent;

    impl Adapter for Silent {
        type Output = Document;

        fn validate(&self, data: &Document) -> AdapterResult<Document> {
            Ok(data.clone())
        }

        fn validate_for_insert(&self, data: &Document) -> AdapterResult<Document> {
            Ok(data.clone())
        }

        fn encode(&self, output: &Document) -> ModelResult<Document> {
            Ok(output.clone())
        }

        fn decode(&self, document: Document) -> ModelResult<Document> {
            Ok(document)
        }
    }

    #[test]
    fn only_mapping_operators_are_parsed() {
        let update = parse_update(
            &Shouting,
            doc! {
                "$set": { "name": "ann" },
                "$push": { "tags": "new" },
                "$inc": { "visits": 1 },
                "$rename": { "nick": "alias" },
            },
        );

        assert_eq!(
            update,
            doc! {
                "$set": { "name": "ANN" },
                "$push": { "tags": "NEW" },
                "$inc": { "visits": 1 },
                "$rename": { "nick": "alias" },
            }
        );
    }

    #[test]
    fn adapters_without_partial_validation_pass_updates_through() {
        let update = doc! { "$set": { "name": "ann" } };
        assert_eq!(parse_update(&Silent, update.clone()), update);
        assert_eq!(Silent.id_field_type(), IdFieldType::None);
    }

    #[test]
    fn shared_adapters_delegate() {
        let shared = Arc::new(Shouting);
        let parsed = shared.parse_update_fields(&doc! { "a": "b" });
        assert_eq!(parsed, Some(doc! { "a": "B" }));
    }
}
