//! A declarative field schema and the adapter built on it.
//!
//! A [`Schema`] lists the fields of a collection together with their [`Field`] rules.
//! Validation produces a new document in which values are checked, optionally coerced,
//! defaults are filled in and undeclared keys are dropped. The identifier field is kept
//! and checked according to the schema's [`IdFieldType`].
//!
//! # Example
//!
//! ```ignore
//! use docgate::adapter::{Field, Schema, SchemaAdapter};
//!
//! let users = SchemaAdapter::new(
//!     Schema::binary_id()
//!         .field("name", Field::string().min(1.0))
//!         .field("age", Field::int().min(0.0).coerce())
//!         .field("tags", Field::array(Field::string()).default(Vec::<String>::new()))
//!         .field("address", Field::document(
//!             Schema::new().field("city", Field::string().optional()),
//!         )),
//! );
//! ```

use bson::{Bson, Document, oid::ObjectId, spec::BinarySubtype};
use chrono::{DateTime, Utc};

use crate::{
    adapter::{Adapter, AdapterResult},
    document::ID_FIELD,
    error::{ModelResult, ValidationIssue, ValidationIssues},
    id::{IdFieldType, to_app},
};

/// The value kind a [`Field`] accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Int,
    Double,
    Bool,
    /// A binary object id or its hex string; validated values are hex strings.
    ObjectId,
    DateTime,
    /// A UUID string or UUID binary; validated values are hyphenated strings.
    Uuid,
    Array(Box<Field>),
    Document(Schema),
    Any,
}

impl FieldKind {
    fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Int => "int",
            FieldKind::Double => "double",
            FieldKind::Bool => "bool",
            FieldKind::ObjectId => "object id",
            FieldKind::DateTime => "date time",
            FieldKind::Uuid => "uuid",
            FieldKind::Array(_) => "array",
            FieldKind::Document(_) => "document",
            FieldKind::Any => "any",
        }
    }
}

/// Validation rules for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    kind: FieldKind,
    optional: bool,
    default: Option<Bson>,
    min: Option<f64>,
    max: Option<f64>,
    coerce: bool,
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            optional: false,
            default: None,
            min: None,
            max: None,
            coerce: false,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn int() -> Self {
        Self::new(FieldKind::Int)
    }

    pub fn double() -> Self {
        Self::new(FieldKind::Double)
    }

    pub fn bool() -> Self {
        Self::new(FieldKind::Bool)
    }

    pub fn object_id() -> Self {
        Self::new(FieldKind::ObjectId)
    }

    pub fn date_time() -> Self {
        Self::new(FieldKind::DateTime)
    }

    pub fn uuid() -> Self {
        Self::new(FieldKind::Uuid)
    }

    pub fn array(items: Field) -> Self {
        Self::new(FieldKind::Array(Box::new(items)))
    }

    pub fn document(schema: Schema) -> Self {
        Self::new(FieldKind::Document(schema))
    }

    pub fn any() -> Self {
        Self::new(FieldKind::Any)
    }

    /// The field may be absent.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Value used when the field is absent.
    pub fn default(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Lower bound: the value for numbers, the length for strings and arrays.
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Upper bound: the value for numbers, the length for strings and arrays.
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Converts compatible representations (numeric strings, `"true"`, RFC 3339 dates).
    pub fn coerce(mut self) -> Self {
        self.coerce = true;
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Validates a present value, returning the (possibly converted) value to store.
    pub fn parse(&self, value: &Bson) -> AdapterResult<Bson> {
        let parsed = match (&self.kind, value) {
            (FieldKind::Any, value) => value.clone(),
            (FieldKind::String, Bson::String(s)) => Bson::String(s.clone()),
            (FieldKind::String, Bson::Int32(n)) if self.coerce => Bson::String(n.to_string()),
            (FieldKind::String, Bson::Int64(n)) if self.coerce => Bson::String(n.to_string()),
            (FieldKind::String, Bson::Double(n)) if self.coerce => Bson::String(n.to_string()),
            (FieldKind::String, Bson::Boolean(b)) if self.coerce => Bson::String(b.to_string()),
            (FieldKind::Int, Bson::Int32(_) | Bson::Int64(_)) => value.clone(),
            (FieldKind::Int, Bson::Double(n)) if n.fract() == 0.0 && n.is_finite() => {
                // 2^63 itself is not representable as i64.
                if *n < i64::MIN as f64 || *n >= i64::MAX as f64 {
                    return Err(self.mismatch(value));
                }
                Bson::Int64(*n as i64)
            }
            (FieldKind::Int, Bson::String(s)) if self.coerce => match s.trim().parse::<i64>() {
                Ok(n) => Bson::Int64(n),
                Err(_) => return Err(self.mismatch(value)),
            },
            (FieldKind::Double, Bson::Double(_)) => value.clone(),
            (FieldKind::Double, Bson::Int32(n)) => Bson::Double(f64::from(*n)),
            (FieldKind::Double, Bson::Int64(n)) => Bson::Double(*n as f64),
            (FieldKind::Double, Bson::String(s)) if self.coerce => match s.trim().parse::<f64>() {
                Ok(n) => Bson::Double(n),
                Err(_) => return Err(self.mismatch(value)),
            },
            (FieldKind::Bool, Bson::Boolean(_)) => value.clone(),
            (FieldKind::Bool, Bson::String(s)) if self.coerce => match s.as_str() {
                "true" => Bson::Boolean(true),
                "false" => Bson::Boolean(false),
                _ => return Err(self.mismatch(value)),
            },
            (FieldKind::ObjectId, Bson::ObjectId(id)) => Bson::String(to_app(id)),
            (FieldKind::ObjectId, Bson::String(s)) => match ObjectId::parse_str(s) {
                Ok(id) => Bson::String(to_app(&id)),
                Err(_) => return Err(ValidationIssues::single("", "Invalid object id")),
            },
            (FieldKind::DateTime, Bson::DateTime(_)) => value.clone(),
            (FieldKind::DateTime, Bson::String(s)) if self.coerce => {
                match DateTime::parse_from_rfc3339(s) {
                    Ok(parsed) => Bson::DateTime(bson::DateTime::from_chrono(parsed.with_timezone(&Utc))),
                    Err(_) => return Err(ValidationIssues::single("", "Invalid date time")),
                }
            }
            (FieldKind::Uuid, Bson::String(s)) => match uuid::Uuid::parse_str(s) {
                Ok(parsed) => Bson::String(parsed.hyphenated().to_string()),
                Err(_) => return Err(ValidationIssues::single("", "Invalid uuid")),
            },
            (FieldKind::Uuid, Bson::Binary(binary)) if binary.subtype == BinarySubtype::Uuid => {
                match uuid::Uuid::from_slice(&binary.bytes) {
                    Ok(parsed) => Bson::String(parsed.hyphenated().to_string()),
                    Err(_) => return Err(ValidationIssues::single("", "Invalid uuid")),
                }
            }
            (FieldKind::Array(items), Bson::Array(values)) => {
                let mut issues = ValidationIssues::new();
                let mut parsed = Vec::with_capacity(values.len());

                for (index, item) in values.iter().enumerate() {
                    match items.parse(item) {
                        Ok(item) => parsed.push(item),
                        Err(inner) => issues.extend_prefixed(&index.to_string(), inner),
                    }
                }

                if !issues.is_empty() {
                    return Err(issues);
                }
                Bson::Array(parsed)
            }
            (FieldKind::Document(schema), Bson::Document(doc)) => Bson::Document(schema.validate(doc, true)?),
            _ => return Err(self.mismatch(value)),
        };

        self.check_bounds(&parsed)?;

        Ok(parsed)
    }

    fn check_bounds(&self, value: &Bson) -> AdapterResult<()> {
        let (measure, unit) = match value {
            Bson::Int32(n) => (f64::from(*n), None),
            Bson::Int64(n) => (*n as f64, None),
            Bson::Double(n) => (*n, None),
            Bson::String(s) => (s.chars().count() as f64, Some("characters")),
            Bson::Array(values) => (values.len() as f64, Some("items")),
            _ => return Ok(()),
        };

        let describe = |bound: f64| match unit {
            Some(unit) => format!("{bound} {unit}"),
            None => bound.to_string(),
        };

        if let Some(min) = self.min.filter(|min| measure < *min) {
            return Err(ValidationIssues::single("", format!("Must be at least {}", describe(min))));
        }
        if let Some(max) = self.max.filter(|max| measure > *max) {
            return Err(ValidationIssues::single("", format!("Must be at most {}", describe(max))));
        }

        Ok(())
    }

    fn mismatch(&self, value: &Bson) -> ValidationIssues {
        ValidationIssues::single(
            "",
            format!("Expected {}, received {:?}", self.kind.name(), value.element_type()),
        )
    }
}

/// An ordered list of named fields plus the identifier declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    id: IdFieldType,
    fields: Vec<(String, Field)>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// A schema without an identifier declaration.
    pub fn new() -> Self {
        Self {
            id: IdFieldType::None,
            fields: Vec::new(),
        }
    }

    /// A schema whose identifier is a store generated binary id.
    pub fn binary_id() -> Self {
        Self {
            id: IdFieldType::Binary,
            ..Self::new()
        }
    }

    /// A schema whose identifier is a caller supplied string.
    pub fn string_id() -> Self {
        Self {
            id: IdFieldType::String,
            ..Self::new()
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        self.fields.retain(|(existing, _)| *existing != name);
        self.fields.push((name, field));
        self
    }

    pub fn id_field_type(&self) -> IdFieldType {
        self.id
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, field)| field)
    }

    /// Resolves a dotted update path through nested document schemas.
    ///
    /// Paths crossing an array (positional or indexed paths) have no entry.
    pub fn resolve_path(&self, path: &str) -> Option<&Field> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let field = self.get(head)?;
        match (rest, &field.kind) {
            (None, _) => Some(field),
            (Some(rest), FieldKind::Document(nested)) => nested.resolve_path(rest),
            (Some(_), _) => None,
        }
    }

    /// Validates `data`, returning the cleaned document.
    ///
    /// `id_optional` allows a missing identifier for non-string identifier schemas.
    pub fn validate(&self, data: &Document, id_optional: bool) -> AdapterResult<Document> {
        let mut issues = ValidationIssues::new();
        let mut output = Document::new();

        match (self.id, present(data.get(ID_FIELD))) {
            (IdFieldType::String, Some(Bson::String(id))) => {
                output.insert(ID_FIELD, id.clone());
            }
            (IdFieldType::String, Some(other)) => issues.push(ValidationIssue::new(
                ID_FIELD,
                format!("Expected string, received {:?}", other.element_type()),
            )),
            (IdFieldType::String, None) => issues.push(ValidationIssue::new(ID_FIELD, "Required")),
            (IdFieldType::Binary, Some(value)) => match Field::object_id().parse(value) {
                Ok(id) => {
                    output.insert(ID_FIELD, id);
                }
                Err(inner) => issues.extend_prefixed(ID_FIELD, inner),
            },
            (IdFieldType::Binary, None) if !id_optional => {
                issues.push(ValidationIssue::new(ID_FIELD, "Required"))
            }
            (IdFieldType::None, Some(value)) => {
                output.insert(ID_FIELD, value.clone());
            }
            (IdFieldType::Binary | IdFieldType::None, None) => {}
        }

        for (name, field) in &self.fields {
            if name == ID_FIELD {
                continue;
            }

            match present(data.get(name)) {
                Some(value) => match field.parse(value) {
                    Ok(parsed) => {
                        output.insert(name.clone(), parsed);
                    }
                    Err(inner) => issues.extend_prefixed(name, inner),
                },
                None => match (&field.default, field.optional) {
                    (Some(default), _) => match field.parse(default) {
                        Ok(parsed) => {
                            output.insert(name.clone(), parsed);
                        }
                        Err(inner) => issues.extend_prefixed(name, inner),
                    },
                    (None, true) => {}
                    (None, false) => issues.push(ValidationIssue::new(name.clone(), "Required")),
                },
            }
        }

        if issues.is_empty() {
            Ok(output)
        } else {
            Err(issues)
        }
    }
}

/// Treats `Null` and `Undefined` as absent.
fn present(value: Option<&Bson>) -> Option<&Bson> {
    value.filter(|value| !matches!(value, Bson::Null | Bson::Undefined))
}

/// Adapter backed by a declarative [`Schema`]. Its output is the cleaned document.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaAdapter {
    schema: Schema,
}

impl SchemaAdapter {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl Adapter for SchemaAdapter {
    type Output = Document;

    fn validate(&self, data: &Document) -> AdapterResult<Document> {
        self.schema.validate(data, false)
    }

    fn validate_for_insert(&self, data: &Document) -> AdapterResult<Document> {
        self.schema
            .validate(data, self.schema.id_field_type() != IdFieldType::String)
    }

    fn parse_update_fields(&self, fields: &Document) -> Option<Document> {
        Some(
            fields
                .iter()
                .map(|(path, value)| {
                    let parsed = match self.schema.resolve_path(path) {
                        Some(field) => match field.parse(value) {
                            Ok(parsed) => parsed,
                            Err(issues) => {
                                tracing::debug!(
                                    field = %path,
                                    %issues,
                                    "update field failed validation, keeping original value"
                                );
                                value.clone()
                            }
                        },
                        None => value.clone(),
                    };

                    (path.clone(), parsed)
                })
                .collect(),
        )
    }

    fn id_field_type(&self) -> IdFieldType {
        self.schema.id_field_type()
    }

    fn encode(&self, output: &Document) -> ModelResult<Document> {
        Ok(output.clone())
    }

    fn decode(&self, document: Document) -> ModelResult<Document> {
        Ok(document)
    }
}
