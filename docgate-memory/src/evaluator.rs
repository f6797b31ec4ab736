//! Filter evaluation for in-memory documents.
//!
//! This module implements the subset of the store's query vocabulary the in-memory
//! driver understands: bare equality, comparison and list operators, `$exists`, `$not`,
//! `$all`, `$size` and the logical `$and`/`$or`/`$nor`. Dotted paths descend into
//! nested documents and fan out over arrays.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use crate::error::{MemoryStoreError, MemoryStoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64`. Values of different kinds never compare
/// equal: a string never matches an object id even when it spells the same hex digits.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other BSON value, compared by identity of its raw form.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    /// Position of the value's kind in the store's cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Total order used for sorting: by kind first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

/// Collects every value reachable through a dotted `path`.
///
/// Numeric segments index into arrays; other segments fan out over array elements.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();

    if let Some(value) = document.get(segments[0]) {
        collect(value, &segments[1..], &mut found);
    }

    found
}

fn collect<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((segment, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(inner) = doc.get(*segment) {
                collect(inner, rest, found);
            }
        }
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(index) => {
                if let Some(inner) = items.get(index) {
                    collect(inner, rest, found);
                }
            }
            Err(_) => {
                for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                    collect(item, segments, found);
                }
            }
        },
        _ => {}
    }
}

/// Candidate values plus the elements of any array among them.
fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());

    for &value in values {
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
        expanded.push(value);
    }

    expanded
}

/// Evaluates store filters against documents.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the document satisfies every clause of `filter`.
    pub fn matches(&self, filter: &Document) -> MemoryStoreResult<bool> {
        for (key, condition) in filter {
            let satisfied = match key.as_str() {
                "$and" => self.branches(condition)?.iter().all(|matched| *matched),
                "$or" => self.branches(condition)?.iter().any(|matched| *matched),
                "$nor" => !self.branches(condition)?.iter().any(|matched| *matched),
                op if op.starts_with('$') => {
                    return Err(MemoryStoreError::UnsupportedOperator(op.to_string()));
                }
                path => self.matches_field(path, condition)?,
            };

            if !satisfied {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn filter_documents<I>(documents: I, filter: &Document) -> MemoryStoreResult<Vec<&'a Document>>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).matches(filter)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn branches(&self, condition: &Bson) -> MemoryStoreResult<Vec<bool>> {
        match condition {
            Bson::Array(branches) if !branches.is_empty() => branches
                .iter()
                .map(|branch| match branch {
                    Bson::Document(filter) => self.matches(filter),
                    _ => Err(MemoryStoreError::InvalidFilter(
                        "logical operator branches must be documents".into(),
                    )),
                })
                .collect(),
            _ => Err(MemoryStoreError::InvalidFilter(
                "logical operators require a non-empty array".into(),
            )),
        }
    }

    fn matches_field(&self, path: &str, condition: &Bson) -> MemoryStoreResult<bool> {
        let values = lookup(self.document, path);

        match condition {
            Bson::Document(ops) if is_operator_document(ops) => Self::matches_operators(&values, ops),
            target => Ok(Self::equals(&values, target)),
        }
    }

    fn matches_operators(values: &[&Bson], ops: &Document) -> MemoryStoreResult<bool> {
        for (op, operand) in ops {
            if !Self::matches_operator(values, op, operand)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn matches_operator(values: &[&Bson], op: &str, operand: &Bson) -> MemoryStoreResult<bool> {
        Ok(match op {
            "$eq" => Self::equals(values, operand),
            "$ne" => !Self::equals(values, operand),
            "$gt" => Self::compares(values, operand, |ordering| ordering == Ordering::Greater),
            "$gte" => Self::compares(values, operand, |ordering| ordering != Ordering::Less),
            "$lt" => Self::compares(values, operand, |ordering| ordering == Ordering::Less),
            "$lte" => Self::compares(values, operand, |ordering| ordering != Ordering::Greater),
            "$in" => list(op, operand)?
                .iter()
                .any(|candidate| Self::equals(values, candidate)),
            "$nin" => !list(op, operand)?
                .iter()
                .any(|candidate| Self::equals(values, candidate)),
            "$all" => {
                let required = list(op, operand)?;
                !required.is_empty() && required.iter().all(|candidate| Self::equals(values, candidate))
            }
            "$exists" => truthy(operand) == !values.is_empty(),
            "$size" => {
                let size = match operand {
                    Bson::Int32(n) => i64::from(*n),
                    Bson::Int64(n) => *n,
                    _ => return Err(MemoryStoreError::InvalidFilter("$size requires an integer".into())),
                };
                values.iter().any(|value| matches!(value, Bson::Array(items) if items.len() as i64 == size))
            }
            "$not" => match operand {
                Bson::Document(inner) if is_operator_document(inner) => {
                    !Self::matches_operators(values, inner)?
                }
                _ => return Err(MemoryStoreError::InvalidFilter("$not requires an operator document".into())),
            },
            other => return Err(MemoryStoreError::UnsupportedOperator(other.to_string())),
        })
    }

    /// Equality with array fan-out. A null target also matches a missing field.
    fn equals(values: &[&Bson], target: &Bson) -> bool {
        if values.is_empty() {
            return matches!(target, Bson::Null);
        }

        let target = Comparable::from(target);
        expand(values)
            .into_iter()
            .any(|value| Comparable::from(value) == target)
    }

    fn compares(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let operand = Comparable::from(operand);
        expand(values).into_iter().any(|value| {
            Comparable::from(value)
                .partial_cmp(&operand)
                .is_some_and(&accept)
        })
    }
}

fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|key| key.starts_with('$'))
}

fn list<'b>(op: &str, operand: &'b Bson) -> MemoryStoreResult<&'b Vec<Bson>> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(MemoryStoreError::InvalidFilter(format!("{op} requires an array"))),
    }
}

pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}
