//! Update operator application for in-memory documents.
//!
//! Supported operators: `$set`, `$setOnInsert`, `$unset`, `$inc`, `$mul`, `$min`, `$max`,
//! `$push`, `$addToSet` (both with `$each`), `$pull` and `$rename`. Replacement documents
//! are rejected.

use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::{
    error::{MemoryStoreError, MemoryStoreResult},
    evaluator::{Comparable, DocumentEvaluator, lookup},
};

const ID_FIELD: &str = "_id";

/// Applies update documents to stored documents.
pub(crate) struct DocumentUpdater<'a> {
    update: &'a Document,
}

impl<'a> DocumentUpdater<'a> {
    /// Checks the update is made of operators only.
    pub fn new(update: &'a Document) -> MemoryStoreResult<Self> {
        if update.is_empty() {
            return Err(MemoryStoreError::InvalidUpdate("update document is empty".into()));
        }
        if let Some(key) = update.keys().find(|key| !key.starts_with('$')) {
            return Err(MemoryStoreError::InvalidUpdate(format!(
                "update documents may only contain operators, found '{key}'"
            )));
        }

        Ok(Self { update })
    }

    /// Applies the update in place. Returns `true` if the document changed.
    ///
    /// `inserting` is set when the document is being created by an upsert; only then
    /// does `$setOnInsert` apply and may `_id` be assigned.
    pub fn apply(&self, document: &mut Document, inserting: bool) -> MemoryStoreResult<bool> {
        let before = document.clone();

        for (op, operand) in self.update {
            let fields = match operand {
                Bson::Document(fields) => fields,
                _ => {
                    return Err(MemoryStoreError::InvalidUpdate(format!(
                        "operand of {op} must be a document"
                    )));
                }
            };

            for (path, value) in fields {
                if path == ID_FIELD && !inserting && op != "$setOnInsert" {
                    let unchanged = op == "$set" && before.get(ID_FIELD) == Some(value);
                    if !unchanged {
                        return Err(MemoryStoreError::ImmutableId);
                    }
                }

                match op.as_str() {
                    "$set" => set_path(document, path, value.clone())?,
                    "$setOnInsert" => {
                        if inserting {
                            set_path(document, path, value.clone())?;
                        }
                    }
                    "$unset" => remove_path(document, path),
                    "$inc" => {
                        let current = current(document, path);
                        set_path(document, path, arithmetic(op, current, value, Number::add)?)?;
                    }
                    "$mul" => {
                        let current = current(document, path).or(Some(Bson::Int32(0)));
                        set_path(document, path, arithmetic(op, current, value, Number::mul)?)?;
                    }
                    "$min" | "$max" => {
                        let wanted = if op == "$min" { Ordering::Less } else { Ordering::Greater };
                        let replace = match current(document, path) {
                            None => true,
                            Some(existing) => {
                                Comparable::from(value).sort_cmp(&Comparable::from(&existing)) == wanted
                            }
                        };
                        if replace {
                            set_path(document, path, value.clone())?;
                        }
                    }
                    "$push" | "$addToSet" => {
                        let mut items = current_array(op, document, path)?;
                        for item in each(value) {
                            let present = items
                                .iter()
                                .any(|existing| Comparable::from(existing) == Comparable::from(&item));
                            if op == "$push" || !present {
                                items.push(item);
                            }
                        }
                        set_path(document, path, Bson::Array(items))?;
                    }
                    "$pull" => {
                        if current(document, path).is_some() {
                            let items = current_array(op, document, path)?
                                .into_iter()
                                .filter(|item| !pulls(item, value))
                                .collect::<Vec<_>>();
                            set_path(document, path, Bson::Array(items))?;
                        }
                    }
                    "$rename" => {
                        let target = value.as_str().ok_or_else(|| {
                            MemoryStoreError::InvalidUpdate("$rename target must be a string".into())
                        })?;
                        if let Some(moved) = current(document, path) {
                            remove_path(document, path);
                            set_path(document, target, moved)?;
                        }
                    }
                    other => return Err(MemoryStoreError::UnsupportedOperator(other.to_string())),
                }
            }
        }

        Ok(*document != before)
    }
}

/// Builds the seed of an upserted document from the equality clauses of a filter.
pub(crate) fn upsert_seed(filter: &Document) -> MemoryStoreResult<Document> {
    let mut seed = Document::new();

    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }

        match condition {
            Bson::Document(ops) if ops.keys().all(|op| op.starts_with('$')) => {
                if let Some(value) = ops.get("$eq") {
                    set_path(&mut seed, key, value.clone())?;
                }
            }
            value => set_path(&mut seed, key, value.clone())?,
        }
    }

    Ok(seed)
}

fn current(document: &Document, path: &str) -> Option<Bson> {
    if path.contains('.') {
        lookup(document, path).first().map(|value| (*value).clone())
    } else {
        document.get(path).cloned()
    }
}

fn current_array(op: &str, document: &Document, path: &str) -> MemoryStoreResult<Vec<Bson>> {
    match current(document, path) {
        None => Ok(Vec::new()),
        Some(Bson::Array(items)) => Ok(items),
        Some(_) => Err(MemoryStoreError::InvalidUpdate(format!(
            "{op} requires '{path}' to be an array"
        ))),
    }
}

/// Values to append: the elements of `{ $each: [...] }` or the value itself.
fn each(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Document(modifiers) => match modifiers.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            _ => vec![value.clone()],
        },
        _ => vec![value.clone()],
    }
}

fn pulls(item: &Bson, condition: &Bson) -> bool {
    match (item, condition) {
        (Bson::Document(item), Bson::Document(filter)) => DocumentEvaluator::new(item)
            .matches(filter)
            .unwrap_or(false),
        _ => Comparable::from(item) == Comparable::from(condition),
    }
}

/// Writes `value` at a dotted path, creating intermediate documents as needed.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> MemoryStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(inner) => set_in_value(inner, rest, value),
                None => Err(MemoryStoreError::InvalidUpdate(format!("cannot create '{head}'"))),
            }
        }
    }
}

fn set_in_value(target: &mut Bson, path: &str, value: Bson) -> MemoryStoreResult<()> {
    match target {
        Bson::Document(inner) => set_path(inner, path, value),
        Bson::Array(items) => {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            let index = head.parse::<usize>().map_err(|_| {
                MemoryStoreError::InvalidUpdate(format!("cannot index array with '{head}'"))
            })?;
            if index >= items.len() {
                items.resize(index + 1, Bson::Null);
            }

            match rest {
                None => {
                    items[index] = value;
                    Ok(())
                }
                Some(rest) => {
                    if matches!(items[index], Bson::Null) {
                        items[index] = Bson::Document(Document::new());
                    }
                    set_in_value(&mut items[index], rest, value)
                }
            }
        }
        _ => Err(MemoryStoreError::InvalidUpdate(format!(
            "cannot create field '{path}' in a non-document value"
        ))),
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Numeric operand, widened the way the store widens mixed arithmetic.
#[derive(Clone, Copy)]
enum Number {
    Int32(i32),
    Int64(i64),
    Double(f64),
}

impl Number {
    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int32(n) => Some(Number::Int32(*n)),
            Bson::Int64(n) => Some(Number::Int64(*n)),
            Bson::Double(n) => Some(Number::Double(*n)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int32(n) => f64::from(n),
            Number::Int64(n) => n as f64,
            Number::Double(n) => n,
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            Number::Int32(n) => i64::from(n),
            Number::Int64(n) => n,
            Number::Double(n) => n as i64,
        }
    }

    fn add(self, other: Self) -> Bson {
        match (self, other) {
            (Number::Double(_), _) | (_, Number::Double(_)) => Bson::Double(self.as_f64() + other.as_f64()),
            (Number::Int32(a), Number::Int32(b)) => match a.checked_add(b) {
                Some(sum) => Bson::Int32(sum),
                None => Bson::Int64(i64::from(a) + i64::from(b)),
            },
            _ => Bson::Int64(self.as_i64().wrapping_add(other.as_i64())),
        }
    }

    fn mul(self, other: Self) -> Bson {
        match (self, other) {
            (Number::Double(_), _) | (_, Number::Double(_)) => Bson::Double(self.as_f64() * other.as_f64()),
            (Number::Int32(a), Number::Int32(b)) => match a.checked_mul(b) {
                Some(product) => Bson::Int32(product),
                None => Bson::Int64(i64::from(a) * i64::from(b)),
            },
            _ => Bson::Int64(self.as_i64().wrapping_mul(other.as_i64())),
        }
    }
}

fn arithmetic(
    op: &str,
    current: Option<Bson>,
    operand: &Bson,
    combine: fn(Number, Number) -> Bson,
) -> MemoryStoreResult<Bson> {
    let operand_number = Number::from_bson(operand)
        .ok_or_else(|| MemoryStoreError::InvalidUpdate(format!("{op} requires a numeric operand")))?;

    match current {
        None => Ok(operand.clone()),
        Some(existing) => match Number::from_bson(&existing) {
            Some(existing) => Ok(combine(existing, operand_number)),
            None => Err(MemoryStoreError::InvalidUpdate(format!(
                "{op} cannot be applied to a non-numeric field"
            ))),
        },
    }
}
