//! Error types and result types for model operations.
//!
//! Use [`ModelResult<T>`] as the return type for fallible operations. Validation
//! failures carry the structured issue list produced by the adapter; errors raised
//! by the store driver are passed through untouched in [`ModelError::Store`].

use std::fmt;

use bson::error::Error as BsonError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// A single problem reported by an adapter for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending field. Empty when the issue concerns the whole document.
    pub path: String,
    /// Human readable description of the problem.
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// The issues reported by a failed validation. Never empty when produced by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationIssues(Vec<ValidationIssue>);

impl ValidationIssues {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![ValidationIssue::new(path, message)])
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.0.push(issue);
    }

    /// Moves every issue of `other` into `self`, prefixing paths with `prefix`.
    pub fn extend_prefixed(&mut self, prefix: &str, other: ValidationIssues) {
        self.0.extend(other.0.into_iter().map(|issue| ValidationIssue {
            path: if issue.path.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix}.{}", issue.path)
            },
            message: issue.message,
        }));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.0.iter()
    }

    /// Returns `true` when any issue points at `path`.
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|issue| issue.path == path)
    }

    pub fn into_vec(self) -> Vec<ValidationIssue> {
        self.0
    }
}

impl From<Vec<ValidationIssue>> for ValidationIssues {
    fn from(issues: Vec<ValidationIssue>) -> Self {
        Self(issues)
    }
}

impl IntoIterator for ValidationIssues {
    type Item = ValidationIssue;
    type IntoIter = std::vec::IntoIter<ValidationIssue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, issue) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Represents all possible errors that can occur when going through a [`Model`](crate::model::Model).
#[derive(Error, Debug)]
pub enum ModelError {
    /// The adapter rejected a document.
    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationIssues),
    /// A string could not be converted into the store's binary identifier.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// The store reported a write as unacknowledged. The argument is the collection name.
    #[error("Insert into collection {0} was not acknowledged")]
    InsertNotAcknowledged(String),
    /// The store reported a different number of inserted identifiers than documents sent.
    #[error("Insert into collection {collection} reported {reported} ids for {expected} documents")]
    InsertCountMismatch {
        collection: String,
        expected: usize,
        reported: usize,
    },
    /// Conversion between documents and typed values (BSON, JSON) failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during driver initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error raised by the underlying store driver, passed through unchanged.
    #[error(transparent)]
    Store(Box<dyn std::error::Error + Send + Sync>),
}

impl ModelError {
    /// Wraps a driver error without altering it.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ModelError::Store(Box::new(err))
    }

    /// Returns the validation issues if this is a validation failure.
    pub fn issues(&self) -> Option<&ValidationIssues> {
        match self {
            ModelError::ValidationFailed(issues) => Some(issues),
            _ => None,
        }
    }
}

/// A specialized `Result` type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl From<ValidationIssues> for ModelError {
    fn from(issues: ValidationIssues) -> Self {
        ModelError::ValidationFailed(issues)
    }
}

impl From<BsonError> for ModelError {
    fn from(err: BsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for ModelError {
    fn from(err: SerdeJsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
