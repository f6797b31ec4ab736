//! Convenient re-exports of commonly used types from docgate.
//!
//! ```ignore
//! use docgate::prelude::*;
//! ```
//!
//! This provides access to the client and models, the adapter contract and the bundled
//! adapters, store driver traits, per-call options and the error types.

pub use docgate_core::{
    adapter::{Adapter, AdapterResult, Field, FieldKind, Schema, SchemaAdapter, TypedAdapter},
    client::Client,
    driver::{
        DeleteOutcome, DocumentCursor, InsertManyOutcome, InsertOneOutcome, StoreDriver,
        StoreDriverBuilder, UpdateOutcome,
    },
    error::{ModelError, ModelResult, ValidationIssue, ValidationIssues},
    id::{IdFieldType, IdMode},
    model::Model,
    options::{
        CountOptions, FindOneAndDeleteOptions, FindOneAndUpdateOptions, FindOptions, ModelOptions,
        UpdateOptions,
    },
};
