//! Case-data store error types.

use std::path::PathBuf;

use svy_mdd::MddError;
use svy_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("failed to {operation}: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store file does not exist.
    #[error("case-data store not found: {path}")]
    MissingStore { path: PathBuf },

    /// The schema document names no case-data location and none was given.
    #[error("schema {path} declares no case-data location")]
    MissingLocation { path: PathBuf },

    #[error(transparent)]
    Schema(#[from] MddError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String },

    /// The request is valid but cannot be carried out for this variable.
    #[error("cannot {operation}: {reason}")]
    UnsupportedOperation {
        operation: &'static str,
        reason: String,
    },

    /// Merge inputs differ in structure.
    #[error("stores differ at table `{table}`{}: {detail}", column.as_deref().map(|c| format!(", column `{c}`")).unwrap_or_default())]
    SchemaMismatch {
        table: String,
        column: Option<String>,
        detail: String,
    },

    /// The store has no table for a group the schema declares.
    #[error("no level table for `{group}`")]
    MissingLevel { group: String },

    #[error("invalid connection setting `{field}`: {value}")]
    InvalidConnection { field: &'static str, value: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("data frame error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),
}

impl StoreError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn mismatch(table: &str, column: Option<&str>, detail: impl Into<String>) -> Self {
        StoreError::SchemaMismatch {
            table: table.to_string(),
            column: column.map(str::to_string),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
