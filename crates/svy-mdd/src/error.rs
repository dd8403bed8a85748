//! Schema document error types.

use std::path::PathBuf;

use svy_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MddError {
    /// The document is not well-formed XML.
    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// A required section is absent.
    #[error("missing element `{element}` in `{parent}`")]
    MissingElement {
        element: &'static str,
        parent: String,
    },

    #[error("missing attribute `{attribute}` on `{element}`")]
    MissingAttribute {
        attribute: &'static str,
        element: String,
    },

    #[error("invalid value `{value}` for attribute `{attribute}` on `{element}`")]
    InvalidAttribute {
        attribute: &'static str,
        element: String,
        value: String,
    },

    #[error("failed to {operation} schema document: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The temporary file could not replace the target.
    #[error("failed to replace {target_path} with {temp_path}")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl MddError {
    pub(crate) fn xml(position: u64, error: impl std::fmt::Display) -> Self {
        MddError::Xml {
            position,
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MddError>;
