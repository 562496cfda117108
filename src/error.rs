//! Error types for diagram population

use thiserror::Error;

use crate::store::StoreError;
use crate::validate::ValidationReport;

/// Result type for population operations
pub type Result<T> = std::result::Result<T, PopulateError>;

/// Population errors
#[derive(Error, Debug)]
pub enum PopulateError {
    #[error("Data validation failed:\n{0}")]
    Validation(ValidationReport),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid document: {0}")]
    Document(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PopulateError {
    /// Whether the failure came from the store being unreachable or rejecting credentials
    pub fn is_connectivity(&self) -> bool {
        matches!(self, PopulateError::Store(e) if e.is_connectivity())
    }
}
