// src/utils/error.rs
use thiserror::Error;

pub use crate::fetch::models::FetchError;

/// Problems in a rule set definition. Applying a valid rule set to a page never fails.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Duplicate field '{field}' in section '{section}'")]
    DuplicateField { section: String, field: String },

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid text pattern: {0}")]
    InvalidPattern(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
