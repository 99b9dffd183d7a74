//! Error types for the repute-store crate.

use std::io;

use thiserror::Error;

/// Top-level store error type.
///
/// Every identity and job store operation returns this error type, whatever
/// the backing technology.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No job with the given id exists.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The store cannot be reached at the moment.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store location or an identifier is invalid.
    #[error("Invalid store configuration: {0}")]
    InvalidConfiguration(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
