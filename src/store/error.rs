//! Global store error types

use thiserror::Error;

/// Errors raised by a global store backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite rejected a statement
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored global vars were not a JSON object
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid backend configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unlock was called without holding the lock
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
