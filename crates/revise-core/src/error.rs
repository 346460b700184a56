//! Error types for revise-core

use thiserror::Error;

/// Result type alias using revise-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in revise-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The durable local store refused a write; the mutation was not recorded
    #[error("Local storage failure: {0}")]
    LocalStorage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a failed durable write so callers can tell it apart from read errors.
    pub fn local_storage(error: impl std::fmt::Display) -> Self {
        Self::LocalStorage(error.to_string())
    }
}
