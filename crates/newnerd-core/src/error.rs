//! Error types for the New Nerd library.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for library, search, and processing operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document not found (or not owned by the caller)
    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Chat completion failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// A backend call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Work was cancelled because a newer request superseded it
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Object storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error came from caller input rather than a backend.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}
