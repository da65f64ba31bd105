//! Error types for docent.

use thiserror::Error;

/// Result type alias using docent's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for docent operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error (missing credentials, empty model chain)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed model output that could not be recovered
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider rejected the request; retrying other models cannot help
    #[error("Non-retryable model error: {0}")]
    NonRetryable(String),

    /// Every model in the fallback chain failed
    #[error("Model chain exhausted: {0}")]
    ChainExhausted(String),

    /// Generation failed for one model (retryable within the chain)
    #[error("Model error: {0}")]
    Model(String),

    /// Document bytes missing, upload never became active, or a
    /// comparison binding could not be resolved
    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    /// Bounded poll loop exhausted
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Document store read/write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

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

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
