//! Error types for reef-db-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation was interrupted (killed, timed out, ...)
    #[error("Operation interrupted")]
    Interrupted,

    /// The node cannot serve reads for the target collection
    #[error("Reads unavailable: {0}")]
    ReadUnavailable(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a reads-unavailable error
    pub fn read_unavailable(msg: impl Into<String>) -> Self {
        Error::ReadUnavailable(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
