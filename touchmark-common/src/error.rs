//! Common error types for touchmark

use thiserror::Error;

/// Common result type for touchmark operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the attribution engine
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conversion event rejected by the caller-declared allow-list
    #[error("Conversion event '{event}' not allowed. Allowed events: {allowed:?}")]
    EventNotAllowed { event: String, allowed: Vec<String> },

    /// Stored value could not be decoded (corrupt decimal, JSON, uuid, timestamp)
    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
