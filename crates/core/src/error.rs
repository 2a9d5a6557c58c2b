//! Core error types

use thiserror::Error;

/// Core error type for the imagery pipeline
#[derive(Debug, Error)]
pub enum CoreError {
    /// A warehouse row did not have the shape of an asset record
    #[error("Malformed asset row: {0}")]
    MalformedRow(String),

    /// A location value could not be interpreted
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// A pub/sub message could not be decoded
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
