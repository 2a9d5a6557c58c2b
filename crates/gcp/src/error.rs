//! Error types for managed-service calls.

use thiserror::Error;

/// Errors returned by the Google Cloud clients.
///
/// Only two upstream statuses get their own variant: 409 means the resource
/// already exists and 404 means it is already gone. Callers treat both as
/// benign in setup and teardown; everything else is surfaced as-is.
#[derive(Debug, Error)]
pub enum GcpError {
    /// Resource already exists (HTTP 409)
    #[error("Resource already exists: {0}")]
    Conflict(String),

    /// Resource not found (HTTP 404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("{service} API error ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// Network or TLS failure
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Could not obtain an access token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The service answered with something we could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Long-running operation did not finish in time
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl GcpError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, GcpError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GcpError::NotFound(_))
    }

    /// HTTP status that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            GcpError::Conflict(_) => Some(409),
            GcpError::NotFound(_) => Some(404),
            GcpError::Api { status, .. } => Some(*status),
            GcpError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for managed-service calls.
pub type GcpResult<T> = Result<T, GcpError>;
