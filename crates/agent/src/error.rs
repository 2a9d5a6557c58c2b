//! Agent errors.

use imagery_gcp::GcpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Gcp(#[from] GcpError),

    #[error("Model returned no content")]
    EmptyResponse,

    #[error("No final answer after {0} model calls")]
    StepLimit(usize),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    /// The tool refused the call, e.g. a write statement in read-only mode.
    #[error("{0}")]
    Rejected(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
