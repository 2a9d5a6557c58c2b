//! Driver for `/setup` and `/populate`, used by the `populate-client` binary.
//!
//! Progress is kept in a small JSON state file (`{offset, task_queue_id}`)
//! written after every batch so an interrupted run can resume.

use imagery_core::PopulateRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_STATE_FILE: &str = "populate_state.json";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("/setup returned {status}: {body}")]
    Setup { status: u16, body: String },

    #[error("state file: {0}")]
    State(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateState {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub task_queue_id: Option<String>,
}

impl PopulateState {
    /// Saved state, or the zero state when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        std::fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }
}

/// Outcome of one `/populate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Created(u64),
    Rejected { status: u16, body: String },
}

#[derive(Clone)]
pub struct ProcessorClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProcessorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Call `/setup` and return the new queue id.
    pub async fn setup(&self) -> Result<String, ClientError> {
        let response = self.http.post(format!("{}/setup", self.base_url)).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        if status != 200 {
            return Err(ClientError::Setup { status, body });
        }
        let value: Value = serde_json::from_str(&body)?;
        value
            .get("task_queue_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ClientError::Setup { status, body })
    }

    pub async fn populate(&self, task_queue_id: &str, offset: u64) -> Result<BatchOutcome, ClientError> {
        let request = PopulateRequest {
            task_queue_id: Some(task_queue_id.to_string()),
            offset,
        };
        let response = self
            .http
            .post(format!("{}/populate", self.base_url))
            .json(&request)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        if status != 202 {
            return Ok(BatchOutcome::Rejected { status, body });
        }
        let value: Value = serde_json::from_str(&body)?;
        Ok(BatchOutcome::Created(
            value.get("tasks_created").and_then(Value::as_u64).unwrap_or(0),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateSummary {
    pub task_queue_id: String,
    pub next_offset: u64,
    pub tasks_created: u64,
}

/// Populate batches until the source is exhausted or the service refuses.
///
/// The queue is `queue_id` when given, else the saved one, else a new queue
/// from `/setup`. The saved offset is only resumed for the saved queue.
pub async fn run_populate(
    client: &ProcessorClient,
    state_path: &Path,
    batch_size: u64,
    queue_id: Option<String>,
) -> Result<PopulateSummary, ClientError> {
    let saved = PopulateState::load(state_path)?;
    let task_queue_id = match queue_id.or_else(|| saved.task_queue_id.clone()) {
        Some(id) => id,
        None => {
            info!("task_queue_id not provided, running /setup to create a queue");
            let id = client.setup().await?;
            info!(queue = %id, "Created new queue");
            id
        }
    };
    let mut offset = match saved.task_queue_id.as_deref() {
        Some(saved_id) if saved_id == task_queue_id => saved.offset,
        _ => 0,
    };

    let mut tasks_created = 0;
    loop {
        info!(offset, "Processing batch");
        match client.populate(&task_queue_id, offset).await? {
            BatchOutcome::Created(0) => {
                info!("No more tasks to create");
                break;
            }
            BatchOutcome::Created(n) => {
                info!(tasks = n, "Created tasks");
                tasks_created += n;
                offset += batch_size;
                PopulateState {
                    offset,
                    task_queue_id: Some(task_queue_id.clone()),
                }
                .save(state_path)?;
            }
            BatchOutcome::Rejected { status, body } => {
                warn!(status, "Populate stopped: {}", body);
                break;
            }
        }
    }

    Ok(PopulateSummary {
        task_queue_id,
        next_offset: offset,
        tasks_created,
    })
}
