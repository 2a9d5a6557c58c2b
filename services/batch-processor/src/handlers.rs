use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use imagery_core::{PopulateRequest, ProcessRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::ApiError;
use crate::pipeline;
use crate::state::AppState;

pub const SERVICE_NAME: &str = "batch-processor";

const MISSING_QUEUE_ID: &str = "task_queue_id not provided.";

const INVALID_POPULATE_BODY: &str = "Invalid request body:";

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// Create the results table and a fresh task queue.
pub async fn setup(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let config = &state.config;
    let mut messages: Vec<String> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    let task_queue_id = format!("{}{}", config.task_queue_prefix, Uuid::new_v4());

    match state
        .warehouse
        .create_table(&config.results, &config.profile.schema())
        .await
    {
        Ok(()) => messages.push("BigQuery table created.".to_string()),
        Err(e) if e.is_conflict() => messages.push("BigQuery table already exists.".to_string()),
        Err(e) => {
            error!("Error creating BigQuery table: {}", e);
            errors.push(format!("Error creating BigQuery table: {}", e));
        }
    }

    match state.tasks.create_queue(&task_queue_id).await {
        Ok(()) => {
            messages.push(format!("Cloud Tasks queue '{}' created.", task_queue_id));
            tokio::time::sleep(state.queue_settle()).await;
        }
        Err(e) if e.is_conflict() => {
            messages.push(format!("Cloud Tasks queue '{}' already exists.", task_queue_id))
        }
        Err(e) => {
            error!("Error creating Cloud Tasks queue: {}", e);
            errors.push(format!("Error creating Cloud Tasks queue: {}", e));
        }
    }

    if errors.is_empty() {
        info!(queue = %task_queue_id, "Setup complete");
        (
            StatusCode::OK,
            Json(json!({ "messages": messages, "task_queue_id": task_queue_id })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "errors": errors, "messages": messages })),
        )
    }
}

/// Enqueue one batch of assets starting at `offset`.
pub async fn populate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest(MISSING_QUEUE_ID.to_string()));
    }
    let request: PopulateRequest = serde_json::from_slice(&body).map_err(|e| {
        ApiError::BadRequest(format!("{} {}", INVALID_POPULATE_BODY, e))
    })?;
    let (queue_id, offset) = match request {
        PopulateRequest {
            task_queue_id: Some(id),
            offset,
        } if !id.trim().is_empty() => (id, offset),
        _ => return Err(ApiError::BadRequest(MISSING_QUEUE_ID.to_string())),
    };

    let tasks_created = pipeline::enqueue_assets(
        &state.config,
        state.warehouse.as_ref(),
        state.tasks.as_ref(),
        &queue_id,
        state.config.batch_size,
        offset,
    )
    .await
    .map_err(|e| {
        error!(queue = %queue_id, offset, "Populate failed: {}", e);
        e
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": format!("Successfully created {} tasks.", tasks_created),
            "tasks_created": tasks_created,
        })),
    ))
}

/// Task callback: analyse one asset.
pub async fn process(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: ProcessRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Error: Received empty or invalid request body: {}", e);
            return (StatusCode::BAD_REQUEST, "Error: Empty request body.").into_response();
        }
    };

    match pipeline::process_asset(
        &state.config,
        state.warehouse.as_ref(),
        state.model.as_ref(),
        &request,
    )
    .await
    {
        Ok(()) => (StatusCode::OK, "Processing complete.").into_response(),
        Err(e) => {
            error!(asset_id = %request.asset_id, "Error processing asset: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error processing image.").into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TeardownRequest {
    #[serde(default)]
    task_queue_id: Option<String>,
}

/// Delete the results table and the given queue.
pub async fn teardown(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: TeardownRequest = serde_json::from_slice(&body).unwrap_or_default();
    let queue_id = request
        .task_queue_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest(MISSING_QUEUE_ID.to_string()))?;

    let result = async {
        state.warehouse.delete_table(&state.config.results).await?;
        state.tasks.delete_queue(&queue_id).await
    }
    .await;

    match result {
        Ok(()) => {
            info!(queue = %queue_id, "Teardown complete");
            Ok(Json(json!({ "message": "Teardown complete." })))
        }
        Err(e) if e.is_not_found() => Ok(Json(json!({ "message": "Resources not found." }))),
        Err(e) => {
            error!(queue = %queue_id, "Teardown failed: {}", e);
            Err(ApiError::Upstream(e))
        }
    }
}
