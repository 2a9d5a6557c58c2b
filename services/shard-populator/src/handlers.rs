use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use imagery_batch_processor::enqueue_assets;
use imagery_core::{PubSubEnvelope, ShardMessage};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::state::AppState;

pub const SERVICE_NAME: &str = "shard-populator";

const NO_MESSAGE: &str = "No Pub/Sub message received";

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": Utc::now().to_rfc3339()
    }))
}

fn decode_shard(body: &[u8]) -> Option<ShardMessage> {
    let envelope: PubSubEnvelope = serde_json::from_slice(body).ok()?;
    match envelope.message.decode::<ShardMessage>() {
        Ok(shard) => Some(shard),
        Err(e) => {
            warn!(message_id = ?envelope.message.message_id, "Undecodable shard message: {}", e);
            None
        }
    }
}

/// Push endpoint: enqueue one task per asset of the announced shard.
pub async fn receive_shard(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Some(shard) = decode_shard(&body) else {
        return (StatusCode::BAD_REQUEST, NO_MESSAGE).into_response();
    };

    match enqueue_assets(
        &state.config,
        state.warehouse.as_ref(),
        state.tasks.as_ref(),
        &shard.task_queue_id,
        shard.limit,
        shard.offset,
    )
    .await
    {
        Ok(created) => {
            info!(offset = shard.offset, limit = shard.limit, tasks_created = created, "Shard enqueued");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            error!(offset = shard.offset, queue = %shard.task_queue_id, "Shard failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error populating shard.").into_response()
        }
    }
}
