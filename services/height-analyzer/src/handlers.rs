use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use imagery_core::query;
use imagery_gcp::{GenerateContentRequest, GenerationConfig, Part, Tool};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::state::{AppState, URI_LIMIT};

pub const SERVICE_NAME: &str = "height-analyzer";

pub const MEASUREMENT_FAILED: &str = "Height measurement failed.";

pub const DEFAULT_HEIGHT_PROMPT: &str = "
Follow these steps to analyze the image and calculate the height of the utility pole:
1.  Identify the utility pole in the image.
2.  Find a reference object in the image with a known or easily estimable real-world size (e.g., a car, a person, a standard door).
3.  Measure the height of the utility pole in pixels.
4.  Measure the height of the reference object in pixels.
5.  State the estimated real-world height of the reference object.
6.  Calculate the real-world height of the utility pole using the pixel ratio and the reference object's height.
7.  Provide the final calculated height of the pole in feet.
";

#[derive(Debug, Default, Deserialize)]
struct MeasureRequest {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Measurement {
    pub gcs_uri: String,
    pub height_measurement: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn measure(state: &AppState, gcs_uri: &str, prompt: &str) -> String {
    let request = GenerateContentRequest::from_parts(vec![Part::jpeg(gcs_uri), Part::text(prompt)])
        .with_generation_config(GenerationConfig {
            temperature: Some(0.0),
            ..GenerationConfig::default()
        })
        .with_tool(Tool::google_search());

    match state.model.generate(&state.model_name, &request).await {
        Ok(response) => response.text().unwrap_or_else(|| {
            error!(%gcs_uri, "Model returned no text");
            MEASUREMENT_FAILED.to_string()
        }),
        Err(e) => {
            error!(%gcs_uri, "Error measuring height: {}", e);
            MEASUREMENT_FAILED.to_string()
        }
    }
}

/// Measure pole heights on a handful of observation images.
pub async fn measure_heights(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let sql = query::observation_uris_query(
        &state.config.source_table_id(),
        &state.config.asset_class,
        URI_LIMIT,
    );
    let gcs_uris: Vec<String> = match state.warehouse.query(&sql).await {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| row.get("gcs_uri").and_then(Value::as_str))
            .filter(|uri| !uri.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            error!("Error executing BigQuery query: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "BigQuery query failed" })),
            )
                .into_response();
        }
    };

    if gcs_uris.is_empty() {
        return Json(json!({ "message": "No GCS URIs found to measure." })).into_response();
    }

    let request: MeasureRequest = serde_json::from_slice(&body).unwrap_or_default();
    let prompt = request
        .prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HEIGHT_PROMPT.to_string());

    let mut measurements = Vec::with_capacity(gcs_uris.len());
    for gcs_uri in gcs_uris {
        let height_measurement = measure(&state, &gcs_uri, &prompt).await;
        measurements.push(Measurement {
            gcs_uri,
            height_measurement,
        });
    }
    info!(measured = measurements.len(), "Height measurement complete");
    Json(measurements).into_response()
}
