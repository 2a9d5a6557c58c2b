//! Fixtures shared by the flow tests.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use imagery_core::PipelineConfig;
use imagery_gcp::mock::{MockModel, MockTaskQueue, MockWarehouse};
use imagery_gcp::HttpTask;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const PROCESSOR_URL: &str = "https://processor.run.app";
pub const POPULATOR_URL: &str = "https://populate.run.app";
pub const SERVICE_ACCOUNT: &str = "runner@demo.iam.gserviceaccount.com";

/// Enable test logging once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn config() -> PipelineConfig {
    PipelineConfig {
        project: "demo".to_string(),
        service_url: Some(PROCESSOR_URL.to_string()),
        populate_service_url: Some(POPULATOR_URL.to_string()),
        service_account_email: Some(SERVICE_ACCOUNT.to_string()),
        batch_size: 3,
        shard_size: 4,
        queue_settle_secs: 0,
        ..PipelineConfig::default()
    }
}

/// A source row as the aggregated source query returns it.
pub fn asset_row(index: usize) -> Value {
    json!({
        "asset_id": format!("pole-{:04}", index),
        "location": format!("POINT(-84.{:04} 33.7489)", index),
        "detection_time": 1714566600.0 + index as f64,
        "observations": [
            {"observation_id": format!("obs-{}-a", index), "gcs_uri": format!("gs://imgs/{}/a.jpg", index)},
            {"observation_id": format!("obs-{}-b", index), "gcs_uri": format!("gs://imgs/{}/b.jpg", index)}
        ]
    })
}

/// The fakes behind one deployment of the pipeline.
pub struct Fakes {
    pub warehouse: Arc<MockWarehouse>,
    pub tasks: Arc<MockTaskQueue>,
    pub model: Arc<MockModel>,
}

impl Fakes {
    pub fn with_assets(count: usize) -> Self {
        Fakes {
            warehouse: Arc::new(MockWarehouse::with_rows((0..count).map(asset_row).collect())),
            tasks: Arc::new(MockTaskQueue::new()),
            model: Arc::new(MockModel::with_text(
                "```json\n{\"pole_condition\": \"GOOD\", \"material\": \"WOOD\"}\n```",
            )),
        }
    }

    pub fn batch_processor(&self) -> Router {
        imagery_batch_processor::router(Arc::new(imagery_batch_processor::AppState::new(
            config(),
            self.warehouse.clone(),
            self.tasks.clone(),
            self.model.clone(),
        )))
    }

    pub fn shard_populator(&self) -> Router {
        imagery_shard_populator::router(Arc::new(imagery_shard_populator::AppState::new(
            config(),
            self.warehouse.clone(),
            self.tasks.clone(),
        )))
    }
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Vec<u8>) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub fn parse(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

/// Deliver queued tasks to the batch processor the way Cloud Tasks would.
pub async fn dispatch(app: &Router, tasks: Vec<(String, HttpTask)>) -> Vec<StatusCode> {
    let mut statuses = Vec::with_capacity(tasks.len());
    for (_, task) in tasks {
        let path = task.url.strip_prefix(PROCESSOR_URL).unwrap().to_string();
        let (status, _) = send(app, Method::POST, &path, task.body).await;
        statuses.push(status);
    }
    statuses
}

/// Wrap a published payload in a Pub/Sub push envelope.
pub fn push_envelope(payload: &[u8], message_id: usize) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "message": {
            "data": BASE64.encode(payload),
            "messageId": message_id.to_string()
        },
        "subscription": "projects/demo/subscriptions/populate-tasks-sub-run"
    }))
    .unwrap()
}
