use super::*;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
};
use imagery_core::{PipelineConfig, TableRef};
use imagery_gcp::mock::{MockModel, MockTaskQueue, MockWarehouse};
use imagery_gcp::TaskQueue;
use serde_json::{json, Value};
use tower::ServiceExt;

struct Harness {
    warehouse: Arc<MockWarehouse>,
    tasks: Arc<MockTaskQueue>,
    model: Arc<MockModel>,
    app: Router,
}

fn config() -> PipelineConfig {
    PipelineConfig {
        project: "demo".to_string(),
        service_url: Some("https://processor.run.app".to_string()),
        service_account_email: Some("runner@demo.iam.gserviceaccount.com".to_string()),
        batch_size: 2,
        queue_settle_secs: 0,
        ..PipelineConfig::default()
    }
}

fn harness_with(warehouse: MockWarehouse) -> Harness {
    let warehouse = Arc::new(warehouse);
    let tasks = Arc::new(MockTaskQueue::new());
    let model = Arc::new(MockModel::with_text("{\"pole_condition\": \"OK\"}"));
    let state = Arc::new(AppState::new(
        config(),
        warehouse.clone(),
        tasks.clone(),
        model.clone(),
    ));
    Harness {
        warehouse,
        tasks,
        model,
        app: router(state),
    }
}

fn harness() -> Harness {
    harness_with(MockWarehouse::new())
}

async fn send(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn parse(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

fn asset_row(id: &str) -> Value {
    json!({
        "asset_id": id,
        "location": "POINT(-122.1 37.4)",
        "detection_time": 1714566600.0,
        "observations": [{"observation_id": "o1", "gcs_uri": format!("gs://imgs/{}.jpg", id)}]
    })
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = send(&h.app, Method::GET, "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    let body = parse(&body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "batch-processor");
}

#[tokio::test]
async fn test_setup_creates_table_and_queue() {
    let h = harness();
    let (status, body) = send(&h.app, Method::POST, "/setup", "").await;
    assert_eq!(status, StatusCode::OK);

    let body = parse(&body);
    let queue_id = body["task_queue_id"].as_str().unwrap();
    assert!(queue_id.starts_with("image-analysis-queue-"));
    assert_eq!(queue_id.len(), "image-analysis-queue-".len() + 36);
    assert_eq!(body["messages"][0], "BigQuery table created.");
    assert_eq!(h.tasks.queues(), vec![queue_id.to_string()]);
    assert!(h.warehouse.has_table(&TableRef::new(
        "imagery_insights_analysis",
        "utility_pole_evaluations"
    )));
}

#[tokio::test]
async fn test_setup_tolerates_existing_table() {
    let h = harness();
    send(&h.app, Method::POST, "/setup", "").await;
    let (status, body) = send(&h.app, Method::POST, "/setup", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["messages"][0], "BigQuery table already exists.");
    assert_eq!(h.tasks.queues().len(), 2);
}

#[tokio::test]
async fn test_setup_reports_creation_failures() {
    let h = harness();
    h.warehouse.fail_table_creation(true);
    h.tasks.fail_queue_creation(true);

    let (status, body) = send(&h.app, Method::POST, "/setup", "").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = parse(&body);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].as_str().unwrap().starts_with("Error creating BigQuery table:"));
    assert!(errors[1].as_str().unwrap().starts_with("Error creating Cloud Tasks queue:"));
    assert!(body["messages"].as_array().unwrap().is_empty());
    assert!(body.get("task_queue_id").is_none());
    assert!(h.tasks.queues().is_empty());
}

#[tokio::test]
async fn test_setup_partial_failure_keeps_messages() {
    let h = harness();
    h.tasks.fail_queue_creation(true);

    let (status, body) = send(&h.app, Method::POST, "/setup", "").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = parse(&body);
    assert_eq!(body["messages"], json!(["BigQuery table created."]));
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_populate_requires_queue_id() {
    let h = harness();
    let (status, body) = send(&h.app, Method::POST, "/populate", "{\"offset\": 0}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse(&body)["error"], "task_queue_id not provided.");

    let (status, body) = send(&h.app, Method::POST, "/populate", "{\"task_queue_id\": \"\"}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse(&body)["error"], "task_queue_id not provided.");

    let (status, body) = send(&h.app, Method::POST, "/populate", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse(&body)["error"], "task_queue_id not provided.");
}

#[tokio::test]
async fn test_populate_rejects_malformed_body() {
    let h = harness();

    let (status, body) = send(&h.app, Method::POST, "/populate", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = parse(&body)["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Invalid request body:"), "{}", error);

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/populate",
        "{\"task_queue_id\": \"q-1\", \"offset\": \"ten\"}",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = parse(&body)["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Invalid request body:"), "{}", error);
    assert!(h.tasks.tasks().is_empty());
}

#[tokio::test]
async fn test_populate_creates_batch() {
    let rows = (0..3).map(|i| asset_row(&format!("a{}", i))).collect();
    let h = harness_with(MockWarehouse::with_rows(rows));
    h.tasks.create_queue("q-1").await.unwrap();

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/populate",
        "{\"task_queue_id\": \"q-1\", \"offset\": 2}",
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let body = parse(&body);
    assert_eq!(body["tasks_created"], 1);
    assert_eq!(body["message"], "Successfully created 1 tasks.");

    let tasks = h.tasks.tasks();
    let payload: Value = serde_json::from_slice(&tasks[0].1.body).unwrap();
    assert_eq!(payload["asset_id"], "a2");
    assert_eq!(payload["location"], json!({"latitude": 37.4, "longitude": -122.1}));
    assert_eq!(payload["detection_time"], "2024-05-01T12:30:00Z");
}

#[tokio::test]
async fn test_populate_upstream_failure() {
    let h = harness();
    h.warehouse.fail_queries(true);
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/populate",
        "{\"task_queue_id\": \"q-1\"}",
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(parse(&body)["error"].as_str().unwrap().contains("query failed"));
}

#[tokio::test]
async fn test_process_empty_body() {
    let h = harness();
    let (status, body) = send(&h.app, Method::POST, "/process", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Error: Empty request body.");
    assert_eq!(h.model.call_count(), 0);
}

#[tokio::test]
async fn test_process_writes_result() {
    let h = harness();
    let payload = json!({
        "asset_id": "pole-9",
        "location": {"latitude": 1.0, "longitude": 2.0},
        "observations": [{"observation_id": "o1", "gcs_uri": "gs://imgs/9.jpg"}]
    });
    let (status, body) = send(&h.app, Method::POST, "/process", &payload.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Processing complete.");
    let (_, row) = &h.warehouse.inserted()[0];
    assert_eq!(row["asset_id"], "pole-9");
    assert_eq!(row["pole_condition"], "OK");
}

#[tokio::test]
async fn test_process_model_failure() {
    let h = harness();
    h.model.push_error("quota exceeded");
    let payload = json!({"asset_id": "pole-9", "observations": []});
    let (status, body) = send(&h.app, Method::POST, "/process", &payload.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Error processing image.");
    assert!(h.warehouse.inserted().is_empty());
}

#[tokio::test]
async fn test_teardown() {
    let h = harness();
    let (_, body) = send(&h.app, Method::POST, "/setup", "").await;
    let queue_id = parse(&body)["task_queue_id"].as_str().unwrap().to_string();
    let request = json!({ "task_queue_id": queue_id }).to_string();

    let (status, body) = send(&h.app, Method::GET, "/teardown", &request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["message"], "Teardown complete.");
    assert!(h.tasks.queues().is_empty());

    let (status, body) = send(&h.app, Method::POST, "/teardown", &request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["message"], "Resources not found.");

    let (status, _) = send(&h.app, Method::POST, "/teardown", "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
