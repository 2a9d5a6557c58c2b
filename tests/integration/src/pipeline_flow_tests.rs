//! Batch processor lifecycle: setup, paged populate, task delivery, teardown.

use crate::test_utils::*;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

#[tokio::test]
async fn test_full_batch_run() {
    init_tracing();
    let fakes = Fakes::with_assets(7);
    let app = fakes.batch_processor();

    let (status, body) = send(&app, Method::POST, "/setup", Vec::new()).await;
    assert_eq!(status, StatusCode::OK);
    let queue_id = parse(&body)["task_queue_id"].as_str().unwrap().to_string();

    // batch size is 3: two full batches, one partial, then an empty page
    let mut offset = 0;
    let mut created = Vec::new();
    loop {
        let request = json!({ "task_queue_id": queue_id, "offset": offset });
        let (status, body) = send(&app, Method::POST, "/populate", request.to_string().into_bytes()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let n = parse(&body)["tasks_created"].as_u64().unwrap();
        created.push(n);
        if n == 0 {
            break;
        }
        offset += 3;
    }
    assert_eq!(created, vec![3, 3, 1, 0]);

    let tasks = fakes.tasks.take_tasks();
    assert_eq!(tasks.len(), 7);
    for (queue, task) in &tasks {
        assert_eq!(queue, &queue_id);
        assert_eq!(task.url, format!("{}/process", PROCESSOR_URL));
        assert_eq!(task.oidc_service_account.as_deref(), Some(SERVICE_ACCOUNT));
    }

    let statuses = dispatch(&app, tasks).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::OK));

    let inserted = fakes.warehouse.inserted();
    assert_eq!(inserted.len(), 7);
    let ids: Vec<&str> = inserted
        .iter()
        .map(|(_, row)| row["asset_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.first(), Some(&"pole-0000"));
    assert_eq!(ids.last(), Some(&"pole-0006"));

    let (table, row) = &inserted[2];
    assert_eq!(table, &config().results);
    assert_eq!(row["pole_condition"], "GOOD");
    assert_eq!(row["material"], "WOOD");
    assert_eq!(row["transformers"], Value::Null);
    assert_eq!(row["gcs_uris"], json!(["gs://imgs/2/a.jpg", "gs://imgs/2/b.jpg"]));
    assert_eq!(row["location"], json!({"latitude": 33.7489, "longitude": -84.0002}));

    // every observation image went to the model with the prompt last
    let (model, request) = &fakes.model.requests()[0];
    assert_eq!(model, &config().model);
    let parts = &request.contents[0].parts;
    assert_eq!(parts.len(), 3);
    assert!(parts[2].text.is_some());

    let teardown = json!({ "task_queue_id": queue_id }).to_string().into_bytes();
    let (status, body) = send(&app, Method::POST, "/teardown", teardown).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["message"], "Teardown complete.");
    assert!(!fakes.warehouse.has_table(&config().results));
    assert!(fakes.tasks.queues().is_empty());
}

#[tokio::test]
async fn test_bad_model_answer_is_still_recorded() {
    let fakes = Fakes::with_assets(1);
    fakes.model.push_text("I cannot see a pole in these images.");
    let app = fakes.batch_processor();

    let (_, body) = send(&app, Method::POST, "/setup", Vec::new()).await;
    let queue_id = parse(&body)["task_queue_id"].as_str().unwrap().to_string();
    let request = json!({ "task_queue_id": queue_id });
    send(&app, Method::POST, "/populate", request.to_string().into_bytes()).await;

    let statuses = dispatch(&app, fakes.tasks.take_tasks()).await;
    assert_eq!(statuses, vec![StatusCode::OK]);

    let (_, row) = &fakes.warehouse.inserted()[0];
    assert_eq!(row["asset_id"], "pole-0000");
    assert_eq!(row["pole_condition"], Value::Null);
}

#[tokio::test]
async fn test_failed_tasks_are_reported_for_retry() {
    let fakes = Fakes::with_assets(2);
    fakes.model.push_error("resource exhausted");
    let app = fakes.batch_processor();

    let (_, body) = send(&app, Method::POST, "/setup", Vec::new()).await;
    let queue_id = parse(&body)["task_queue_id"].as_str().unwrap().to_string();
    let request = json!({ "task_queue_id": queue_id });
    send(&app, Method::POST, "/populate", request.to_string().into_bytes()).await;

    let statuses = dispatch(&app, fakes.tasks.take_tasks()).await;
    assert_eq!(statuses, vec![StatusCode::INTERNAL_SERVER_ERROR, StatusCode::OK]);
    assert_eq!(fakes.warehouse.inserted().len(), 1);
}
