//! Cloud Tasks v2 REST client.

use crate::error::{GcpError, GcpResult};
use crate::http::AuthorizedClient;
use crate::traits::{HttpTask, TaskQueue};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::info;

const CLOUD_TASKS_API: &str = "https://cloudtasks.googleapis.com/v2";
const SERVICE: &str = "Cloud Tasks";

#[derive(Clone)]
pub struct CloudTasksClient {
    http: AuthorizedClient,
    project: String,
    location: String,
    base_url: String,
}

impl CloudTasksClient {
    pub fn new(http: AuthorizedClient, project: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            http,
            project: project.into(),
            location: location.into(),
            base_url: CLOUD_TASKS_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `projects/{project}/locations/{location}`
    pub fn location_path(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.location)
    }

    /// `projects/{project}/locations/{location}/queues/{queue}`
    pub fn queue_path(&self, queue_id: &str) -> String {
        format!("{}/queues/{}", self.location_path(), queue_id)
    }
}

/// REST representation of an HTTP task; the body travels base64-encoded.
pub fn task_body(task: &HttpTask) -> Value {
    let mut http_request = Map::new();
    http_request.insert("url".to_string(), json!(task.url));
    http_request.insert("httpMethod".to_string(), json!("POST"));
    http_request.insert("headers".to_string(), json!(task.headers));
    http_request.insert("body".to_string(), json!(BASE64.encode(&task.body)));
    if let Some(account) = &task.oidc_service_account {
        http_request.insert(
            "oidcToken".to_string(),
            json!({ "serviceAccountEmail": account }),
        );
    }
    json!({ "task": { "httpRequest": Value::Object(http_request) } })
}

#[async_trait]
impl TaskQueue for CloudTasksClient {
    async fn create_queue(&self, queue_id: &str) -> GcpResult<()> {
        let url = format!("{}/{}/queues", self.base_url, self.location_path());
        let body = json!({ "name": self.queue_path(queue_id) });
        self.http.send_json(SERVICE, Method::POST, &url, Some(&body)).await?;
        info!(queue = queue_id, "Created task queue");
        Ok(())
    }

    async fn create_http_task(&self, queue_id: &str, task: &HttpTask) -> GcpResult<String> {
        let url = format!("{}/{}/tasks", self.base_url, self.queue_path(queue_id));
        let value = self
            .http
            .send_json(SERVICE, Method::POST, &url, Some(&task_body(task)))
            .await?;
        value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GcpError::InvalidResponse("created task has no name".to_string()))
    }

    async fn delete_queue(&self, queue_id: &str) -> GcpResult<()> {
        let url = format!("{}/{}", self.base_url, self.queue_path(queue_id));
        self.http.send_json(SERVICE, Method::DELETE, &url, None).await?;
        info!(queue = queue_id, "Deleted task queue");
        Ok(())
    }
}
