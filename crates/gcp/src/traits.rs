//! Seams between the services and the managed services they drive.
//!
//! Each trait has a REST implementation in this crate and an in-memory one in
//! [`crate::mock`].

use crate::error::GcpResult;
use crate::vertex::{GenerateContentRequest, GenerateContentResponse};
use async_trait::async_trait;
use imagery_core::{SchemaField, TableRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One rejected row of a streaming insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertError {
    pub index: u64,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Tabular data warehouse (BigQuery).
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a standard-SQL query and return every row as a JSON object.
    async fn query(&self, sql: &str) -> GcpResult<Vec<Value>>;

    /// Like [`Warehouse::query`] but returns at most `max_rows` rows and
    /// stops fetching result pages once that many are in hand.
    async fn query_limited(&self, sql: &str, max_rows: usize) -> GcpResult<Vec<Value>>;

    /// Validate `sql` without running it and return its statement type
    /// (`SELECT`, `INSERT`, `CREATE_TABLE`, ...).
    async fn dry_run(&self, sql: &str) -> GcpResult<String>;

    /// Stream rows into a table. Rejected rows are returned, not raised.
    async fn insert_rows(&self, table: &TableRef, rows: &[Value]) -> GcpResult<Vec<InsertError>>;

    /// Create a table. An existing table yields `GcpError::Conflict`.
    async fn create_table(&self, table: &TableRef, schema: &[SchemaField]) -> GcpResult<()>;

    /// Delete a table. A missing table is not an error.
    async fn delete_table(&self, table: &TableRef) -> GcpResult<()>;

    async fn list_datasets(&self) -> GcpResult<Vec<String>>;

    async fn get_dataset(&self, dataset: &str) -> GcpResult<Value>;

    async fn list_tables(&self, dataset: &str) -> GcpResult<Vec<String>>;

    async fn get_table(&self, dataset: &str, table: &str) -> GcpResult<Value>;
}

/// HTTP target of a queued task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTask {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    /// Service account the queue mints an OIDC token for.
    pub oidc_service_account: Option<String>,
}

impl HttpTask {
    /// A JSON `POST` to `url`.
    pub fn json<T: Serialize>(url: impl Into<String>, payload: &T) -> GcpResult<Self> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Ok(Self {
            url: url.into(),
            body: serde_json::to_vec(payload)?,
            headers,
            oidc_service_account: None,
        })
    }

    pub fn with_oidc(mut self, service_account: impl Into<String>) -> Self {
        self.oidc_service_account = Some(service_account.into());
        self
    }
}

/// HTTP task queue (Cloud Tasks).
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Create a queue. An existing queue yields `GcpError::Conflict`.
    async fn create_queue(&self, queue_id: &str) -> GcpResult<()>;

    /// Enqueue a task and return its resource name.
    async fn create_http_task(&self, queue_id: &str, task: &HttpTask) -> GcpResult<String>;

    /// Delete a queue. A missing queue yields `GcpError::NotFound`.
    async fn delete_queue(&self, queue_id: &str) -> GcpResult<()>;
}

/// Publish/subscribe bus (Pub/Sub).
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn create_topic(&self, topic_id: &str) -> GcpResult<()>;

    async fn create_push_subscription(
        &self,
        subscription_id: &str,
        topic_id: &str,
        push_endpoint: &str,
        oidc_service_account: Option<&str>,
    ) -> GcpResult<()>;

    /// Publish one message and return its id.
    async fn publish(&self, topic_id: &str, data: &[u8]) -> GcpResult<String>;

    async fn delete_subscription(&self, subscription_id: &str) -> GcpResult<()>;

    async fn delete_topic(&self, topic_id: &str) -> GcpResult<()>;
}

/// Hosted generative model (Vertex AI).
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> GcpResult<GenerateContentResponse>;
}

/// Object storage (Cloud Storage).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload an object and return its `gs://` URI.
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> GcpResult<String>;
}
