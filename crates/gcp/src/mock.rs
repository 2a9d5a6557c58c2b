//! In-memory implementations of the service traits.
//!
//! Used by unit tests across the workspace and by the integration suite to run
//! whole pipelines without network access. Each mock records what it was asked
//! to do so tests can assert on it afterwards.

use crate::error::{GcpError, GcpResult};
use crate::traits::{GenerativeModel, HttpTask, InsertError, MessageBus, ObjectStore, TaskQueue, Warehouse};
use crate::vertex::{GenerateContentRequest, GenerateContentResponse};
use async_trait::async_trait;
use imagery_core::{SchemaField, TableRef};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Pull a trailing `LIMIT n OFFSET m` out of a query.
fn window(sql: &str) -> Option<(usize, usize)> {
    let tokens: Vec<&str> = sql.split_whitespace().collect();
    let at = tokens.iter().rposition(|t| t.eq_ignore_ascii_case("LIMIT"))?;
    let limit = tokens.get(at + 1)?.parse().ok()?;
    let offset = match tokens.get(at + 2) {
        Some(t) if t.eq_ignore_ascii_case("OFFSET") => tokens.get(at + 3)?.parse().ok()?,
        _ => 0,
    };
    Some((limit, offset))
}

/// Warehouse backed by a vector of source rows.
///
/// `COUNT(` queries answer `[{"total_rows": n}]`; other queries return the
/// source rows sliced by their `LIMIT`/`OFFSET` window. Registered responses
/// take precedence when their key is a substring of the query.
#[derive(Default)]
pub struct MockWarehouse {
    rows: Mutex<Vec<Value>>,
    responses: Mutex<Vec<(String, Vec<Value>)>>,
    queries: Mutex<Vec<String>>,
    row_limits: Mutex<Vec<usize>>,
    fail_queries: AtomicBool,
    fail_table_creation: AtomicBool,
    statement_type: Mutex<Option<String>>,
    inserted: Mutex<Vec<(TableRef, Value)>>,
    insert_errors: Mutex<Vec<InsertError>>,
    tables: Mutex<BTreeMap<(String, String), Vec<SchemaField>>>,
    datasets: Mutex<BTreeMap<String, Value>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Value>) -> Self {
        let mock = Self::default();
        *lock(&mock.rows) = rows;
        mock
    }

    /// Answer any query containing `needle` with `rows`.
    pub fn respond_to(&self, needle: impl Into<String>, rows: Vec<Value>) {
        lock(&self.responses).push((needle.into(), rows));
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_table_creation(&self, fail: bool) {
        self.fail_table_creation.store(fail, Ordering::SeqCst);
    }

    /// Statement type reported by [`Warehouse::dry_run`]. Defaults to `SELECT`.
    pub fn set_statement_type(&self, statement_type: impl Into<String>) {
        *lock(&self.statement_type) = Some(statement_type.into());
    }

    /// Reject the next insert with these per-row errors.
    pub fn reject_next_insert(&self, errors: Vec<InsertError>) {
        *lock(&self.insert_errors) = errors;
    }

    pub fn add_dataset(&self, dataset: &str, metadata: Value) {
        lock(&self.datasets).insert(dataset.to_string(), metadata);
    }

    pub fn add_table(&self, table: &TableRef, schema: Vec<SchemaField>) {
        lock(&self.tables).insert((table.dataset.clone(), table.table.clone()), schema);
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    /// Row limits passed to [`Warehouse::query_limited`], in call order.
    pub fn row_limits(&self) -> Vec<usize> {
        lock(&self.row_limits).clone()
    }

    pub fn inserted(&self) -> Vec<(TableRef, Value)> {
        lock(&self.inserted).clone()
    }

    pub fn has_table(&self, table: &TableRef) -> bool {
        lock(&self.tables).contains_key(&(table.dataset.clone(), table.table.clone()))
    }

    pub fn table_schema(&self, table: &TableRef) -> Option<Vec<SchemaField>> {
        lock(&self.tables)
            .get(&(table.dataset.clone(), table.table.clone()))
            .cloned()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn query(&self, sql: &str) -> GcpResult<Vec<Value>> {
        lock(&self.queries).push(sql.to_string());
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(GcpError::Api {
                service: "BigQuery",
                status: 500,
                message: "query failed".to_string(),
            });
        }

        if let Some((_, rows)) = lock(&self.responses).iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            return Ok(rows.clone());
        }

        let rows = lock(&self.rows);
        if sql.contains("COUNT(") {
            return Ok(vec![json!({ "total_rows": rows.len() })]);
        }
        Ok(match window(sql) {
            Some((limit, offset)) => rows.iter().skip(offset).take(limit).cloned().collect(),
            None => rows.clone(),
        })
    }

    async fn query_limited(&self, sql: &str, max_rows: usize) -> GcpResult<Vec<Value>> {
        lock(&self.row_limits).push(max_rows);
        let mut rows = self.query(sql).await?;
        rows.truncate(max_rows);
        Ok(rows)
    }

    async fn dry_run(&self, sql: &str) -> GcpResult<String> {
        lock(&self.queries).push(sql.to_string());
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(GcpError::Api {
                service: "BigQuery",
                status: 400,
                message: "Syntax error".to_string(),
            });
        }
        Ok(lock(&self.statement_type)
            .clone()
            .unwrap_or_else(|| "SELECT".to_string()))
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[Value]) -> GcpResult<Vec<InsertError>> {
        let errors = std::mem::take(&mut *lock(&self.insert_errors));
        if !errors.is_empty() {
            return Ok(errors);
        }
        let mut inserted = lock(&self.inserted);
        inserted.extend(rows.iter().map(|row| (table.clone(), row.clone())));
        Ok(Vec::new())
    }

    async fn create_table(&self, table: &TableRef, schema: &[SchemaField]) -> GcpResult<()> {
        if self.fail_table_creation.load(Ordering::SeqCst) {
            return Err(GcpError::Api {
                service: "BigQuery",
                status: 403,
                message: "Access Denied".to_string(),
            });
        }
        let mut tables = lock(&self.tables);
        let key = (table.dataset.clone(), table.table.clone());
        if tables.contains_key(&key) {
            return Err(GcpError::Conflict(format!("Already Exists: Table {}.{}", key.0, key.1)));
        }
        tables.insert(key, schema.to_vec());
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> GcpResult<()> {
        lock(&self.tables).remove(&(table.dataset.clone(), table.table.clone()));
        Ok(())
    }

    async fn list_datasets(&self) -> GcpResult<Vec<String>> {
        let mut ids: BTreeSet<String> = lock(&self.datasets).keys().cloned().collect();
        ids.extend(lock(&self.tables).keys().map(|(dataset, _)| dataset.clone()));
        Ok(ids.into_iter().collect())
    }

    async fn get_dataset(&self, dataset: &str) -> GcpResult<Value> {
        lock(&self.datasets)
            .get(dataset)
            .cloned()
            .ok_or_else(|| GcpError::NotFound(format!("Not found: Dataset {}", dataset)))
    }

    async fn list_tables(&self, dataset: &str) -> GcpResult<Vec<String>> {
        Ok(lock(&self.tables)
            .keys()
            .filter(|(ds, _)| ds == dataset)
            .map(|(_, table)| table.clone())
            .collect())
    }

    async fn get_table(&self, dataset: &str, table: &str) -> GcpResult<Value> {
        let tables = lock(&self.tables);
        let schema = tables
            .get(&(dataset.to_string(), table.to_string()))
            .ok_or_else(|| GcpError::NotFound(format!("Not found: Table {}.{}", dataset, table)))?;
        Ok(json!({
            "tableReference": { "datasetId": dataset, "tableId": table },
            "schema": { "fields": schema },
        }))
    }
}

/// Task queue that keeps every enqueued task.
#[derive(Default)]
pub struct MockTaskQueue {
    queues: Mutex<BTreeSet<String>>,
    tasks: Mutex<Vec<(String, HttpTask)>>,
    fail_tasks: AtomicBool,
    fail_queue_creation: AtomicBool,
}

impl MockTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_tasks(&self, fail: bool) {
        self.fail_tasks.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queue_creation(&self, fail: bool) {
        self.fail_queue_creation.store(fail, Ordering::SeqCst);
    }

    pub fn queues(&self) -> Vec<String> {
        lock(&self.queues).iter().cloned().collect()
    }

    pub fn tasks(&self) -> Vec<(String, HttpTask)> {
        lock(&self.tasks).clone()
    }

    /// Drain the recorded tasks, as a worker would.
    pub fn take_tasks(&self) -> Vec<(String, HttpTask)> {
        std::mem::take(&mut *lock(&self.tasks))
    }
}

#[async_trait]
impl TaskQueue for MockTaskQueue {
    async fn create_queue(&self, queue_id: &str) -> GcpResult<()> {
        if self.fail_queue_creation.load(Ordering::SeqCst) {
            return Err(GcpError::Api {
                service: "Cloud Tasks",
                status: 429,
                message: "queue quota exceeded".to_string(),
            });
        }
        if !lock(&self.queues).insert(queue_id.to_string()) {
            return Err(GcpError::Conflict(format!("Queue {} already exists", queue_id)));
        }
        Ok(())
    }

    async fn create_http_task(&self, queue_id: &str, task: &HttpTask) -> GcpResult<String> {
        if self.fail_tasks.load(Ordering::SeqCst) {
            return Err(GcpError::Api {
                service: "Cloud Tasks",
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        if !lock(&self.queues).contains(queue_id) {
            return Err(GcpError::NotFound(format!("Queue {} does not exist", queue_id)));
        }
        let mut tasks = lock(&self.tasks);
        tasks.push((queue_id.to_string(), task.clone()));
        Ok(format!("queues/{}/tasks/{}", queue_id, tasks.len()))
    }

    async fn delete_queue(&self, queue_id: &str) -> GcpResult<()> {
        if !lock(&self.queues).remove(queue_id) {
            return Err(GcpError::NotFound(format!("Queue {} does not exist", queue_id)));
        }
        Ok(())
    }
}

/// Push subscription as registered on the [`MockMessageBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSubscription {
    pub topic: String,
    pub push_endpoint: String,
    pub oidc_service_account: Option<String>,
}

#[derive(Default)]
pub struct MockMessageBus {
    topics: Mutex<BTreeSet<String>>,
    subscriptions: Mutex<BTreeMap<String, MockSubscription>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topics(&self) -> Vec<String> {
        lock(&self.topics).iter().cloned().collect()
    }

    pub fn subscriptions(&self) -> BTreeMap<String, MockSubscription> {
        lock(&self.subscriptions).clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.published).clone()
    }
}

#[async_trait]
impl MessageBus for MockMessageBus {
    async fn create_topic(&self, topic_id: &str) -> GcpResult<()> {
        if !lock(&self.topics).insert(topic_id.to_string()) {
            return Err(GcpError::Conflict(format!("Topic {} already exists", topic_id)));
        }
        Ok(())
    }

    async fn create_push_subscription(
        &self,
        subscription_id: &str,
        topic_id: &str,
        push_endpoint: &str,
        oidc_service_account: Option<&str>,
    ) -> GcpResult<()> {
        if !lock(&self.topics).contains(topic_id) {
            return Err(GcpError::NotFound(format!("Topic {} does not exist", topic_id)));
        }
        let mut subscriptions = lock(&self.subscriptions);
        if subscriptions.contains_key(subscription_id) {
            return Err(GcpError::Conflict(format!(
                "Subscription {} already exists",
                subscription_id
            )));
        }
        subscriptions.insert(
            subscription_id.to_string(),
            MockSubscription {
                topic: topic_id.to_string(),
                push_endpoint: push_endpoint.to_string(),
                oidc_service_account: oidc_service_account.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn publish(&self, topic_id: &str, data: &[u8]) -> GcpResult<String> {
        if !lock(&self.topics).contains(topic_id) {
            return Err(GcpError::NotFound(format!("Topic {} does not exist", topic_id)));
        }
        let mut published = lock(&self.published);
        published.push((topic_id.to_string(), data.to_vec()));
        Ok(published.len().to_string())
    }

    async fn delete_subscription(&self, subscription_id: &str) -> GcpResult<()> {
        lock(&self.subscriptions)
            .remove(subscription_id)
            .map(|_| ())
            .ok_or_else(|| GcpError::NotFound(format!("Subscription {} does not exist", subscription_id)))
    }

    async fn delete_topic(&self, topic_id: &str) -> GcpResult<()> {
        if !lock(&self.topics).remove(topic_id) {
            return Err(GcpError::NotFound(format!("Topic {} does not exist", topic_id)));
        }
        Ok(())
    }
}

/// Model that replays queued responses, then falls back to a fixed text.
pub struct MockModel {
    responses: Mutex<VecDeque<GcpResult<GenerateContentResponse>>>,
    default_text: Mutex<String>,
    requests: Mutex<Vec<(String, GenerateContentRequest)>>,
    calls: AtomicUsize,
}

impl Default for MockModel {
    fn default() -> Self {
        Self::with_text("{}")
    }
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_text: Mutex::new(text.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push_response(&self, response: GenerateContentResponse) {
        lock(&self.responses).push_back(Ok(response));
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push_response(GenerateContentResponse::from_text(text));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.responses).push_back(Err(GcpError::Api {
            service: "Vertex AI",
            status: 500,
            message: message.into(),
        }));
    }

    pub fn requests(&self) -> Vec<(String, GenerateContentRequest)> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> GcpResult<GenerateContentResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push((model.to_string(), request.clone()));
        match lock(&self.responses).pop_front() {
            Some(response) => response,
            None => Ok(GenerateContentResponse::from_text(lock(&self.default_text).clone())),
        }
    }
}

#[derive(Default)]
pub struct MockObjectStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored object keyed by its `gs://` URI, with its content type.
    pub fn object(&self, uri: &str) -> Option<(Vec<u8>, String)> {
        lock(&self.objects).get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> GcpResult<String> {
        let uri = format!("gs://{}/{}", bucket, name);
        lock(&self.objects).insert(uri.clone(), (data, content_type.to_string()));
        Ok(uri)
    }
}
