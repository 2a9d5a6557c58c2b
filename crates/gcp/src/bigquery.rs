//! BigQuery v2 REST client.

use crate::error::{GcpError, GcpResult};
use crate::http::AuthorizedClient;
use crate::traits::{InsertError, Warehouse};
use async_trait::async_trait;
use chrono::{SecondsFormat, TimeZone, Utc};
use imagery_core::{SchemaField, TableRef};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};

const BIGQUERY_API: &str = "https://bigquery.googleapis.com/bigquery/v2";
const SERVICE: &str = "BigQuery";
const QUERY_TIMEOUT_MS: u64 = 10_000;
const MAX_POLLS: usize = 60;

/// Column description as returned in query results.
///
/// Looser than [`SchemaField`]: results carry types (GEOGRAPHY, NUMERIC,
/// DATE, ...) that results tables never declare.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<ResultField>,
}

impl ResultField {
    fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResultSchema {
    #[serde(default)]
    fields: Vec<ResultField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<ResultSchema>,
    #[serde(default)]
    rows: Vec<Value>,
    #[serde(default)]
    page_token: Option<String>,
}

/// Decode `{"f": [{"v": ...}]}` rows into JSON objects keyed by column name.
pub fn decode_rows(schema: &[ResultField], rows: &[Value]) -> GcpResult<Vec<Value>> {
    rows.iter().map(|row| decode_record(schema, row)).collect()
}

fn decode_record(fields: &[ResultField], record: &Value) -> GcpResult<Value> {
    let cells = record
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| GcpError::InvalidResponse(format!("row without cells: {}", record)))?;

    if cells.len() != fields.len() {
        return Err(GcpError::InvalidResponse(format!(
            "row has {} cells but schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    let mut object = Map::new();
    for (field, cell) in fields.iter().zip(cells) {
        let value = cell.get("v").unwrap_or(&Value::Null);
        object.insert(field.name.clone(), decode_cell(field, value)?);
    }
    Ok(Value::Object(object))
}

fn decode_cell(field: &ResultField, value: &Value) -> GcpResult<Value> {
    if value.is_null() {
        return Ok(if field.is_repeated() {
            Value::Array(Vec::new())
        } else {
            Value::Null
        });
    }

    if field.is_repeated() {
        let items = value.as_array().ok_or_else(|| {
            GcpError::InvalidResponse(format!("repeated field {} is not an array", field.name))
        })?;
        return items
            .iter()
            .map(|item| decode_single(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<GcpResult<Vec<_>>>()
            .map(Value::Array);
    }

    decode_single(field, value)
}

fn decode_single(field: &ResultField, value: &Value) -> GcpResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => decode_record(&field.fields, value),
        "INTEGER" | "INT64" => Ok(value
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| value.clone())),
        "FLOAT" | "FLOAT64" => Ok(value
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|f| f.is_finite())
            .map(Value::from)
            .unwrap_or_else(|| value.clone())),
        "BOOLEAN" | "BOOL" => Ok(match value.as_str() {
            Some("true") => Value::Bool(true),
            Some("false") => Value::Bool(false),
            _ => value.clone(),
        }),
        "TIMESTAMP" => Ok(value
            .as_str()
            .and_then(timestamp_to_rfc3339)
            .map(Value::from)
            .unwrap_or_else(|| value.clone())),
        _ => Ok(value.clone()),
    }
}

/// Query results encode timestamps as (possibly exponent-notation) epoch seconds.
fn timestamp_to_rfc3339(seconds: &str) -> Option<String> {
    let seconds: f64 = seconds.parse().ok()?;
    let micros = (seconds * 1_000_000.0).round() as i64;
    Utc.timestamp_micros(micros)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// BigQuery client bound to one project.
#[derive(Clone)]
pub struct BigQueryClient {
    http: AuthorizedClient,
    project: String,
    base_url: String,
}

impl BigQueryClient {
    pub fn new(http: AuthorizedClient, project: impl Into<String>) -> Self {
        Self {
            http,
            project: project.into(),
            base_url: BIGQUERY_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn project_url(&self) -> String {
        format!("{}/projects/{}", self.base_url, self.project)
    }

    fn table_url(&self, table: &TableRef) -> String {
        format!(
            "{}/datasets/{}/tables/{}",
            self.project_url(),
            table.dataset,
            table.table
        )
    }

    async fn query_page(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
        max_results: Option<usize>,
    ) -> GcpResult<QueryResponse> {
        let mut url = format!(
            "{}/queries/{}?timeoutMs={}",
            self.project_url(),
            job.job_id,
            QUERY_TIMEOUT_MS
        );
        if let Some(max) = max_results {
            url.push_str(&format!("&maxResults={}", max));
        }
        if let Some(location) = &job.location {
            url.push_str(&format!("&location={}", urlencoding::encode(location)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        let value = self.http.send_json(SERVICE, Method::GET, &url, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Run `sql` and collect rows, stopping once `max_rows` rows are in hand.
    async fn run_query(&self, sql: &str, max_rows: Option<usize>) -> GcpResult<Vec<Value>> {
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
        });
        if let Some(max) = max_rows {
            body["maxResults"] = json!(max);
        }
        let url = format!("{}/queries", self.project_url());
        let value = self.http.send_json(SERVICE, Method::POST, &url, Some(&body)).await?;
        let mut response: QueryResponse = serde_json::from_value(value)?;

        let mut polls = 0;
        while !response.job_complete {
            polls += 1;
            if polls > MAX_POLLS {
                return Err(GcpError::Timeout("query did not complete".to_string()));
            }
            let job = response.job_reference.clone().ok_or_else(|| {
                GcpError::InvalidResponse("incomplete query without job reference".to_string())
            })?;
            debug!(job_id = %job.job_id, polls, "Waiting for query job");
            tokio::time::sleep(Duration::from_millis(250)).await;
            response = self.query_page(&job, None, max_rows).await?;
        }

        let schema = response.schema.take().unwrap_or_default().fields;
        let mut rows = decode_rows(&schema, &response.rows)?;

        while let Some(token) = response.page_token.take() {
            let remaining = match max_rows {
                Some(max) if rows.len() >= max => {
                    debug!(rows = rows.len(), "Row limit reached, not fetching further pages");
                    break;
                }
                Some(max) => Some(max - rows.len()),
                None => None,
            };
            let job = response.job_reference.clone().ok_or_else(|| {
                GcpError::InvalidResponse("paged result without job reference".to_string())
            })?;
            response = self.query_page(&job, Some(&token), remaining).await?;
            rows.extend(decode_rows(&schema, &response.rows)?);
        }

        if let Some(max) = max_rows {
            rows.truncate(max);
        }
        debug!(rows = rows.len(), "Query complete");
        Ok(rows)
    }

    async fn list_ids(&self, url: &str, collection: &str, reference: &str, id_key: &str) -> GcpResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page_url = match &page_token {
                Some(token) => format!("{}?pageToken={}", url, urlencoding::encode(token)),
                None => url.to_string(),
            };
            let value = self.http.send_json(SERVICE, Method::GET, &page_url, None).await?;
            if let Some(items) = value.get(collection).and_then(Value::as_array) {
                ids.extend(items.iter().filter_map(|item| {
                    item.get(reference)
                        .and_then(|r| r.get(id_key))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                }));
            }
            page_token = value
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_token.is_none() {
                return Ok(ids);
            }
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    #[instrument(skip(self, sql), fields(project = %self.project))]
    async fn query(&self, sql: &str) -> GcpResult<Vec<Value>> {
        self.run_query(sql, None).await
    }

    #[instrument(skip(self, sql), fields(project = %self.project))]
    async fn query_limited(&self, sql: &str, max_rows: usize) -> GcpResult<Vec<Value>> {
        self.run_query(sql, Some(max_rows)).await
    }

    async fn dry_run(&self, sql: &str) -> GcpResult<String> {
        let body = json!({
            "configuration": {
                "dryRun": true,
                "query": { "query": sql, "useLegacySql": false }
            }
        });
        let url = format!("{}/jobs", self.project_url());
        let value = self.http.send_json(SERVICE, Method::POST, &url, Some(&body)).await?;
        value
            .pointer("/statistics/query/statementType")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GcpError::InvalidResponse("dry run returned no statement type".to_string()))
    }

    #[instrument(skip(self, rows), fields(table = %table.table, rows = rows.len()))]
    async fn insert_rows(&self, table: &TableRef, rows: &[Value]) -> GcpResult<Vec<InsertError>> {
        let body = json!({
            "rows": rows.iter().map(|row| json!({ "json": row })).collect::<Vec<_>>(),
        });
        let url = format!("{}/insertAll", self.table_url(table));
        let value = self.http.send_json(SERVICE, Method::POST, &url, Some(&body)).await?;
        match value.get("insertErrors") {
            Some(errors) => Ok(serde_json::from_value(errors.clone())?),
            None => Ok(Vec::new()),
        }
    }

    async fn create_table(&self, table: &TableRef, schema: &[SchemaField]) -> GcpResult<()> {
        let body = json!({
            "tableReference": {
                "projectId": self.project,
                "datasetId": table.dataset,
                "tableId": table.table,
            },
            "schema": { "fields": schema },
        });
        let url = format!("{}/datasets/{}/tables", self.project_url(), table.dataset);
        self.http.send_json(SERVICE, Method::POST, &url, Some(&body)).await?;
        info!(table = %table.qualified(&self.project), "Created table");
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> GcpResult<()> {
        match self
            .http
            .send_json(SERVICE, Method::DELETE, &self.table_url(table), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_datasets(&self) -> GcpResult<Vec<String>> {
        let url = format!("{}/datasets", self.project_url());
        self.list_ids(&url, "datasets", "datasetReference", "datasetId").await
    }

    async fn get_dataset(&self, dataset: &str) -> GcpResult<Value> {
        let url = format!("{}/datasets/{}", self.project_url(), dataset);
        self.http.send_json(SERVICE, Method::GET, &url, None).await
    }

    async fn list_tables(&self, dataset: &str) -> GcpResult<Vec<String>> {
        let url = format!("{}/datasets/{}/tables", self.project_url(), dataset);
        self.list_ids(&url, "tables", "tableReference", "tableId").await
    }

    async fn get_table(&self, dataset: &str, table: &str) -> GcpResult<Value> {
        let url = self.table_url(&TableRef::new(dataset, table));
        self.http.send_json(SERVICE, Method::GET, &url, None).await
    }
}
