//! BigQuery tools with writes blocked.
//!
//! `execute_sql` accepts one `SELECT`/`WITH` statement, confirms with a dry
//! run that BigQuery classifies it as `SELECT`, and returns at most
//! [`MAX_QUERY_RESULT_ROWS`] rows.

use crate::error::{AgentError, AgentResult};
use crate::tool::{string_arg, string_params, Tool, ToolSet};
use async_trait::async_trait;
use imagery_gcp::Warehouse;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub const MAX_QUERY_RESULT_ROWS: usize = 50;

const READ_ONLY_MESSAGE: &str = "Read-only mode only supports SELECT statements.";

/// Statements in `sql`, split on `;` outside quotes and comments, with
/// comments removed and blank statements dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                current.push(c);
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '#' => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                current.push(' ');
            }
            ';' => {
                statements.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    statements.push(current);

    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reject anything that is not exactly one query statement.
pub fn check_read_only(sql: &str) -> AgentResult<String> {
    let mut statements = split_statements(sql);
    if statements.len() != 1 {
        return Err(AgentError::Rejected(
            "Exactly one SQL statement is supported.".to_string(),
        ));
    }
    let statement = statements.remove(0);
    let keyword: String = statement
        .trim_start_matches('(')
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    if keyword != "SELECT" && keyword != "WITH" {
        return Err(AgentError::Rejected(READ_ONLY_MESSAGE.to_string()));
    }
    Ok(statement)
}

/// Shared state of the toolset.
struct Inner {
    warehouse: Arc<dyn Warehouse>,
    project: String,
}

impl Inner {
    fn check_project(&self, tool: &str, args: &Value) -> AgentResult<()> {
        match args.get("project_id").and_then(Value::as_str) {
            Some(project) if !project.is_empty() && project != self.project => {
                Err(AgentError::InvalidArguments {
                    tool: tool.to_string(),
                    message: format!(
                        "only project `{}` is available, not `{}`",
                        self.project, project
                    ),
                })
            }
            _ => Ok(()),
        }
    }
}

fn project_param(mut schema: Value) -> Value {
    schema["properties"]["project_id"] = json!({
        "type": "STRING",
        "description": "Google Cloud project id; defaults to the configured project",
    });
    schema
}

struct ListDatasetIds(Arc<Inner>);
struct GetDatasetInfo(Arc<Inner>);
struct ListTableIds(Arc<Inner>);
struct GetTableInfo(Arc<Inner>);
struct ExecuteSql(Arc<Inner>);

#[async_trait]
impl Tool for ListDatasetIds {
    fn name(&self) -> &str {
        "list_dataset_ids"
    }

    fn description(&self) -> &str {
        "Fetches BigQuery dataset ids present in a GCP project."
    }

    fn parameters(&self) -> Value {
        project_param(string_params(&[]))
    }

    async fn call(&self, args: Value) -> AgentResult<Value> {
        self.0.check_project(self.name(), &args)?;
        Ok(json!(self.0.warehouse.list_datasets().await?))
    }
}

#[async_trait]
impl Tool for GetDatasetInfo {
    fn name(&self) -> &str {
        "get_dataset_info"
    }

    fn description(&self) -> &str {
        "Fetches metadata about a BigQuery dataset."
    }

    fn parameters(&self) -> Value {
        project_param(string_params(&[("dataset_id", "Dataset id")]))
    }

    async fn call(&self, args: Value) -> AgentResult<Value> {
        self.0.check_project(self.name(), &args)?;
        let dataset = string_arg(self.name(), &args, "dataset_id")?;
        Ok(self.0.warehouse.get_dataset(dataset).await?)
    }
}

#[async_trait]
impl Tool for ListTableIds {
    fn name(&self) -> &str {
        "list_table_ids"
    }

    fn description(&self) -> &str {
        "Fetches table ids present in a BigQuery dataset."
    }

    fn parameters(&self) -> Value {
        project_param(string_params(&[("dataset_id", "Dataset id")]))
    }

    async fn call(&self, args: Value) -> AgentResult<Value> {
        self.0.check_project(self.name(), &args)?;
        let dataset = string_arg(self.name(), &args, "dataset_id")?;
        Ok(json!(self.0.warehouse.list_tables(dataset).await?))
    }
}

#[async_trait]
impl Tool for GetTableInfo {
    fn name(&self) -> &str {
        "get_table_info"
    }

    fn description(&self) -> &str {
        "Fetches metadata about a BigQuery table."
    }

    fn parameters(&self) -> Value {
        project_param(string_params(&[
            ("dataset_id", "Dataset id"),
            ("table_id", "Table id"),
        ]))
    }

    async fn call(&self, args: Value) -> AgentResult<Value> {
        self.0.check_project(self.name(), &args)?;
        let dataset = string_arg(self.name(), &args, "dataset_id")?;
        let table = string_arg(self.name(), &args, "table_id")?;
        Ok(self.0.warehouse.get_table(dataset, table).await?)
    }
}

#[async_trait]
impl Tool for ExecuteSql {
    fn name(&self) -> &str {
        "execute_sql"
    }

    fn description(&self) -> &str {
        "Runs a read-only GoogleSQL query in BigQuery and returns the result rows."
    }

    fn parameters(&self) -> Value {
        project_param(string_params(&[("query", "GoogleSQL SELECT statement")]))
    }

    async fn call(&self, args: Value) -> AgentResult<Value> {
        self.0.check_project(self.name(), &args)?;
        let sql = check_read_only(string_arg(self.name(), &args, "query")?)?;

        let statement_type = self.0.warehouse.dry_run(&sql).await?;
        if statement_type != "SELECT" {
            return Err(AgentError::Rejected(READ_ONLY_MESSAGE.to_string()));
        }

        let mut rows = self
            .0
            .warehouse
            .query_limited(&sql, MAX_QUERY_RESULT_ROWS + 1)
            .await?;
        let truncated = rows.len() > MAX_QUERY_RESULT_ROWS;
        rows.truncate(MAX_QUERY_RESULT_ROWS);
        info!(rows = rows.len(), truncated, "Query executed");

        let mut result = json!({ "status": "SUCCESS", "rows": rows });
        if truncated {
            result["result_is_likely_truncated"] = json!(true);
        }
        Ok(result)
    }
}

/// The five warehouse tools bound to `project`.
pub fn warehouse_toolset(warehouse: Arc<dyn Warehouse>, project: impl Into<String>) -> ToolSet {
    let inner = Arc::new(Inner {
        warehouse,
        project: project.into(),
    });
    ToolSet::new()
        .with(Arc::new(ListDatasetIds(inner.clone())))
        .with(Arc::new(GetDatasetInfo(inner.clone())))
        .with(Arc::new(ListTableIds(inner.clone())))
        .with(Arc::new(GetTableInfo(inner.clone())))
        .with(Arc::new(ExecuteSql(inner)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagery_core::{SchemaField, FieldType, TableRef};
    use imagery_gcp::mock::MockWarehouse;

    fn toolset(warehouse: Arc<MockWarehouse>) -> ToolSet {
        warehouse_toolset(warehouse, "demo")
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(split_statements("SELECT 1;"), vec!["SELECT 1"]);
        assert_eq!(split_statements("SELECT ';' AS x"), vec!["SELECT ';' AS x"]);
        assert_eq!(split_statements("SELECT 1; DROP TABLE t").len(), 2);
        assert_eq!(
            split_statements("-- note; here\nSELECT 1 /* ; */"),
            vec!["SELECT 1"]
        );
        assert!(split_statements("  ;; ").is_empty());
    }

    #[test]
    fn test_read_only_guard() {
        assert!(check_read_only("select * from t").is_ok());
        assert!(check_read_only("WITH a AS (SELECT 1) SELECT * FROM a").is_ok());
        assert!(check_read_only("(SELECT 1) UNION ALL (SELECT 2)").is_ok());
        assert!(matches!(
            check_read_only("DELETE FROM t WHERE true"),
            Err(AgentError::Rejected(_))
        ));
        assert!(check_read_only("SELECT 1; SELECT 2").is_err());
        assert!(check_read_only("/* SELECT */ INSERT INTO t VALUES (1)").is_err());
        assert!(check_read_only("").is_err());
    }

    #[test]
    fn test_toolset_names() {
        let tools = toolset(Arc::new(MockWarehouse::new()));
        assert_eq!(
            tools.names(),
            vec![
                "list_dataset_ids",
                "get_dataset_info",
                "list_table_ids",
                "get_table_info",
                "execute_sql"
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_sql_caps_rows() {
        let rows: Vec<Value> = (0..60).map(|i| json!({ "n": i })).collect();
        let warehouse = Arc::new(MockWarehouse::with_rows(rows));
        let tools = toolset(warehouse.clone());

        let result = tools
            .get("execute_sql")
            .unwrap()
            .call(json!({"query": "SELECT n FROM t"}))
            .await
            .unwrap();

        assert_eq!(result["status"], "SUCCESS");
        assert_eq!(result["rows"].as_array().unwrap().len(), MAX_QUERY_RESULT_ROWS);
        assert_eq!(result["result_is_likely_truncated"], true);
        // dry run, then the query itself
        assert_eq!(warehouse.queries().len(), 2);
        assert_eq!(warehouse.row_limits(), vec![MAX_QUERY_RESULT_ROWS + 1]);
    }

    #[tokio::test]
    async fn test_execute_sql_under_cap_is_not_truncated() {
        let rows: Vec<Value> = (0..MAX_QUERY_RESULT_ROWS).map(|i| json!({ "n": i })).collect();
        let warehouse = Arc::new(MockWarehouse::with_rows(rows));
        let tools = toolset(warehouse);

        let result = tools
            .get("execute_sql")
            .unwrap()
            .call(json!({"query": "SELECT n FROM t"}))
            .await
            .unwrap();

        assert_eq!(result["rows"].as_array().unwrap().len(), MAX_QUERY_RESULT_ROWS);
        assert!(result.get("result_is_likely_truncated").is_none());
    }

    #[tokio::test]
    async fn test_execute_sql_blocks_writes_found_by_dry_run() {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.set_statement_type("CREATE_TABLE_AS_SELECT");
        let tools = toolset(warehouse.clone());

        let err = tools
            .get("execute_sql")
            .unwrap()
            .call(json!({"query": "WITH x AS (SELECT 1) SELECT * FROM x"}))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Rejected(_)));
        assert_eq!(warehouse.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_sql_rejects_before_dry_run() {
        let warehouse = Arc::new(MockWarehouse::new());
        let tools = toolset(warehouse.clone());

        let err = tools
            .get("execute_sql")
            .unwrap()
            .call(json!({"query": "DROP TABLE ds.t"}))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), READ_ONLY_MESSAGE);
        assert!(warehouse.queries().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_tools() {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.add_dataset("rmi", json!({"datasetReference": {"datasetId": "rmi"}}));
        warehouse.add_table(
            &TableRef::new("rmi", "recent_roads_data"),
            vec![SchemaField::nullable("display_name", FieldType::String)],
        );
        let tools = toolset(warehouse);

        let datasets = tools.get("list_dataset_ids").unwrap().call(json!({})).await.unwrap();
        assert_eq!(datasets, json!(["rmi"]));

        let tables = tools
            .get("list_table_ids")
            .unwrap()
            .call(json!({"dataset_id": "rmi"}))
            .await
            .unwrap();
        assert_eq!(tables, json!(["recent_roads_data"]));

        let info = tools
            .get("get_table_info")
            .unwrap()
            .call(json!({"dataset_id": "rmi", "table_id": "recent_roads_data"}))
            .await
            .unwrap();
        assert_eq!(info["schema"]["fields"][0]["name"], "display_name");

        let other_project = tools
            .get("list_dataset_ids")
            .unwrap()
            .call(json!({"project_id": "elsewhere"}))
            .await;
        assert!(other_project.is_err());
    }
}
