//! The `shard` and `cleanup` commands.
//!
//! `shard` asks the batch processor for a fresh queue, wires a per-run topic
//! to this service's push endpoint and publishes one message per shard of the
//! source query. Each run is identified by the last `-` segment of its queue id.

use imagery_core::{query, PipelineConfig, ShardMessage};
use imagery_gcp::{GcpError, MessageBus, Warehouse};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ShardError {
    #[error(transparent)]
    Gcp(#[from] GcpError),

    #[error(transparent)]
    Config(#[from] imagery_core::ConfigError),

    #[error("count query returned no total_rows")]
    MissingCount,

    #[error("writing env file: {0}")]
    EnvFile(#[from] std::io::Error),

    #[error("reading env file: {0}")]
    DotEnv(#[from] dotenv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Last `-`-separated segment of a queue id.
pub fn run_id(task_queue_id: &str) -> &str {
    task_queue_id.rsplit('-').next().unwrap_or(task_queue_id)
}

pub fn topic_id(config: &PipelineConfig, run_id: &str) -> String {
    format!("{}{}", config.populate_topic_prefix, run_id)
}

pub fn subscription_id(config: &PipelineConfig, run_id: &str) -> String {
    format!("{}{}", config.subscription_prefix, run_id)
}

/// Append `TASK_QUEUE_ID` and `RUN_ID` to a dotenv file.
pub fn append_env(path: &Path, task_queue_id: &str, run_id: &str) -> Result<(), ShardError> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    write!(file, "\nTASK_QUEUE_ID={}\nRUN_ID={}", task_queue_id, run_id)?;
    Ok(())
}

/// Parse a dotenv file. Later assignments of a key override earlier ones, so
/// the most recent `shard` run wins. A missing file reads as empty.
pub fn read_env(path: &Path) -> Result<BTreeMap<String, String>, ShardError> {
    let mut vars = BTreeMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    for item in dotenv::from_path_iter(path)? {
        let (key, value) = item?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Export the variables of a dotenv file that the process does not already
/// have. Returns how many were exported.
pub fn load_env(path: &Path) -> Result<usize, ShardError> {
    let mut exported = 0;
    for (key, value) in read_env(path)? {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
            exported += 1;
        }
    }
    Ok(exported)
}

/// `RUN_ID` recorded in a dotenv file by the last `shard` run.
pub fn saved_run_id(path: &Path) -> Result<Option<String>, ShardError> {
    Ok(read_env(path)?
        .remove("RUN_ID")
        .filter(|id| !id.trim().is_empty()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPlan {
    pub run_id: String,
    pub topic: String,
    pub subscription: String,
    pub total_rows: u64,
    pub shards: Vec<ShardMessage>,
}

fn total_rows(rows: &[Value]) -> Option<u64> {
    let value = rows.first()?.get("total_rows")?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Count the source, create the run's topic and push subscription, and
/// publish every shard.
pub async fn publish_shards(
    config: &PipelineConfig,
    warehouse: &dyn Warehouse,
    bus: &dyn MessageBus,
    task_queue_id: &str,
) -> Result<ShardPlan, ShardError> {
    let push_endpoint = config.require_populate_service_url()?;
    let service_account = config.require_service_account()?;
    let run_id = run_id(task_queue_id).to_string();

    let counted = warehouse
        .query(&query::count_query(&config.source_table_id(), &config.asset_class))
        .await?;
    let total_rows = total_rows(&counted).ok_or(ShardError::MissingCount)?;
    info!(total_rows, "Counted source assets");

    let topic = topic_id(config, &run_id);
    let subscription = subscription_id(config, &run_id);
    bus.create_topic(&topic).await?;
    info!(%topic, "Created topic");
    bus.create_push_subscription(&subscription, &topic, push_endpoint, Some(service_account))
        .await?;
    info!(%subscription, endpoint = push_endpoint, "Created push subscription");

    let mut shards = Vec::new();
    for offset in query::shard_offsets(total_rows, config.shard_size) {
        let message = ShardMessage {
            limit: config.shard_size,
            offset,
            task_queue_id: task_queue_id.to_string(),
        };
        let id = bus.publish(&topic, &serde_json::to_vec(&message)?).await?;
        info!(offset, message_id = %id, "Published shard");
        shards.push(message);
    }

    Ok(ShardPlan {
        run_id,
        topic,
        subscription,
        total_rows,
        shards,
    })
}

/// Delete the subscription and topic of a run. Resources already gone are
/// skipped.
pub async fn cleanup(config: &PipelineConfig, bus: &dyn MessageBus, run_id: &str) -> Result<(), ShardError> {
    let subscription = subscription_id(config, run_id);
    match bus.delete_subscription(&subscription).await {
        Ok(()) => info!(%subscription, "Deleted subscription"),
        Err(e) if e.is_not_found() => warn!(%subscription, "Subscription not found"),
        Err(e) => return Err(e.into()),
    }

    let topic = topic_id(config, run_id);
    match bus.delete_topic(&topic).await {
        Ok(()) => info!(%topic, "Deleted topic"),
        Err(e) if e.is_not_found() => warn!(%topic, "Topic not found"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagery_gcp::mock::{MockMessageBus, MockWarehouse};
    use serde_json::json;

    fn config() -> PipelineConfig {
        PipelineConfig {
            project: "demo".to_string(),
            shard_size: 2,
            populate_service_url: Some("https://populate.run.app".to_string()),
            service_account_email: Some("runner@demo".to_string()),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_run_id() {
        assert_eq!(
            run_id("image-analysis-queue-0b4b7c39-3e2c-4a5e-9d6f-1a2b3c4d5e6f"),
            "1a2b3c4d5e6f"
        );
        assert_eq!(run_id("plain"), "plain");
    }

    #[test]
    fn test_append_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "SERVICE_URL=https://svc").unwrap();

        append_env(&path, "queue-abc", "abc").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "SERVICE_URL=https://svc\nTASK_QUEUE_ID=queue-abc\nRUN_ID=abc"
        );
    }

    #[test]
    fn test_read_env_keeps_latest_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "GCP_PROJECT=demo").unwrap();

        append_env(&path, "queue-first", "first").unwrap();
        append_env(&path, "queue-second", "second").unwrap();

        let vars = read_env(&path).unwrap();
        assert_eq!(vars["GCP_PROJECT"], "demo");
        assert_eq!(vars["TASK_QUEUE_ID"], "queue-second");
        assert_eq!(saved_run_id(&path).unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_missing_env_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.env");

        assert!(read_env(&path).unwrap().is_empty());
        assert_eq!(saved_run_id(&path).unwrap(), None);
        assert_eq!(load_env(&path).unwrap(), 0);
    }

    #[test]
    fn test_load_env_keeps_process_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "SHARD_POPULATOR_TEST_FRESH=from-file\nSHARD_POPULATOR_TEST_SET=from-file\n",
        )
        .unwrap();
        std::env::set_var("SHARD_POPULATOR_TEST_SET", "from-process");

        assert_eq!(load_env(&path).unwrap(), 1);
        assert_eq!(std::env::var("SHARD_POPULATOR_TEST_FRESH").unwrap(), "from-file");
        assert_eq!(std::env::var("SHARD_POPULATOR_TEST_SET").unwrap(), "from-process");
    }

    #[tokio::test]
    async fn test_cleanup_uses_run_saved_by_shard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let warehouse = MockWarehouse::with_rows(vec![json!({ "asset_id": 1 })]);
        let bus = MockMessageBus::new();

        let queue = "image-analysis-queue-x-run7";
        let plan = publish_shards(&config(), &warehouse, &bus, queue).await.unwrap();
        append_env(&path, queue, &plan.run_id).unwrap();
        assert_eq!(bus.topics().len(), 1);

        let run = saved_run_id(&path).unwrap().unwrap();
        cleanup(&config(), &bus, &run).await.unwrap();

        assert!(bus.topics().is_empty());
        assert!(bus.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_publish_shards() {
        let rows = (0..5).map(|i| json!({ "asset_id": i })).collect();
        let warehouse = MockWarehouse::with_rows(rows);
        let bus = MockMessageBus::new();

        let plan = publish_shards(&config(), &warehouse, &bus, "image-analysis-queue-x-run1")
            .await
            .unwrap();

        assert_eq!(plan.run_id, "run1");
        assert_eq!(plan.topic, "populate-tasks-topic-run1");
        assert_eq!(plan.total_rows, 5);
        let offsets: Vec<u64> = plan.shards.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 2, 4]);

        let subscription = &bus.subscriptions()["populate-tasks-sub-run1"];
        assert_eq!(subscription.topic, "populate-tasks-topic-run1");
        assert_eq!(subscription.push_endpoint, "https://populate.run.app");
        assert_eq!(subscription.oidc_service_account.as_deref(), Some("runner@demo"));

        let published = bus.published();
        assert_eq!(published.len(), 3);
        let last: ShardMessage = serde_json::from_slice(&published[2].1).unwrap();
        assert_eq!(
            last,
            ShardMessage {
                limit: 2,
                offset: 4,
                task_queue_id: "image-analysis-queue-x-run1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_publish_requires_push_endpoint() {
        let config = PipelineConfig {
            populate_service_url: None,
            ..config()
        };
        let err = publish_shards(&config, &MockWarehouse::new(), &MockMessageBus::new(), "q-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ShardError::Config(_)));
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let bus = MockMessageBus::new();
        bus.create_topic("populate-tasks-topic-r").await.unwrap();
        bus.create_push_subscription("populate-tasks-sub-r", "populate-tasks-topic-r", "https://x", None)
            .await
            .unwrap();

        cleanup(&config(), &bus, "r").await.unwrap();
        assert!(bus.topics().is_empty());
        assert!(bus.subscriptions().is_empty());
        cleanup(&config(), &bus, "r").await.unwrap();
    }
}
