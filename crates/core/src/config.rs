//! Configuration management for the imagery pipeline.
//!
//! Configuration is a TOML document (all fields optional except `project`)
//! overlaid with environment variables, so the same binary runs locally with a
//! file and on Cloud Run with only env vars set.

use crate::profile::AnalysisProfile;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// A BigQuery dataset/table pair inside the configured project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// `project.dataset.table`
    pub fn qualified(&self, project: &str) -> String {
        format!("{}.{}.{}", project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub project: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_source")]
    pub source: TableRef,
    #[serde(default = "default_results")]
    pub results: TableRef,
    #[serde(default = "default_asset_class")]
    pub asset_class: String,
    #[serde(default)]
    pub profile: AnalysisProfile,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_task_queue_prefix")]
    pub task_queue_prefix: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_shard_size")]
    pub shard_size: u64,
    #[serde(default = "default_topic_prefix")]
    pub populate_topic_prefix: String,
    #[serde(default = "default_subscription_prefix")]
    pub subscription_prefix: String,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub populate_service_url: Option<String>,
    #[serde(default)]
    pub service_account_email: Option<String>,
    #[serde(default = "default_queue_settle_secs")]
    pub queue_settle_secs: u64,
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_source() -> TableRef {
    TableRef::new("imagery_insights___preview___us", "latest_observations")
}

fn default_results() -> TableRef {
    TableRef::new("imagery_insights_analysis", "utility_pole_evaluations")
}

fn default_asset_class() -> String {
    "ASSET_CLASS_UTILITY_POLE".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_task_queue_prefix() -> String {
    "image-analysis-queue-".to_string()
}

fn default_batch_size() -> u64 {
    100
}

fn default_shard_size() -> u64 {
    1000
}

fn default_topic_prefix() -> String {
    "populate-tasks-topic-".to_string()
}

fn default_subscription_prefix() -> String {
    "populate-tasks-sub-".to_string()
}

fn default_queue_settle_secs() -> u64 {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            location: default_location(),
            source: default_source(),
            results: default_results(),
            asset_class: default_asset_class(),
            profile: AnalysisProfile::default(),
            model: default_model(),
            task_queue_prefix: default_task_queue_prefix(),
            batch_size: default_batch_size(),
            shard_size: default_shard_size(),
            populate_topic_prefix: default_topic_prefix(),
            subscription_prefix: default_subscription_prefix(),
            service_url: None,
            populate_service_url: None,
            service_account_email: None,
            queue_settle_secs: default_queue_settle_secs(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document.
    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load from a TOML file, overlay the process environment and validate.
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `IMAGERY_CONFIG` when set, otherwise from the environment only.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("IMAGERY_CONFIG") {
            #[cfg(feature = "toml")]
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Self::from_env(),
        }
    }

    /// Overlay settings from a key lookup; empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GCP_PROJECT").or_else(|| get("GOOGLE_CLOUD_PROJECT")) {
            self.project = v;
        }
        if let Some(v) = get("GCP_LOCATION") {
            self.location = v;
        }
        if let Some(v) = get("BIGQUERY_SOURCE_DATASET") {
            self.source.dataset = v;
        }
        if let Some(v) = get("BIGQUERY_SOURCE_TABLE") {
            self.source.table = v;
        }
        if let Some(v) = get("BIGQUERY_RESULTS_DATASET") {
            self.results.dataset = v;
        }
        if let Some(v) = get("BIGQUERY_RESULTS_TABLE") {
            self.results.table = v;
        }
        if let Some(v) = get("ASSET_CLASS") {
            self.asset_class = v;
        }
        if let Some(v) = get("ANALYSIS_PROFILE") {
            self.profile = AnalysisProfile::from_str(&v).map_err(ConfigError::ValidationError)?;
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("TASK_QUEUE_PREFIX") {
            self.task_queue_prefix = v;
        }
        if let Some(v) = get("BATCH_SIZE") {
            self.batch_size = parse_number("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("SHARD_SIZE") {
            self.shard_size = parse_number("SHARD_SIZE", &v)?;
        }
        if let Some(v) = get("POPULATE_TOPIC_ID_PREFIX") {
            self.populate_topic_prefix = v;
        }
        if let Some(v) = get("SUBSCRIPTION_ID_PREFIX") {
            self.subscription_prefix = v;
        }
        if let Some(v) = get("SERVICE_URL") {
            self.service_url = Some(v);
        }
        if let Some(v) = get("POPULATE_SERVICE_URL") {
            self.populate_service_url = Some(v);
        }
        if let Some(v) = get("SERVICE_ACCOUNT_EMAIL") {
            self.service_account_email = Some(v);
        }
        if let Some(v) = get("QUEUE_SETTLE_SECS") {
            self.queue_settle_secs = parse_number("QUEUE_SETTLE_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.trim().is_empty() {
            return Err(ConfigError::Missing("project (GCP_PROJECT)"));
        }
        if !is_project_id(&self.project) {
            return Err(ConfigError::ValidationError(format!(
                "project id '{}' contains unsupported characters",
                self.project
            )));
        }
        for (label, value) in [
            ("source dataset", &self.source.dataset),
            ("source table", &self.source.table),
            ("results dataset", &self.results.dataset),
            ("results table", &self.results.table),
        ] {
            if !is_identifier(value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} '{}' is not a valid BigQuery identifier",
                    label, value
                )));
            }
        }
        if self.asset_class.is_empty()
            || !self
                .asset_class
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ConfigError::ValidationError(format!(
                "asset class '{}' must match [A-Z0-9_]+",
                self.asset_class
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.shard_size == 0 {
            return Err(ConfigError::ValidationError(
                "shard_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn source_table_id(&self) -> String {
        self.source.qualified(&self.project)
    }

    pub fn results_table_id(&self) -> String {
        self.results.qualified(&self.project)
    }

    pub fn require_service_url(&self) -> Result<&str, ConfigError> {
        self.service_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .ok_or(ConfigError::Missing("service_url (SERVICE_URL)"))
    }

    pub fn require_populate_service_url(&self) -> Result<&str, ConfigError> {
        self.populate_service_url
            .as_deref()
            .ok_or(ConfigError::Missing(
                "populate_service_url (POPULATE_SERVICE_URL)",
            ))
    }

    pub fn require_service_account(&self) -> Result<&str, ConfigError> {
        self.service_account_email
            .as_deref()
            .ok_or(ConfigError::Missing(
                "service_account_email (SERVICE_ACCOUNT_EMAIL)",
            ))
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{} must be an integer, got '{}'", key, value)))
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_project_id(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c == ':')
}
