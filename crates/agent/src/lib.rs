//! Conversational assistant over Roads Management Insights data in BigQuery.
//!
//! A user-facing agent (`RMI_agent`) plans and summarizes; it delegates every
//! data question to a SQL sub-agent (`bigquery_agent`) that can inspect
//! datasets and run read-only queries.

pub mod agent;
pub mod error;
pub mod prompts;
pub mod tool;
pub mod warehouse_tools;

pub use agent::{Agent, AgentTool};
pub use error::{AgentError, AgentResult};
pub use tool::{Tool, ToolSet};
pub use warehouse_tools::warehouse_toolset;

use chrono::NaiveDate;
use imagery_gcp::{GenerationConfig, GenerativeModel, ThinkingConfig, Warehouse};
use std::sync::Arc;

pub const ROOT_AGENT_NAME: &str = "RMI_agent";
pub const BQ_AGENT_NAME: &str = "bigquery_agent";
pub const DEFAULT_AGENT_MODEL: &str = "gemini-3-flash-preview";

/// Runtime settings of the agent pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub project: String,
    /// Vertex AI location; preview models are served from `global`.
    pub location: String,
    pub dataset: Option<String>,
    pub model: String,
}

impl AgentSettings {
    /// Read `GOOGLE_CLOUD_PROJECT`, `GOOGLE_CLOUD_LOCATION`, `RMI_DATASET` and
    /// `AGENT_MODEL` through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> AgentResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let project = get("GOOGLE_CLOUD_PROJECT")
            .or_else(|| get("GCP_PROJECT"))
            .ok_or_else(|| AgentError::Config("GOOGLE_CLOUD_PROJECT is not set".to_string()))?;
        Ok(Self {
            project,
            location: get("GOOGLE_CLOUD_LOCATION").unwrap_or_else(|| "global".to_string()),
            dataset: get("RMI_DATASET"),
            model: get("AGENT_MODEL").unwrap_or_else(|| DEFAULT_AGENT_MODEL.to_string()),
        })
    }

    pub fn from_env() -> AgentResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// The SQL sub-agent with the read-only warehouse tools.
pub fn bigquery_agent(
    settings: &AgentSettings,
    model: Arc<dyn GenerativeModel>,
    warehouse: Arc<dyn Warehouse>,
) -> Agent {
    Agent::new(BQ_AGENT_NAME, model, settings.model.clone())
        .with_description("Agent to answer questions about BigQuery data and execute SQL queries.")
        .with_instruction(prompts::BQ_AGENT_PROMPT)
        .with_tools(warehouse_toolset(warehouse, settings.project.clone()))
}

/// The user-facing agent, delegating to [`bigquery_agent`].
pub fn root_agent(
    settings: &AgentSettings,
    model: Arc<dyn GenerativeModel>,
    warehouse: Arc<dyn Warehouse>,
    today: NaiveDate,
) -> Agent {
    let sub_agent = Arc::new(bigquery_agent(settings, model.clone(), warehouse));
    Agent::new(ROOT_AGENT_NAME, model, settings.model.clone())
        .with_description("Agent to answer questions about RMI data residing in BigQuery.")
        .with_instruction(prompts::rmi_agent_prompt(
            &settings.project,
            settings.dataset.as_deref(),
            today,
        ))
        .with_generation_config(GenerationConfig {
            thinking_config: Some(ThinkingConfig {
                include_thoughts: Some(true),
                thinking_level: Some("MEDIUM".to_string()),
                thinking_budget: None,
            }),
            ..GenerationConfig::default()
        })
        .with_tools(ToolSet::new().with(Arc::new(AgentTool::new(sub_agent))))
}
