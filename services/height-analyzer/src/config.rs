use imagery_core::{ConfigError, PipelineConfig};
use std::env;

use crate::state::DEFAULT_HEIGHT_MODEL;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub model_name: String,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::with_lookup(PipelineConfig::load()?, |key| env::var(key).ok())
    }

    /// Read `PORT` and `HEIGHT_MODEL` through `lookup`. Unset or blank values
    /// fall back to the defaults; a `PORT` that is set must parse.
    pub fn with_lookup<F>(pipeline: PipelineConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(v) => v.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("PORT must be a port number, got '{}'", v))
            })?,
            None => 8080,
        };
        let model_name = get("HEIGHT_MODEL").unwrap_or_else(|| DEFAULT_HEIGHT_MODEL.to_string());

        Ok(Config {
            port,
            model_name,
            pipeline,
        })
    }
}
