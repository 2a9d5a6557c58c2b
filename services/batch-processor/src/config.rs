use imagery_core::{ConfigError, PipelineConfig};
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("PORT must be a port number, got '{}'", v)))?,
            Err(_) => 8080,
        };
        Ok(Config {
            port,
            pipeline: PipelineConfig::load()?,
        })
    }
}
