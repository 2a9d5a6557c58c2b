use imagery_core::ConfigError;
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Directory holding `templates/`, `static/` and `data/`.
    pub root: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("PORT must be a port number, got '{}'", v)))?,
            Err(_) => 8080,
        };
        let root = env::var("VIEWER_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")));
        if !root.join("templates").is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "{} has no templates directory",
                root.display()
            )));
        }
        Ok(Config { port, root })
    }
}
