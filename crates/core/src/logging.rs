//! Structured logging infrastructure for the imagery services.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system with human-readable output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level.
///
/// # Example
/// ```no_run
/// use imagery_core::logging;
///
/// logging::init();
/// tracing::info!("Application started");
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(fmt::layer().with_target(true))
        .init();
}

/// Initialize the logging system with JSON output for Cloud Run.
///
/// Cloud Logging parses one JSON object per line, so services deployed there
/// should prefer this over [`init`].
///
/// # Example
/// ```no_run
/// use imagery_core::logging;
///
/// logging::init_json();
/// tracing::info!(service = "batch-processor", "Service started");
/// ```
pub fn init_json() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(fmt::layer().json().with_target(true))
        .init();
}

/// Pick the output format from `LOG_FORMAT` (`json` or anything else for text).
pub fn init_from_env() {
    if wants_json(std::env::var(LOG_FORMAT_ENV).ok().as_deref()) {
        init_json();
    } else {
        init();
    }
}

fn wants_json(value: Option<&str>) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
