//! Batch image analysis over the task-queue callback pattern.
//!
//! `/setup` creates the results table and a queue, `/populate` turns a window
//! of source assets into queued `/process` calls, `/process` asks the model
//! about one asset and writes the answer back, `/teardown` removes both
//! resources again.

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use pipeline::{enqueue_assets, process_asset, PipelineError};
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/setup", post(handlers::setup))
        .route("/populate", post(handlers::populate))
        .route("/process", post(handlers::process))
        .route("/teardown", get(handlers::teardown).post(handlers::teardown))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests;
