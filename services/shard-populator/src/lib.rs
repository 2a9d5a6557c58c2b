//! Parallel task population through Pub/Sub.
//!
//! The local `shard` command publishes one message per window of the source
//! query; Pub/Sub pushes each to this service, which enqueues the window's
//! assets on the batch processor's queue.

pub mod handlers;
pub mod shard;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(handlers::receive_shard))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
