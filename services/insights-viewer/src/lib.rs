//! Static viewer for exported observations.
//!
//! Pages come from `templates/`, assets from `static/` and observation JSON
//! from `data/`. Everything is served through `ServeDir`/`ServeFile`, so paths
//! cannot leave those directories.

pub mod config;

use axum::{response::Json, routing::get, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::Path;
use tower::ServiceBuilder;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

pub use config::Config;

pub const SERVICE_NAME: &str = "insights-viewer";

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": Utc::now().to_rfc3339()
    }))
}

pub fn router(root: &Path) -> Router {
    let templates = root.join("templates");
    Router::new()
        .route_service("/", ServeFile::new(templates.join("index.html")))
        .route_service("/3d_view", ServeFile::new(templates.join("3d_view.html")))
        .route("/health", get(health))
        .nest_service("/data", ServeDir::new(root.join("data")))
        .nest_service("/static", ServeDir::new(root.join("static")))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
