use anyhow::Context;
use imagery_core::logging;
use imagery_height_analyzer::{router, AppState, Config};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_from_env();

    let config = Config::from_env().context("loading configuration")?;
    let state = AppState::connect(config.pipeline)?.with_model_name(config.model_name);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(model = %state.model_name, "Height analyzer listening on {}", bind_addr);

    axum::serve(listener, router(Arc::new(state))).await?;
    Ok(())
}
