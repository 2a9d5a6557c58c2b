use anyhow::Context;
use imagery_batch_processor::{router, AppState, Config};
use imagery_core::logging;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_from_env();

    let config = Config::from_env().context("loading configuration")?;
    let state = Arc::new(AppState::connect(config.pipeline.clone())?);
    let app = router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        profile = %config.pipeline.profile,
        project = %config.pipeline.project,
        "Batch processor listening on {}",
        bind_addr
    );

    axum::serve(listener, app).await?;
    Ok(())
}
