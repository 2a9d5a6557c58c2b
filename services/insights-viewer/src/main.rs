use anyhow::Context;
use imagery_core::logging;
use imagery_insights_viewer::{router, Config};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_from_env();

    let config = Config::from_env().context("loading configuration")?;
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(root = %config.root.display(), "Insights viewer listening on {}", bind_addr);

    axum::serve(listener, router(&config.root)).await?;
    Ok(())
}
