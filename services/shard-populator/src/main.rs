use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use imagery_batch_processor::client::ProcessorClient;
use imagery_core::{logging, PipelineConfig};
use imagery_gcp::{default_client, BigQueryClient, PubSubClient};
use imagery_shard_populator::{router, shard, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "shard-populator", about = "Populate the batch processor's queue in parallel shards")]
struct Cli {
    /// Dotenv file loaded at startup; `shard` appends TASK_QUEUE_ID and RUN_ID to it
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the Pub/Sub push endpoint
    Serve {
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Create a queue via /setup and publish one message per shard
    Shard,
    /// Delete the topic and subscription of a run
    Cleanup {
        /// Defaults to RUN_ID from the environment, then the last run saved in the env file
        #[arg(long)]
        run_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    shard::load_env(&cli.env_file)
        .with_context(|| format!("loading {}", cli.env_file.display()))?;
    let config = PipelineConfig::load().context("loading configuration")?;

    match cli.command {
        Command::Serve { port } => {
            logging::init_from_env();
            let state = Arc::new(AppState::connect(config)?);
            let bind_addr = format!("0.0.0.0:{}", port);
            let listener = TcpListener::bind(&bind_addr).await?;
            info!("Shard populator listening on {}", bind_addr);
            axum::serve(listener, router(state)).await?;
        }
        Command::Shard => {
            logging::init();
            let service_url = config.require_service_url()?;
            info!(service_url, "Calling /setup");
            let task_queue_id = ProcessorClient::new(service_url).setup().await?;
            let run_id = shard::run_id(&task_queue_id).to_string();
            shard::append_env(&cli.env_file, &task_queue_id, &run_id)?;
            info!(queue = %task_queue_id, run_id = %run_id, "Setup complete");

            let http = default_client()?;
            let warehouse = BigQueryClient::new(http.clone(), &config.project);
            let bus = PubSubClient::new(http, &config.project);
            let plan = shard::publish_shards(&config, &warehouse, &bus, &task_queue_id).await?;
            println!(
                "Run {}: published {} shards covering {} assets on {}",
                plan.run_id,
                plan.shards.len(),
                plan.total_rows,
                plan.topic
            );
        }
        Command::Cleanup { run_id } => {
            logging::init();
            let run_id = match run_id.or_else(|| std::env::var("RUN_ID").ok()) {
                Some(id) if !id.trim().is_empty() => id,
                _ => shard::saved_run_id(&cli.env_file)?.ok_or_else(|| {
                    anyhow!("no run id: pass --run-id, set RUN_ID or run `shard` first")
                })?,
            };
            let bus = PubSubClient::new(default_client()?, &config.project);
            shard::cleanup(&config, &bus, &run_id).await?;
            println!("Cleaned up run {}", run_id);
        }
    }
    Ok(())
}
