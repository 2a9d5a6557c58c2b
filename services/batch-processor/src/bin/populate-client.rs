//! populate-client
//!
//! Feed the batch processor batch by batch: calls `/populate` with growing
//! offsets until no more tasks are created, saving progress after each batch.

use clap::Parser;
use imagery_batch_processor::client::{run_populate, ProcessorClient, DEFAULT_STATE_FILE};
use imagery_core::logging;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "populate-client", about = "Populate the batch processor's task queue")]
struct Args {
    /// Existing task queue id; defaults to the saved one, else a new queue from /setup
    task_queue_id: Option<String>,

    /// Base URL of the batch processor service
    #[arg(long, env = "SERVICE_URL")]
    service_url: String,

    /// Assets per batch; must match the service's BATCH_SIZE
    #[arg(long, env = "BATCH_SIZE", default_value_t = 100)]
    batch_size: u64,

    /// Progress file
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    let client = ProcessorClient::new(args.service_url);
    let summary = run_populate(&client, &args.state_file, args.batch_size, args.task_queue_id).await?;

    println!(
        "Queue {}: created {} tasks, next offset {}",
        summary.task_queue_id, summary.tasks_created, summary.next_offset
    );
    Ok(())
}
