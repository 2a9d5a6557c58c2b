//! vertex-dataset
//!
//! Export observation image URIs from BigQuery into a JSONL import file for a
//! Vertex AI managed image dataset, and upload it to Cloud Storage.

use anyhow::Context;
use clap::Parser;
use imagery_core::logging;
use imagery_gcp::dataset::{self, ExportOptions};
use imagery_gcp::{default_client, BigQueryClient, StorageClient};
use std::path::Path;

#[derive(Debug, Parser)]
#[command(name = "vertex-dataset", about = "Export image URIs from BigQuery to a JSONL file for Vertex AI")]
struct Args {
    /// Google Cloud project that runs the query
    #[arg(long, env = "GCP_PROJECT")]
    project_id: String,

    /// Fully qualified observations table (`project.dataset.table`)
    #[arg(long)]
    table_id: String,

    /// Dataset name, used as the output file prefix
    #[arg(long, default_value = "imagery_insights_sample")]
    dataset_name: String,

    /// Destination bucket
    #[arg(long)]
    bucket_name: String,

    /// Destination folder inside the bucket
    #[arg(long, default_value = "misc")]
    gcs_folder: String,

    /// Maximum number of images; 0 exports everything
    #[arg(long, default_value_t = 10)]
    limit: u64,

    /// Emit asset types as multi-label classification annotations
    #[arg(long)]
    include_labels: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    let http = default_client().context("building HTTP client")?;
    let warehouse = BigQueryClient::new(http.clone(), &args.project_id);
    let store = StorageClient::new(http);

    let filename = dataset::output_filename(&args.dataset_name, args.limit, &mut rand::thread_rng());
    let options = ExportOptions {
        table_id: args.table_id,
        dataset_name: args.dataset_name,
        bucket_name: args.bucket_name,
        gcs_folder: args.gcs_folder,
        limit: args.limit,
        include_labels: args.include_labels,
    };

    let summary = dataset::export_dataset(&warehouse, &store, &options, Path::new("."), &filename).await?;
    println!("Wrote {} records to {}", summary.records, summary.local_path.display());
    match summary.gcs_uri {
        Some(uri) => {
            println!("GCS URI: {}", uri);
            println!("Import this URI into a managed dataset in Vertex AI.");
        }
        None => println!("No records found. Nothing uploaded."),
    }
    Ok(())
}
