//! Export of observation images as a Vertex AI managed-dataset import file.
//!
//! Each JSONL line is either `{"imageGcsUri": ...}` (unlabelled) or carries
//! `classificationAnnotations` built from the distinct asset types seen on
//! that image (multi-label classification).

use crate::error::GcpResult;
use crate::traits::{ObjectStore, Warehouse};
use imagery_core::query;
use rand::distributions::Uniform;
use rand::Rng;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

pub const JSONL_CONTENT_TYPE: &str = "application/jsonl";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub table_id: String,
    pub dataset_name: String,
    pub bucket_name: String,
    pub gcs_folder: String,
    pub limit: u64,
    pub include_labels: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub local_path: PathBuf,
    pub records: usize,
    /// `None` when nothing was written and the upload was skipped.
    pub gcs_uri: Option<String>,
}

/// `<dataset>_<limit>_<four random lowercase letters>.jsonl`
pub fn output_filename<R: Rng>(dataset_name: &str, limit: u64, rng: &mut R) -> String {
    let suffix: String = rng
        .sample_iter(Uniform::new_inclusive(b'a', b'z'))
        .take(4)
        .map(char::from)
        .collect();
    format!("{}_{}_{}.jsonl", dataset_name, limit, suffix)
}

/// Object name inside the bucket; an empty folder puts the file at the root.
pub fn object_name(gcs_folder: &str, filename: &str) -> String {
    let folder = gcs_folder.trim_matches('/');
    if folder.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", folder, filename)
    }
}

/// Turn query rows into import records. Labelled rows with no label are dropped.
pub fn import_records(rows: &[Value], include_labels: bool) -> Vec<Value> {
    rows.iter()
        .filter_map(|row| {
            let uri = row.get("gcs_uri").and_then(Value::as_str)?;
            if !include_labels {
                return Some(json!({ "imageGcsUri": uri }));
            }
            let annotations: Vec<Value> = row
                .get("labels")
                .and_then(Value::as_array)
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|label| !label.is_empty())
                        .map(|label| json!({ "displayName": label }))
                        .collect()
                })
                .unwrap_or_default();
            if annotations.is_empty() {
                return None;
            }
            Some(json!({
                "imageGcsUri": uri,
                "classificationAnnotations": annotations,
            }))
        })
        .collect()
}

fn to_jsonl(records: &[Value]) -> GcpResult<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Query, write `dir/<filename>` and upload it unless it is empty.
pub async fn export_dataset(
    warehouse: &dyn Warehouse,
    store: &dyn ObjectStore,
    options: &ExportOptions,
    dir: &Path,
    filename: &str,
) -> anyhow::Result<ExportSummary> {
    info!(table = %options.table_id, limit = options.limit, "Querying image URIs");
    let sql = query::export_query(&options.table_id, options.include_labels, Some(options.limit));
    let rows = warehouse.query(&sql).await?;

    let records = import_records(&rows, options.include_labels);
    let body = to_jsonl(&records)?;
    let local_path = dir.join(filename);
    tokio::fs::write(&local_path, &body).await?;
    info!(path = %local_path.display(), records = records.len(), "Wrote import file");

    if records.is_empty() {
        info!("No records found, skipping upload");
        return Ok(ExportSummary {
            local_path,
            records: 0,
            gcs_uri: None,
        });
    }

    let name = object_name(&options.gcs_folder, filename);
    let uri = store
        .upload(&options.bucket_name, &name, body, JSONL_CONTENT_TYPE)
        .await?;
    Ok(ExportSummary {
        local_path,
        records: records.len(),
        gcs_uri: Some(uri),
    })
}
