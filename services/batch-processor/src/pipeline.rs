//! Enqueueing assets and analysing one asset.
//!
//! Shared by the HTTP handlers of this service and by the shard populator,
//! which fans the same enqueue step out over Pub/Sub.

use imagery_core::{
    build_result_row, parse_analysis, query, ConfigError, CoreError, PipelineConfig,
    ProcessRequest,
};
use imagery_gcp::{
    GcpError, GenerateContentRequest, GenerativeModel, HttpTask, InsertError, Part, TaskQueue,
    Warehouse,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Gcp(#[from] GcpError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Row(#[from] CoreError),

    #[error("model returned no text for asset {0}")]
    EmptyModelResponse(String),

    #[error("BigQuery insert errors: {0:?}")]
    Insert(Vec<InsertError>),
}

/// Query `limit` assets starting at `offset` and enqueue one `/process` task
/// per asset on `queue_id`. Returns the number of tasks created.
pub async fn enqueue_assets(
    config: &PipelineConfig,
    warehouse: &dyn Warehouse,
    tasks: &dyn TaskQueue,
    queue_id: &str,
    limit: u64,
    offset: u64,
) -> Result<usize, PipelineError> {
    let process_url = format!("{}/process", config.require_service_url()?);
    let service_account = config.require_service_account()?;

    let sql = query::paged(
        &query::source_query(&config.source_table_id(), &config.asset_class),
        limit,
        offset,
    );
    let rows = warehouse.query(&sql).await?;
    debug!(rows = rows.len(), offset, "Fetched source window");

    let mut created = 0;
    for row in &rows {
        let payload = ProcessRequest::from_row(row)?;
        let task = HttpTask::json(&process_url, &payload)?.with_oidc(service_account);
        tasks.create_http_task(queue_id, &task).await?;
        created += 1;
    }

    info!(queue = queue_id, offset, tasks_created = created, "Enqueued assets");
    Ok(created)
}

/// Ask the model about every observation of one asset and store the answer.
pub async fn process_asset(
    config: &PipelineConfig,
    warehouse: &dyn Warehouse,
    model: &dyn GenerativeModel,
    request: &ProcessRequest,
) -> Result<(), PipelineError> {
    info!(asset_id = %request.asset_id, observations = request.observations.len(), "Processing asset");

    let mut parts: Vec<Part> = request
        .observations
        .iter()
        .map(|o| Part::jpeg(&o.gcs_uri))
        .collect();
    parts.push(Part::text(config.profile.prompt()));

    let response = model
        .generate(&config.model, &GenerateContentRequest::from_parts(parts))
        .await?;
    let text = response
        .text()
        .ok_or_else(|| PipelineError::EmptyModelResponse(request.asset_id.clone()))?;
    debug!(asset_id = %request.asset_id, response = %text, "Raw model response");

    let analysis = parse_analysis(&text);
    if analysis.contains_key("error") {
        warn!(asset_id = %request.asset_id, error = ?analysis.get("error"), "Model reported an error");
    }

    let row = build_result_row(config.profile, request, &analysis);
    let errors = warehouse.insert_rows(&config.results, &[row]).await?;
    if !errors.is_empty() {
        return Err(PipelineError::Insert(errors));
    }
    Ok(())
}
