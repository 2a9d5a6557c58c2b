use imagery_core::PipelineConfig;
use imagery_gcp::{default_client, BigQueryClient, CloudTasksClient, GcpResult, TaskQueue, Warehouse};
use std::sync::Arc;

pub struct AppState {
    pub config: PipelineConfig,
    pub warehouse: Arc<dyn Warehouse>,
    pub tasks: Arc<dyn TaskQueue>,
}

impl AppState {
    pub fn new(config: PipelineConfig, warehouse: Arc<dyn Warehouse>, tasks: Arc<dyn TaskQueue>) -> Self {
        AppState {
            config,
            warehouse,
            tasks,
        }
    }

    pub fn connect(config: PipelineConfig) -> GcpResult<Self> {
        let http = default_client()?;
        let warehouse = Arc::new(BigQueryClient::new(http.clone(), &config.project));
        let tasks = Arc::new(CloudTasksClient::new(http, &config.project, &config.location));
        Ok(Self::new(config, warehouse, tasks))
    }
}
