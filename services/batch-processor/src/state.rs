use imagery_core::PipelineConfig;
use imagery_gcp::{
    default_client, BigQueryClient, CloudTasksClient, GcpResult, GenerativeModel, TaskQueue,
    VertexClient, Warehouse,
};
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub config: PipelineConfig,
    pub warehouse: Arc<dyn Warehouse>,
    pub tasks: Arc<dyn TaskQueue>,
    pub model: Arc<dyn GenerativeModel>,
}

impl AppState {
    pub fn new(
        config: PipelineConfig,
        warehouse: Arc<dyn Warehouse>,
        tasks: Arc<dyn TaskQueue>,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        AppState {
            config,
            warehouse,
            tasks,
            model,
        }
    }

    /// Clients for the real services, authenticated with the ambient identity.
    pub fn connect(config: PipelineConfig) -> GcpResult<Self> {
        let http = default_client()?;
        let warehouse = Arc::new(BigQueryClient::new(http.clone(), &config.project));
        let tasks = Arc::new(CloudTasksClient::new(http.clone(), &config.project, &config.location));
        let model = Arc::new(VertexClient::new(http, &config.project, &config.location));
        Ok(Self::new(config, warehouse, tasks, model))
    }

    /// How long a fresh queue is given before tasks are added to it.
    pub fn queue_settle(&self) -> Duration {
        Duration::from_secs(self.config.queue_settle_secs)
    }
}
