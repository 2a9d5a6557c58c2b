use imagery_core::PipelineConfig;
use imagery_gcp::{default_client, BigQueryClient, GcpResult, GenerativeModel, VertexClient, Warehouse};
use std::sync::Arc;

pub const DEFAULT_HEIGHT_MODEL: &str = "gemini-2.5-pro";

/// Observation images measured per request.
pub const URI_LIMIT: u64 = 10;

pub struct AppState {
    pub config: PipelineConfig,
    pub model_name: String,
    pub warehouse: Arc<dyn Warehouse>,
    pub model: Arc<dyn GenerativeModel>,
}

impl AppState {
    pub fn new(config: PipelineConfig, warehouse: Arc<dyn Warehouse>, model: Arc<dyn GenerativeModel>) -> Self {
        AppState {
            config,
            model_name: DEFAULT_HEIGHT_MODEL.to_string(),
            warehouse,
            model,
        }
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn connect(config: PipelineConfig) -> GcpResult<Self> {
        let http = default_client()?;
        let warehouse = Arc::new(BigQueryClient::new(http.clone(), &config.project));
        let model = Arc::new(VertexClient::new(http, &config.project, &config.location));
        Ok(Self::new(config, warehouse, model))
    }
}
