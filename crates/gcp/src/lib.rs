//! Google Cloud clients for the imagery insights pipeline.
//!
//! Thin REST clients for BigQuery, Cloud Tasks, Pub/Sub, Vertex AI and Cloud
//! Storage, each behind a trait from [`traits`] so the services can be driven
//! by the in-memory doubles in [`mock`] under test.

pub mod auth;
pub mod bigquery;
pub mod dataset;
pub mod error;
pub mod http;
pub mod mock;
pub mod pubsub;
pub mod storage;
pub mod tasks;
pub mod traits;
pub mod vertex;

pub use auth::{default_token_source, MetadataTokenSource, StaticTokenSource, TokenSource};
pub use bigquery::BigQueryClient;
pub use error::{GcpError, GcpResult};
pub use http::AuthorizedClient;
pub use pubsub::PubSubClient;
pub use storage::StorageClient;
pub use tasks::CloudTasksClient;
pub use traits::{
    GenerativeModel, HttpTask, InsertError, MessageBus, ObjectStore, TaskQueue, Warehouse,
};
pub use vertex::{
    Content, FunctionCall, FunctionDeclaration, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part, ThinkingConfig, Tool, VertexClient,
};

/// Authorized HTTP client using the ambient credentials.
pub fn default_client() -> GcpResult<AuthorizedClient> {
    AuthorizedClient::new(default_token_source())
}
