//! Core functionality for the imagery insights pipeline.
//!
//! This crate holds everything the services share that does not talk to a
//! managed service: configuration, the asset/observation model, analysis
//! profiles (prompt plus results schema), query construction and the shaping
//! of model answers into result rows. [`places`] builds the aggregate queries
//! run against the Places Insights datasets.

pub mod analysis;
pub mod config;
pub mod error;
pub mod logging;
pub mod places;
pub mod profile;
pub mod query;
pub mod types;

pub use analysis::{build_result_row, clean_model_text, parse_analysis, INVALID_MODEL_JSON};
pub use config::{ConfigError, PipelineConfig, TableRef};
pub use error::{CoreError, Result};
pub use profile::{AnalysisProfile, FieldMode, FieldType, SchemaField};
pub use types::{
    Location, Observation, PopulateRequest, ProcessRequest, PubSubEnvelope, PubSubMessage,
    ShardMessage,
};
