//! End-to-end flows across the services, run against the in-memory GCP fakes.
//!
//! - setup, populate and task dispatch through the batch processor
//! - sharded population through Pub/Sub push delivery
//! - the warehouse agent reading pipeline results

pub mod test_utils;

#[cfg(test)]
mod pipeline_flow_tests;

#[cfg(test)]
mod shard_flow_tests;

#[cfg(test)]
mod agent_flow_tests;
