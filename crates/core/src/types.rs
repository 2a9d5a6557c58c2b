//! Asset, observation and message types exchanged between the services.

use crate::error::{CoreError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Geographic position of an asset.
///
/// Accepted either as a `{latitude, longitude}` record or as a WKT point
/// (`POINT(lon lat)`); always serialized as the record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Parse a WKT point. WKT orders coordinates longitude first.
    pub fn from_wkt(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let upper = trimmed.to_ascii_uppercase();
        let inner = upper
            .strip_prefix("POINT")
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| CoreError::InvalidLocation(trimmed.to_string()))?;

        let mut coords = inner.split_whitespace().map(str::parse::<f64>);
        match (coords.next(), coords.next(), coords.next()) {
            (Some(Ok(longitude)), Some(Ok(latitude)), None) => Ok(Self::new(latitude, longitude)),
            _ => Err(CoreError::InvalidLocation(trimmed.to_string())),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LocationRepr {
    Record { latitude: f64, longitude: f64 },
    Wkt(String),
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match LocationRepr::deserialize(deserializer)? {
            LocationRepr::Record {
                latitude,
                longitude,
            } => Ok(Location::new(latitude, longitude)),
            LocationRepr::Wkt(text) => Location::from_wkt(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// One image capture of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub observation_id: String,
    pub gcs_uri: String,
}

/// Task payload for one asset, posted by the task queue to `/process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub asset_id: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_time: Option<String>,
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl ProcessRequest {
    /// Shape a decoded source row (`asset_id`, `location`, `detection_time`,
    /// `observations`) into a task payload.
    pub fn from_row(row: &Value) -> Result<Self> {
        let asset_id = match row.get("asset_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(CoreError::MalformedRow("missing asset_id".to_string())),
        };

        let location = match row.get("location") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value::<Location>(value.clone())
                    .map_err(|e| CoreError::InvalidLocation(e.to_string()))?,
            ),
        };

        let detection_time = match row.get("detection_time") {
            None | Some(Value::Null) => None,
            Some(value) => Some(normalize_timestamp(value)?),
        };

        let observations = match row.get("observations") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                CoreError::MalformedRow(format!("observations for {}: {}", asset_id, e))
            })?,
        };

        Ok(Self {
            asset_id,
            location,
            detection_time,
            observations,
        })
    }

    pub fn observation_ids(&self) -> Vec<String> {
        self.observations
            .iter()
            .map(|o| o.observation_id.clone())
            .collect()
    }

    pub fn gcs_uris(&self) -> Vec<String> {
        self.observations.iter().map(|o| o.gcs_uri.clone()).collect()
    }
}

/// Accept RFC 3339 text or epoch seconds and return RFC 3339 in UTC.
fn normalize_timestamp(value: &Value) -> Result<String> {
    let parsed: Option<DateTime<Utc>> = match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| text.parse::<f64>().ok().and_then(from_epoch_seconds)),
        Value::Number(n) => n.as_f64().and_then(from_epoch_seconds),
        _ => None,
    };

    parsed
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .ok_or_else(|| CoreError::MalformedRow(format!("unrecognized timestamp {}", value)))
}

fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    let micros = (seconds * 1_000_000.0).round() as i64;
    Utc.timestamp_micros(micros).single()
}

/// Body of `/populate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateRequest {
    #[serde(default)]
    pub task_queue_id: Option<String>,
    #[serde(default)]
    pub offset: u64,
}

/// One shard of the source query, published on the populate topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMessage {
    pub limit: u64,
    pub offset: u64,
    pub task_queue_id: String,
}

/// Pub/Sub push delivery wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubEnvelope {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl PubSubMessage {
    /// Decode the base64 payload as JSON.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| CoreError::InvalidMessage("message has no data".to_string()))?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| CoreError::InvalidMessage(format!("bad base64: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
