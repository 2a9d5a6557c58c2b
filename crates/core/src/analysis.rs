//! Turning a model answer into a results row.

use crate::profile::{AnalysisProfile, BASE_FIELDS};
use crate::types::ProcessRequest;
use serde_json::{json, Map, Value};

/// Recorded in place of an answer that is not a JSON object.
pub const INVALID_MODEL_JSON: &str = "Invalid JSON response from model.";

/// Strip whitespace and markdown code fences from a model answer.
pub fn clean_model_text(text: &str) -> String {
    text.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse a model answer into a JSON object.
///
/// Anything that is not a JSON object becomes `{"error": INVALID_MODEL_JSON}`.
pub fn parse_analysis(text: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(&clean_model_text(text)) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("error".to_string(), json!(INVALID_MODEL_JSON));
            map
        }
    }
}

/// Base asset fields followed by every answer field of `profile`.
///
/// Answer fields missing from `analysis` are written as `null`; keys of
/// `analysis` outside the schema are dropped.
pub fn build_result_row(
    profile: AnalysisProfile,
    request: &ProcessRequest,
    analysis: &Map<String, Value>,
) -> Value {
    let mut row = Map::new();
    row.insert("asset_id".to_string(), json!(request.asset_id));
    row.insert("location".to_string(), json!(request.location));
    row.insert("detection_time".to_string(), json!(request.detection_time));
    row.insert("observation_ids".to_string(), json!(request.observation_ids()));
    row.insert("gcs_uris".to_string(), json!(request.gcs_uris()));

    for field in profile.schema() {
        if BASE_FIELDS.contains(&field.name.as_str()) {
            continue;
        }
        let value = analysis.get(&field.name).cloned().unwrap_or(Value::Null);
        row.insert(field.name, value);
    }

    Value::Object(row)
}
