//! Analysis profiles.
//!
//! A profile couples the prompt sent to the model with the schema of the
//! results table the answers land in. The base fields describe the asset and
//! are identical for every profile; the remaining fields are copied out of the
//! model's JSON answer by name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// BigQuery column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Record,
}

/// BigQuery column mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

/// One column of a table schema, in the warehouse's JSON representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub mode: FieldMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SchemaField>,
}

impl SchemaField {
    pub fn nullable(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            mode: FieldMode::Nullable,
            fields: Vec::new(),
        }
    }

    pub fn repeated(name: &str, field_type: FieldType) -> Self {
        Self {
            mode: FieldMode::Repeated,
            ..Self::nullable(name, field_type)
        }
    }

    pub fn record(name: &str, fields: Vec<SchemaField>) -> Self {
        Self {
            fields,
            ..Self::nullable(name, FieldType::Record)
        }
    }
}

/// Columns every results table starts with.
pub const BASE_FIELDS: [&str; 5] = [
    "asset_id",
    "location",
    "observation_ids",
    "gcs_uris",
    "detection_time",
];

fn base_schema() -> Vec<SchemaField> {
    vec![
        SchemaField::nullable("asset_id", FieldType::String),
        SchemaField::record(
            "location",
            vec![
                SchemaField::nullable("latitude", FieldType::Float),
                SchemaField::nullable("longitude", FieldType::Float),
            ],
        ),
        SchemaField::repeated("observation_ids", FieldType::String),
        SchemaField::repeated("gcs_uris", FieldType::String),
        SchemaField::nullable("detection_time", FieldType::Timestamp),
    ]
}

/// The analyses the batch processor can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisProfile {
    #[default]
    UtilityPole,
    RoadSigns,
    Resolution,
}

impl AnalysisProfile {
    pub const ALL: [AnalysisProfile; 3] = [
        AnalysisProfile::UtilityPole,
        AnalysisProfile::RoadSigns,
        AnalysisProfile::Resolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisProfile::UtilityPole => "utility_pole",
            AnalysisProfile::RoadSigns => "road_signs",
            AnalysisProfile::Resolution => "resolution",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            AnalysisProfile::UtilityPole => UTILITY_POLE_PROMPT,
            AnalysisProfile::RoadSigns => ROAD_SIGNS_PROMPT,
            AnalysisProfile::Resolution => RESOLUTION_PROMPT,
        }
    }

    /// Fields filled from the model's answer.
    pub fn answer_fields(&self) -> Vec<SchemaField> {
        use FieldType::{Integer, String};
        match self {
            AnalysisProfile::UtilityPole => vec![
                SchemaField::nullable("pole_condition", String),
                SchemaField::nullable("type", String),
                SchemaField::nullable("material", String),
                SchemaField::nullable("transformers", Integer),
                SchemaField::nullable("power_lines", Integer),
                SchemaField::nullable("street_lamps", Integer),
                SchemaField::nullable("junction_boxes", Integer),
                SchemaField::nullable("additional_notes", String),
            ],
            AnalysisProfile::RoadSigns => vec![
                SchemaField::nullable("category", String),
                SchemaField::nullable("sign_quality", String),
                SchemaField::nullable("description", String),
                SchemaField::nullable("image_quality_notes", String),
            ],
            AnalysisProfile::Resolution => vec![
                SchemaField::nullable("width", Integer),
                SchemaField::nullable("height", Integer),
            ],
        }
    }

    /// Full results table schema: base fields followed by the answer fields.
    pub fn schema(&self) -> Vec<SchemaField> {
        let mut schema = base_schema();
        schema.extend(self.answer_fields());
        schema
    }
}

impl fmt::Display for AnalysisProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "utility_pole" | "utility_poles" => Ok(AnalysisProfile::UtilityPole),
            "road_signs" | "road_sign" => Ok(AnalysisProfile::RoadSigns),
            "resolution" => Ok(AnalysisProfile::Resolution),
            other => Err(format!("Unknown analysis profile: {}", other)),
        }
    }
}

const UTILITY_POLE_PROMPT: &str = r#"
You will be provided with a series of photos of a utility pole.

Instructions:

1. Analyze the provided images. If the images do not clearly show a utility pole, return: {"error": "No utility pole detected in the images."}
2. Detect and count the following across all images, providing a consolidated count:
    * Transformers
    * Power lines coming from the pole
    * Street lamps attached to the pole
    * Telephone or junction boxes
3. Assess the overall condition of the pole. Look for visible damage, bird nests, or other issues. If the pole appears to be in good condition, note "OK".
4. Note the material with which the pole is made.
5. Determine the primary type of pole. Report this in the type field:
  * Street light
  * High tension power transmission
  * Electricity pole
  * Other
6. Provide your findings in the following JSON format:

```json
{
  "pole_condition": "OK/Damaged/Other Issues",
  "type": "<pole_type>",
  "material": "<material>",
  "transformers": <number_of_transformers>,
  "power_lines": <number_of_power_lines>,
  "street_lamps": <number_of_street_lamps>,
  "junction_boxes": <number_of_junction_boxes>,
  "additional_notes": "<any_other_observations>"
}
```
"#;

const ROAD_SIGNS_PROMPT: &str = r#"Classify the road sign in this image into one of the following categories:
  * Stop
  * Yield
  * Speed Limit
  * Pedestrian Crossing
  * No Parking
  * Turn
  * Do not enter
  * Street name
  * Other
Provide the category and a description in JSON format.
Provide a field called "sign_quality" describing the condition of the sign using one of:
  * Good
  * Fair
  * Poor
  * Critical
  * Other
If the image quality is poor, include notes about that in "image_quality_notes", and do your best to analyze the sign.
Return the result as a JSON object. Example:
```json
{
  "category": "Stop",
  "sign_quality": "Good",
  "description": "A red octagonal stop sign is clearly visible.",
  "image_quality_notes": "image is clear"
}
```
"#;

const RESOLUTION_PROMPT: &str = r#"You have been provided with an image file for analysis.

Determine the exact pixel resolution of this image (width and height) by writing and executing code:

Load the image with a standard image processing library.
Read the width and height in pixels directly from the loaded image object.
Construct a JSON object from the extracted values using the keys width and height.
Your final output must be ONLY the JSON object, without preceding text, explanation or code block markers.
"#;
