//! SQL text for the source and export queries.
//!
//! Table ids and the asset class are validated by [`crate::config`] before
//! they reach these builders; values are interpolated, not bound.

/// One row per asset with all its observations aggregated.
///
/// Ordered by `asset_id` so `LIMIT`/`OFFSET` windows partition the result.
pub fn source_query(source_table: &str, asset_class: &str) -> String {
    format!(
        "SELECT
  t1.asset_id,
  ANY_VALUE(t1.location) AS location,
  MAX(t1.detection_time) AS detection_time,
  ARRAY_AGG(STRUCT(t1.observation_id, t1.gcs_uri)) AS observations
FROM
  `{source_table}` AS t1
WHERE
  t1.asset_type = '{asset_class}'
GROUP BY
  t1.asset_id
ORDER BY
  t1.asset_id"
    )
}

/// Append a `LIMIT`/`OFFSET` window.
pub fn paged(query: &str, limit: u64, offset: u64) -> String {
    format!("{} LIMIT {} OFFSET {}", query.trim_end(), limit, offset)
}

/// Number of rows [`source_query`] yields, as column `total_rows`.
pub fn count_query(source_table: &str, asset_class: &str) -> String {
    format!(
        "SELECT COUNT(DISTINCT asset_id) AS total_rows FROM `{source_table}` WHERE asset_type = '{asset_class}'"
    )
}

/// Observation URIs of one asset class, used by the height analyzer.
pub fn observation_uris_query(source_table: &str, asset_class: &str, limit: u64) -> String {
    format!(
        "SELECT gcs_uri FROM `{source_table}` WHERE asset_type = \"{asset_class}\" AND gcs_uri IS NOT NULL LIMIT {limit}"
    )
}

/// Image URIs for a dataset export, optionally with their asset types as labels.
pub fn export_query(table: &str, include_labels: bool, limit: Option<u64>) -> String {
    let limit_clause = match limit {
        Some(n) if n > 0 => format!("\nLIMIT {}", n),
        _ => String::new(),
    };

    if include_labels {
        format!(
            "SELECT
  gcs_uri,
  ARRAY_AGG(DISTINCT asset_type IGNORE NULLS) AS labels
FROM `{table}`
WHERE gcs_uri IS NOT NULL AND gcs_uri LIKE 'gs://%'
GROUP BY gcs_uri{limit_clause}"
        )
    } else {
        format!(
            "SELECT DISTINCT gcs_uri
FROM `{table}`
WHERE gcs_uri IS NOT NULL AND gcs_uri LIKE 'gs://%'{limit_clause}"
        )
    }
}

/// Offsets of the shards covering `total_rows`.
pub fn shard_offsets(total_rows: u64, shard_size: u64) -> Vec<u64> {
    if shard_size == 0 {
        return Vec::new();
    }
    (0..total_rows).step_by(shard_size as usize).collect()
}
