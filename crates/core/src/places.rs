//! Places Insights aggregate queries.
//!
//! The Places Insights datasets only answer `SELECT WITH AGGREGATION_THRESHOLD`
//! queries, so every builder here produces counts: a total, per-type counts,
//! per-brand or per-region breakdowns, or counts per H3 cell. Free text is
//! quoted as string literals and names used as columns must be identifiers.

use thiserror::Error;

/// Fully qualified H3 cell function from the CARTO toolbox.
pub const H3_FROM_POINT: &str = "carto-os.carto.H3_FROMGEOGPOINT";

/// Rows requested when running a places query.
pub const MAX_RESULT_ROWS: usize = 100_000;

const DAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

#[derive(Debug, Error, PartialEq)]
pub enum PlacesError {
    #[error("invalid {kind}: '{value}'")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("invalid coordinate {lat}, {lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("invalid rating range: {0}")]
    InvalidRating(String),

    #[error("H3 resolution must be between 0 and 15, got {0}")]
    InvalidResolution(u8),

    #[error("{0}")]
    MissingInput(&'static str),
}

pub type PlacesResult<T> = std::result::Result<T, PlacesError>;

fn identifier(kind: &'static str, value: &str) -> PlacesResult<String> {
    let mut chars = value.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(value.to_string())
    } else {
        Err(PlacesError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}

/// GoogleSQL single-quoted string literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn quote_list(values: &[String]) -> String {
    values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(", ")
}

fn time_literal(value: &str) -> PlacesResult<String> {
    let invalid = || PlacesError::InvalidTime(value.to_string());
    let (hours, minutes) = value.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: u8 = hours.parse().map_err(|_| invalid())?;
    let minutes: u8 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(format!("TIME '{:02}:{:02}:00'", hours, minutes))
}

fn check_point(lat: f64, lng: f64) -> PlacesResult<()> {
    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) {
        Ok(())
    } else {
        Err(PlacesError::InvalidCoordinate { lat, lng })
    }
}

fn check_resolution(resolution: u8) -> PlacesResult<u8> {
    if resolution <= 15 {
        Ok(resolution)
    } else {
        Err(PlacesError::InvalidResolution(resolution))
    }
}

/// Full per-country dataset or its free sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacesDataset {
    #[default]
    Full,
    Sample,
}

impl PlacesDataset {
    pub fn dataset(&self, country_code: &str) -> PlacesResult<String> {
        let country = identifier("country code", &country_code.to_ascii_lowercase())?;
        Ok(match self {
            PlacesDataset::Full => format!("places_insights___{}", country),
            PlacesDataset::Sample => format!("places_insights___{}___sample", country),
        })
    }

    pub fn places_table(&self, country_code: &str) -> PlacesResult<String> {
        let dataset = self.dataset(country_code)?;
        Ok(match self {
            PlacesDataset::Full => format!("{}.places", dataset),
            PlacesDataset::Sample => format!("{}.places_sample", dataset),
        })
    }

    /// Brand metadata is published with the US dataset only.
    pub fn brands_table(&self) -> &'static str {
        match self {
            PlacesDataset::Full => "places_insights___us.brands",
            PlacesDataset::Sample => "places_insights___us___sample.brands",
        }
    }
}

/// Column shape of a region field: a single name or an array of names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Name,
    Names,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchArea {
    Circle { lat: f64, lng: f64, radius_m: u32 },
    Polygon { wkt: String },
    Region { field: String, kind: RegionKind, names: Vec<String> },
    Route { wkt: String, radius_m: u32 },
}

impl SearchArea {
    /// Script prelude declaring the area's geography, if it needs one.
    fn declaration(&self) -> String {
        match self {
            SearchArea::Polygon { wkt } => format!(
                "DECLARE search_area GEOGRAPHY; SET search_area = ST_GEOGFROMTEXT({});",
                quote(wkt)
            ),
            SearchArea::Route { wkt, .. } => format!(
                "DECLARE route GEOGRAPHY; SET route = ST_GEOGFROMTEXT({});",
                quote(wkt)
            ),
            _ => String::new(),
        }
    }

    fn filter(&self) -> PlacesResult<String> {
        match self {
            SearchArea::Circle { lat, lng, radius_m } => {
                check_point(*lat, *lng)?;
                Ok(format!(
                    "ST_DWITHIN(ST_GEOGPOINT({}, {}), places.point, {})",
                    lng, lat, radius_m
                ))
            }
            SearchArea::Polygon { wkt } => {
                if wkt.trim().is_empty() {
                    return Err(PlacesError::MissingInput("polygon search needs a WKT polygon"));
                }
                Ok("ST_CONTAINS(search_area, places.point)".to_string())
            }
            SearchArea::Route { wkt, radius_m } => {
                if wkt.trim().is_empty() {
                    return Err(PlacesError::MissingInput("route search needs a WKT route"));
                }
                Ok(format!("ST_DWITHIN(route, places.point, {})", radius_m))
            }
            SearchArea::Region { field, kind, .. } => {
                let field = identifier("region field", field)?;
                let names = self.region_names();
                if names.is_empty() {
                    return Err(PlacesError::MissingInput("region search needs at least one region name"));
                }
                let names = quote_list(&names);
                Ok(match kind {
                    RegionKind::Name => format!("places.{} IN ({})", field, names),
                    RegionKind::Names => format!(
                        "EXISTS (SELECT 1 FROM UNNEST(places.{}) AS name WHERE name IN ({}))",
                        field, names
                    ),
                })
            }
        }
    }

    /// Distinct, non-blank region names in input order.
    fn region_names(&self) -> Vec<String> {
        let SearchArea::Region { names, .. } = self else {
            return Vec::new();
        };
        let mut unique: Vec<String> = Vec::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if !unique.iter().any(|seen| seen == name) {
                unique.push(name.to_string());
            }
        }
        unique
    }
}

/// Places open on `day` from at least `opens_by` until at least `open_until`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningHours {
    pub day: String,
    pub opens_by: Option<String>,
    pub open_until: Option<String>,
}

impl OpeningHours {
    fn day(&self) -> PlacesResult<String> {
        let day = self.day.trim().to_ascii_lowercase();
        if DAYS.contains(&day.as_str()) {
            Ok(day)
        } else {
            Err(PlacesError::InvalidIdentifier {
                kind: "day of week",
                value: self.day.clone(),
            })
        }
    }

    fn conditions(&self) -> PlacesResult<Vec<String>> {
        let mut conditions = Vec::new();
        if let Some(start) = &self.opens_by {
            conditions.push(format!("opening_period.start_time <= {}", time_literal(start)?));
        }
        if let Some(end) = &self.open_until {
            conditions.push(format!("opening_period.end_time >= {}", time_literal(end)?));
        }
        Ok(conditions)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceFilters {
    pub place_types: Vec<String>,
    /// Match `primary_type` instead of any of `types`.
    pub primary_type_only: bool,
    /// Boolean place columns that must be true, e.g. `wheelchair_accessible_entrance`.
    pub attributes: Vec<String>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub business_status: Option<String>,
    pub brand_names: Vec<String>,
    pub brand_category: Option<String>,
    pub opening_hours: Option<OpeningHours>,
}

impl PlaceFilters {
    fn is_brand_query(&self) -> bool {
        !self.brand_names.is_empty() || self.brand_category.is_some()
    }

    fn rating_filter(&self) -> PlacesResult<Option<String>> {
        for rating in [self.min_rating, self.max_rating].into_iter().flatten() {
            if !rating.is_finite() {
                return Err(PlacesError::InvalidRating(rating.to_string()));
            }
        }
        Ok(match (self.min_rating, self.max_rating) {
            (Some(min), Some(max)) if min > max => {
                return Err(PlacesError::InvalidRating(format!("{} > {}", min, max)))
            }
            (Some(min), Some(max)) => Some(format!("places.rating BETWEEN {} AND {}", min, max)),
            (Some(min), None) => Some(format!("places.rating >= {}", min)),
            (None, Some(max)) => Some(format!("places.rating <= {}", max)),
            (None, None) => None,
        })
    }

    fn conditions(&self) -> PlacesResult<Vec<String>> {
        let mut conditions = Vec::new();

        if !self.place_types.is_empty() {
            if self.primary_type_only {
                conditions.push(format!("places.primary_type IN ({})", quote_list(&self.place_types)));
            } else {
                let any: Vec<String> = self
                    .place_types
                    .iter()
                    .map(|t| format!("{} IN UNNEST(places.types)", quote(t)))
                    .collect();
                conditions.push(format!("({})", any.join(" OR ")));
            }
        }
        for attribute in &self.attributes {
            conditions.push(format!("places.{} = TRUE", identifier("attribute", attribute)?));
        }
        if let Some(rating) = self.rating_filter()? {
            conditions.push(rating);
        }
        if let Some(status) = &self.business_status {
            conditions.push(format!("places.business_status = {}", quote(status)));
        }
        if !self.brand_names.is_empty() {
            conditions.push(format!("brands.name IN ({})", quote_list(&self.brand_names)));
        }
        if let Some(category) = &self.brand_category {
            conditions.push(format!("brands.category = {}", quote(category)));
        }
        if let Some(hours) = &self.opening_hours {
            conditions.extend(hours.conditions()?);
        }
        Ok(conditions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacesOutput {
    /// Totals, per-type counts, or a brand or region breakdown.
    #[default]
    Counts,
    /// Place counts per H3 cell, aggregated into `indices` and `counts` arrays.
    H3Density { resolution: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacesQuery {
    pub country_code: String,
    pub dataset: PlacesDataset,
    pub area: SearchArea,
    pub filters: PlaceFilters,
    pub output: PlacesOutput,
}

impl PlacesQuery {
    fn from_clause(&self) -> PlacesResult<String> {
        let mut from = format!("FROM `{}` places", self.dataset.places_table(&self.country_code)?);
        if let Some(hours) = &self.filters.opening_hours {
            if hours.opens_by.is_some() || hours.open_until.is_some() {
                from.push_str(&format!(
                    ", UNNEST(places.regular_opening_hours.{}) AS opening_period",
                    hours.day()?
                ));
            }
        }
        if self.filters.is_brand_query() {
            from.push_str(&format!(
                ", UNNEST(places.brand_ids) AS brand_id LEFT JOIN `{}` brands ON brand_id = brands.id",
                self.dataset.brands_table()
            ));
        }
        Ok(from)
    }

    fn where_clause(&self) -> PlacesResult<String> {
        let mut conditions = vec![self.area.filter()?];
        conditions.extend(self.filters.conditions()?);
        Ok(format!("WHERE {}", conditions.join(" AND ")))
    }

    fn select(&self) -> String {
        let types = &self.filters.place_types;
        if let SearchArea::Region {
            field,
            kind: RegionKind::Name,
            ..
        } = &self.area
        {
            if self.area.region_names().len() > 1 {
                return format!("places.{} AS region_name, COUNT(*) AS count", field);
            }
        }
        if self.filters.is_brand_query() {
            return "brands.name, COUNT(places.id) AS count".to_string();
        }
        if types.len() <= 1 {
            return "COUNT(*) AS total_count".to_string();
        }
        let per_type: Vec<String> = types
            .iter()
            .map(|t| format!("COUNTIF({} IN UNNEST(places.types)) AS {}_count", quote(t), column_name(t)))
            .collect();
        format!("{},\n  COUNT(*) AS total_count", per_type.join(",\n  "))
    }

    fn grouping(&self) -> &'static str {
        let multi_region = matches!(self.area, SearchArea::Region { kind: RegionKind::Name, .. })
            && self.area.region_names().len() > 1;
        if multi_region {
            " GROUP BY region_name ORDER BY count DESC"
        } else if self.filters.is_brand_query() {
            " GROUP BY brands.name ORDER BY count DESC"
        } else {
            ""
        }
    }

    /// Render the query, prefixed by any geography declaration it needs.
    pub fn to_sql(&self) -> PlacesResult<String> {
        let where_clause = self.where_clause()?;
        let from = self.from_clause()?;
        let prelude = self.area.declaration();

        let body = match self.output {
            PlacesOutput::Counts => format!(
                "SELECT WITH AGGREGATION_THRESHOLD {} {} {}{}",
                self.select(),
                from,
                where_clause,
                self.grouping()
            ),
            PlacesOutput::H3Density { resolution } => format!(
                "SELECT ARRAY_AGG(h3_index) AS indices, ARRAY_AGG(place_count) AS counts
FROM (
  SELECT WITH AGGREGATION_THRESHOLD
    `{}`(places.point, {}) AS h3_index,
    COUNT(*) AS place_count
  {}
  {}
  GROUP BY h3_index
)
WHERE h3_index IS NOT NULL",
                H3_FROM_POINT,
                check_resolution(resolution)?,
                from,
                where_clause
            ),
        };

        Ok(if prelude.is_empty() {
            body
        } else {
            format!("{}\n{}", prelude, body)
        })
    }
}

/// Column alias for a per-type count.
fn column_name(place_type: &str) -> String {
    place_type
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Call the dataset's `PLACES_COUNT_PER_H3` function around a point.
///
/// Brand and opening-hours filters are not supported by the function and are
/// ignored.
pub fn h3_function_query(
    country_code: &str,
    dataset: PlacesDataset,
    lat: f64,
    lng: f64,
    radius_m: u32,
    resolution: u8,
    filters: &PlaceFilters,
) -> PlacesResult<String> {
    check_point(lat, lng)?;
    let mut parts = vec![
        format!("'geography', ST_GEOGPOINT({}, {})", lng, lat),
        format!("'geography_radius', {}", radius_m),
        format!("'h3_resolution', {}", check_resolution(resolution)?),
    ];
    if let Some(status) = &filters.business_status {
        parts.push(format!("'business_status', [{}]", quote(status)));
    }
    if !filters.place_types.is_empty() {
        let key = if filters.primary_type_only { "primary_type" } else { "types" };
        parts.push(format!("'{}', [{}]", key, quote_list(&filters.place_types)));
    }
    filters.rating_filter()?;
    if let Some(min) = filters.min_rating {
        parts.push(format!("'min_rating', {}", min));
    }
    if let Some(max) = filters.max_rating {
        parts.push(format!("'max_rating', {}", max));
    }
    for attribute in &filters.attributes {
        parts.push(format!("'{}', TRUE", identifier("attribute", attribute)?));
    }

    Ok(format!(
        "SELECT * FROM `{}.PLACES_COUNT_PER_H3`(\n  JSON_OBJECT(\n    {}\n  )\n)",
        dataset.dataset(country_code)?,
        parts.join(",\n    ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle() -> SearchArea {
        SearchArea::Circle {
            lat: 40.758,
            lng: -73.9855,
            radius_m: 1000,
        }
    }

    fn query(area: SearchArea, filters: PlaceFilters) -> PlacesQuery {
        PlacesQuery {
            country_code: "US".to_string(),
            dataset: PlacesDataset::Full,
            area,
            filters,
            output: PlacesOutput::Counts,
        }
    }

    #[test]
    fn test_circle_total_count() {
        let sql = query(circle(), PlaceFilters::default()).to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT WITH AGGREGATION_THRESHOLD COUNT(*) AS total_count \
             FROM `places_insights___us.places` places \
             WHERE ST_DWITHIN(ST_GEOGPOINT(-73.9855, 40.758), places.point, 1000)"
        );
    }

    #[test]
    fn test_polygon_declares_search_area() {
        let area = SearchArea::Polygon {
            wkt: "POLYGON((0 0, 1 0, 1 1, 0 0))".to_string(),
        };
        let sql = query(area, PlaceFilters::default()).to_sql().unwrap();
        assert!(sql.starts_with(
            "DECLARE search_area GEOGRAPHY; SET search_area = ST_GEOGFROMTEXT('POLYGON((0 0, 1 0, 1 1, 0 0))');\n"
        ));
        assert!(sql.ends_with("WHERE ST_CONTAINS(search_area, places.point)"));
    }

    #[test]
    fn test_route_buffer() {
        let area = SearchArea::Route {
            wkt: "LINESTRING(0 0, 1 1)".to_string(),
            radius_m: 250,
        };
        let sql = query(area, PlaceFilters::default()).to_sql().unwrap();
        assert!(sql.starts_with("DECLARE route GEOGRAPHY;"));
        assert!(sql.contains("WHERE ST_DWITHIN(route, places.point, 250)"));
    }

    #[test]
    fn test_multi_region_groups_by_region() {
        let area = SearchArea::Region {
            field: "locality_names".to_string(),
            kind: RegionKind::Name,
            names: vec!["Brooklyn".to_string(), " Queens ".to_string(), "Brooklyn".to_string()],
        };
        let sql = query(area, PlaceFilters::default()).to_sql().unwrap();
        assert!(sql.contains("SELECT WITH AGGREGATION_THRESHOLD places.locality_names AS region_name, COUNT(*) AS count"));
        assert!(sql.contains("WHERE places.locality_names IN ('Brooklyn', 'Queens')"));
        assert!(sql.ends_with("GROUP BY region_name ORDER BY count DESC"));
    }

    #[test]
    fn test_array_region_uses_exists() {
        let area = SearchArea::Region {
            field: "postal_code_names".to_string(),
            kind: RegionKind::Names,
            names: vec!["10001".to_string(), "10002".to_string()],
        };
        let sql = query(area, PlaceFilters::default()).to_sql().unwrap();
        assert!(sql.contains(
            "WHERE EXISTS (SELECT 1 FROM UNNEST(places.postal_code_names) AS name WHERE name IN ('10001', '10002'))"
        ));
        assert!(sql.contains("COUNT(*) AS total_count"));
        assert!(!sql.contains("GROUP BY"));
    }

    #[test]
    fn test_region_requires_names() {
        let area = SearchArea::Region {
            field: "locality_names".to_string(),
            kind: RegionKind::Name,
            names: vec!["  ".to_string()],
        };
        let err = query(area, PlaceFilters::default()).to_sql().unwrap_err();
        assert!(matches!(err, PlacesError::MissingInput(_)));
    }

    #[test]
    fn test_per_type_counts() {
        let filters = PlaceFilters {
            place_types: vec!["restaurant".to_string(), "coffee_shop".to_string()],
            ..PlaceFilters::default()
        };
        let sql = query(circle(), filters).to_sql().unwrap();
        assert!(sql.contains("COUNTIF('restaurant' IN UNNEST(places.types)) AS restaurant_count"));
        assert!(sql.contains("COUNTIF('coffee_shop' IN UNNEST(places.types)) AS coffee_shop_count"));
        assert!(sql.contains("COUNT(*) AS total_count"));
        assert!(sql.contains(
            "AND ('restaurant' IN UNNEST(places.types) OR 'coffee_shop' IN UNNEST(places.types))"
        ));
    }

    #[test]
    fn test_filters_combine() {
        let filters = PlaceFilters {
            place_types: vec!["restaurant".to_string()],
            primary_type_only: true,
            attributes: vec!["offers_delivery".to_string()],
            min_rating: Some(4.0),
            max_rating: Some(4.5),
            business_status: Some("OPERATIONAL".to_string()),
            opening_hours: Some(OpeningHours {
                day: "Friday".to_string(),
                opens_by: Some("08:00".to_string()),
                open_until: Some("22:30".to_string()),
            }),
            ..PlaceFilters::default()
        };
        let sql = query(circle(), filters).to_sql().unwrap();
        assert!(sql.contains(
            "FROM `places_insights___us.places` places, UNNEST(places.regular_opening_hours.friday) AS opening_period"
        ));
        assert!(sql.contains("places.primary_type IN ('restaurant')"));
        assert!(sql.contains("places.offers_delivery = TRUE"));
        assert!(sql.contains("places.rating BETWEEN 4 AND 4.5"));
        assert!(sql.contains("places.business_status = 'OPERATIONAL'"));
        assert!(sql.contains("opening_period.start_time <= TIME '08:00:00'"));
        assert!(sql.contains("opening_period.end_time >= TIME '22:30:00'"));
    }

    #[test]
    fn test_brand_breakdown_joins_brands() {
        let filters = PlaceFilters {
            brand_names: vec!["Trader Joe's".to_string()],
            ..PlaceFilters::default()
        };
        let mut q = query(circle(), filters);
        q.dataset = PlacesDataset::Sample;
        q.country_code = "gb".to_string();
        let sql = q.to_sql().unwrap();

        assert!(sql.contains("SELECT WITH AGGREGATION_THRESHOLD brands.name, COUNT(places.id) AS count"));
        assert!(sql.contains(
            "FROM `places_insights___gb___sample.places_sample` places, UNNEST(places.brand_ids) AS brand_id \
             LEFT JOIN `places_insights___us___sample.brands` brands ON brand_id = brands.id"
        ));
        assert!(sql.contains("brands.name IN ('Trader Joe\\'s')"));
        assert!(sql.ends_with("GROUP BY brands.name ORDER BY count DESC"));
    }

    #[test]
    fn test_h3_density() {
        let mut q = query(circle(), PlaceFilters::default());
        q.output = PlacesOutput::H3Density { resolution: 8 };
        let sql = q.to_sql().unwrap();
        assert!(sql.starts_with("SELECT ARRAY_AGG(h3_index) AS indices, ARRAY_AGG(place_count) AS counts"));
        assert!(sql.contains("`carto-os.carto.H3_FROMGEOGPOINT`(places.point, 8) AS h3_index"));
        assert!(sql.contains("GROUP BY h3_index"));

        q.output = PlacesOutput::H3Density { resolution: 16 };
        assert_eq!(q.to_sql().unwrap_err(), PlacesError::InvalidResolution(16));
    }

    #[test]
    fn test_rejects_unsafe_input() {
        let filters = PlaceFilters {
            attributes: vec!["x = TRUE OR 1".to_string()],
            ..PlaceFilters::default()
        };
        assert!(matches!(
            query(circle(), filters).to_sql(),
            Err(PlacesError::InvalidIdentifier { kind: "attribute", .. })
        ));

        let filters = PlaceFilters {
            opening_hours: Some(OpeningHours {
                day: "monday".to_string(),
                opens_by: Some("8am".to_string()),
                open_until: None,
            }),
            ..PlaceFilters::default()
        };
        assert_eq!(
            query(circle(), filters).to_sql().unwrap_err(),
            PlacesError::InvalidTime("8am".to_string())
        );

        let filters = PlaceFilters {
            min_rating: Some(4.5),
            max_rating: Some(3.0),
            ..PlaceFilters::default()
        };
        assert!(matches!(query(circle(), filters).to_sql(), Err(PlacesError::InvalidRating(_))));

        let area = SearchArea::Circle {
            lat: 91.0,
            lng: 0.0,
            radius_m: 10,
        };
        assert!(matches!(
            query(area, PlaceFilters::default()).to_sql(),
            Err(PlacesError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_h3_function_query() {
        let filters = PlaceFilters {
            place_types: vec!["restaurant".to_string()],
            min_rating: Some(4.0),
            attributes: vec!["allows_dogs".to_string()],
            business_status: Some("OPERATIONAL".to_string()),
            brand_names: vec!["Ignored".to_string()],
            ..PlaceFilters::default()
        };
        let sql = h3_function_query("US", PlacesDataset::Sample, 40.75, -73.98, 500, 9, &filters).unwrap();

        assert!(sql.starts_with("SELECT * FROM `places_insights___us___sample.PLACES_COUNT_PER_H3`("));
        assert!(sql.contains("'geography', ST_GEOGPOINT(-73.98, 40.75)"));
        assert!(sql.contains("'geography_radius', 500"));
        assert!(sql.contains("'h3_resolution', 9"));
        assert!(sql.contains("'business_status', ['OPERATIONAL']"));
        assert!(sql.contains("'types', ['restaurant']"));
        assert!(sql.contains("'min_rating', 4"));
        assert!(sql.contains("'allows_dogs', TRUE"));
        assert!(!sql.contains("Ignored"));
    }
}
