//! places-query
//!
//! Count places in a Places Insights dataset around a point, inside a polygon,
//! along a route or within named regions, and print the aggregated rows as JSON
//! lines.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use imagery_core::logging;
use imagery_core::places::{
    self, h3_function_query, OpeningHours, PlaceFilters, PlacesDataset, PlacesOutput, PlacesQuery,
    RegionKind, SearchArea,
};
use imagery_gcp::{default_client, BigQueryClient, Warehouse};
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "places-query", about = "Aggregate place counts from Places Insights")]
struct Cli {
    /// Google Cloud project that runs the query
    #[arg(long, env = "GCP_PROJECT")]
    project_id: String,

    /// Two-letter country code of the dataset
    #[arg(long, default_value = "us")]
    country: String,

    /// Query the free sample dataset
    #[arg(long)]
    sample: bool,

    /// Count per H3 cell at this resolution instead of in total
    #[arg(long)]
    h3_resolution: Option<u8>,

    /// Print the SQL without running it
    #[arg(long)]
    print_sql: bool,

    #[command(flatten)]
    filters: FilterArgs,

    #[command(subcommand)]
    area: AreaCommand,
}

#[derive(Debug, Subcommand)]
enum AreaCommand {
    /// Places within a radius of a point
    Circle {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Radius in meters
        #[arg(long, default_value_t = 1000)]
        radius: u32,
    },
    /// Places inside a WKT polygon
    Polygon {
        #[arg(long)]
        wkt: String,
    },
    /// Places within a distance of a WKT line string
    Route {
        #[arg(long)]
        wkt: String,
        /// Buffer around the route in meters
        #[arg(long, default_value_t = 100)]
        radius: u32,
    },
    /// Places in named regions, broken down per region when several are given
    Region {
        /// Region column, e.g. `locality_names`
        #[arg(long)]
        field: String,
        /// The column holds a single name rather than an array
        #[arg(long)]
        single: bool,
        #[arg(long = "name", required = true)]
        names: Vec<String>,
    },
    /// H3 counts from the dataset's PLACES_COUNT_PER_H3 function
    H3Function {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, default_value_t = 1000)]
        radius: u32,
    },
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// Place type; repeat for several
    #[arg(long = "type")]
    place_types: Vec<String>,

    /// Match the primary type only
    #[arg(long)]
    primary_type: bool,

    /// Boolean attribute that must be true; repeat for several
    #[arg(long = "attribute")]
    attributes: Vec<String>,

    #[arg(long)]
    min_rating: Option<f64>,

    #[arg(long)]
    max_rating: Option<f64>,

    /// e.g. OPERATIONAL
    #[arg(long)]
    business_status: Option<String>,

    /// Brand name; repeat for several
    #[arg(long = "brand")]
    brands: Vec<String>,

    #[arg(long)]
    brand_category: Option<String>,

    /// Day of week for the opening-hours filter
    #[arg(long)]
    day: Option<String>,

    /// Open at or before this time (HH:MM)
    #[arg(long, requires = "day")]
    opens_by: Option<String>,

    /// Open until at least this time (HH:MM)
    #[arg(long, requires = "day")]
    open_until: Option<String>,
}

impl FilterArgs {
    fn into_filters(self) -> PlaceFilters {
        let opening_hours = self.day.map(|day| OpeningHours {
            day,
            opens_by: self.opens_by,
            open_until: self.open_until,
        });
        PlaceFilters {
            place_types: self.place_types,
            primary_type_only: self.primary_type,
            attributes: self.attributes,
            min_rating: self.min_rating,
            max_rating: self.max_rating,
            business_status: self.business_status,
            brand_names: self.brands,
            brand_category: self.brand_category,
            opening_hours,
        }
    }
}

fn build_sql(cli: Cli) -> Result<String, places::PlacesError> {
    let dataset = if cli.sample {
        PlacesDataset::Sample
    } else {
        PlacesDataset::Full
    };
    let filters = cli.filters.into_filters();

    let area = match cli.area {
        AreaCommand::H3Function { lat, lng, radius } => {
            return h3_function_query(
                &cli.country,
                dataset,
                lat,
                lng,
                radius,
                cli.h3_resolution.unwrap_or(8),
                &filters,
            );
        }
        AreaCommand::Circle { lat, lng, radius } => SearchArea::Circle {
            lat,
            lng,
            radius_m: radius,
        },
        AreaCommand::Polygon { wkt } => SearchArea::Polygon { wkt },
        AreaCommand::Route { wkt, radius } => SearchArea::Route { wkt, radius_m: radius },
        AreaCommand::Region { field, single, names } => SearchArea::Region {
            field,
            kind: if single { RegionKind::Name } else { RegionKind::Names },
            names,
        },
    };

    PlacesQuery {
        country_code: cli.country,
        dataset,
        area,
        filters,
        output: match cli.h3_resolution {
            Some(resolution) => PlacesOutput::H3Density { resolution },
            None => PlacesOutput::Counts,
        },
    }
    .to_sql()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let print_sql = cli.print_sql;
    let project_id = cli.project_id.clone();

    let sql = build_sql(cli).context("building places query")?;
    if print_sql {
        println!("{}", sql);
        return Ok(());
    }

    let http = default_client().context("building HTTP client")?;
    let warehouse = BigQueryClient::new(http, &project_id);
    let rows = warehouse.query_limited(&sql, places::MAX_RESULT_ROWS).await?;
    if rows.len() == places::MAX_RESULT_ROWS {
        warn!(rows = rows.len(), "Result reached the row limit and may be incomplete");
    }
    for row in rows {
        println!("{}", row);
    }
    Ok(())
}
