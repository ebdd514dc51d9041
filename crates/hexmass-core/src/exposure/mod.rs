//! Exposure records (replacement cost, occupancy) against hexagon grids:
//! bucketing points into hexagons and settlement-level summaries.
pub mod join;
pub mod summary;

pub use join::{aggregate_points, ExposureJoinConfig, ExposureJoinOutput, JoinMode};
pub use summary::{summarize_exposure, ExposureStatsConfig, GroupStats};

use geo::{point, Point};
use tracing::warn;

use crate::geometry::wkt::parse_point;
use crate::table::Table;

/// Column holding the replacement cost in USD.
pub const COST_COLUMN: &str = "TOTAL_REPL_COST_USD";
pub const OCCUPANCY_COLUMN: &str = "OCCUPANCY";
pub const POINT_WKT_COLUMN: &str = "GEOPOINT_WKT";
pub const LONGITUDE_COLUMN: &str = "LONGITUDE";
pub const LATITUDE_COLUMN: &str = "LATITUDE";

/// Points parsed from a WKT column, keeping the source row index.
pub(crate) struct ParsedPoints {
    pub points: Vec<(usize, Point<f64>)>,
    pub missing: usize,
    pub unparsable: usize,
}

pub(crate) fn parse_points(table: &Table, column: &str) -> ParsedPoints {
    let mut out = ParsedPoints { points: Vec::with_capacity(table.len()), missing: 0, unparsable: 0 };
    for row in 0..table.len() {
        let Some(text) = table.str_at(row, column) else {
            out.missing += 1;
            continue;
        };
        match parse_point(text, row) {
            Ok(p) => out.points.push((row, p)),
            Err(e) => {
                warn!(row, error = %e.reason, "dropping exposure point with unparsable WKT");
                out.unparsable += 1;
            }
        }
    }
    out
}

/// Points built from a longitude and a latitude column. A row with either
/// cell missing counts as missing; a non-finite or out-of-range coordinate
/// counts as unparsable.
pub(crate) fn parse_lon_lat_points(table: &Table, lon_column: &str, lat_column: &str) -> ParsedPoints {
    let mut out = ParsedPoints { points: Vec::with_capacity(table.len()), missing: 0, unparsable: 0 };
    for row in 0..table.len() {
        let (Some(lon), Some(lat)) = (table.f64_at(row, lon_column), table.f64_at(row, lat_column)) else {
            out.missing += 1;
            continue;
        };
        if lon.is_finite() && lat.is_finite() && (-90.0..=90.0).contains(&lat) {
            out.points.push((row, point! { x: lon, y: lat }));
        } else {
            warn!(row, lon, lat, "dropping exposure point with invalid coordinates");
            out.unparsable += 1;
        }
    }
    out
}

/// Mean of the values present; `None` when there are none.
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
