//! Point-to-hexagon join with per-hexagon exposure aggregates.
//!
//! Nearest mode projects both layers to web Mercator and gives every point
//! to the closest hexagon (distance 0 when inside). Within mode only keeps
//! points that fall strictly inside a hexagon.

use std::str::FromStr;

use geo::{Contains, EuclideanDistance, MultiPolygon, Point, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use super::{mean, parse_lon_lat_points, parse_points, ParsedPoints, COST_COLUMN, OCCUPANCY_COLUMN, POINT_WKT_COLUMN};
use crate::error::{ConfigError, GeometryParseError, Result, SchemaResolutionError};
use crate::geometry::wkt::{parse_polygonal, to_wkt};
use crate::geometry::{bbox, AreaCrs};
use crate::schema::{resolve, resolve_or_pinned, Pattern, RoleSpec};
use crate::table::{number, Row, Table};

pub const HEX_GEOMETRY: RoleSpec = RoleSpec {
    role: "hexagon geometry",
    patterns: &[
        Pattern::Exact("GEOM_WKT"),
        Pattern::Exact("WKT"),
        Pattern::Exact("geometry"),
        Pattern::Exact("GEOMETRY"),
    ],
    ignore_case: false,
};

pub const HEX_ID: RoleSpec = RoleSpec {
    role: "hexagon id",
    patterns: &[
        Pattern::Exact("HEX_ID"),
        Pattern::Exact("hex_id"),
        Pattern::Exact("h3"),
        Pattern::Exact("h3_index"),
        Pattern::Exact("cell_id"),
        Pattern::Exact("id"),
        Pattern::Exact("ID"),
    ],
    ignore_case: false,
};

/// Column name used when hexagons carry no id and are numbered instead.
pub const SYNTHETIC_HEX_ID: &str = "HEX_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    #[default]
    Nearest,
    Within,
}

impl FromStr for JoinMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(JoinMode::Nearest),
            "within" => Ok(JoinMode::Within),
            other => Err(ConfigError::new("join_mode", format!("expected nearest or within, got `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureJoinConfig {
    pub mode: JoinMode,
    pub point_wkt_column: String,
    /// Longitude and latitude columns; when both are set they are used
    /// instead of the WKT column.
    pub lon_column: Option<String>,
    pub lat_column: Option<String>,
    pub cost_column: String,
    pub occupancy_column: String,
    /// Pin the hexagon id column instead of resolving aliases.
    pub hex_id_column: Option<String>,
    pub hex_geometry_column: Option<String>,
}

impl Default for ExposureJoinConfig {
    fn default() -> Self {
        Self {
            mode: JoinMode::Nearest,
            point_wkt_column: POINT_WKT_COLUMN.to_string(),
            lon_column: None,
            lat_column: None,
            cost_column: COST_COLUMN.to_string(),
            occupancy_column: OCCUPANCY_COLUMN.to_string(),
            hex_id_column: None,
            hex_geometry_column: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinReport {
    pub points_total: usize,
    pub points_assigned: usize,
    /// Points with no location cell.
    pub points_missing: usize,
    /// Points whose WKT or coordinates could not be used.
    pub points_unparsable: usize,
    pub hexes_total: usize,
    pub hexes_dropped: usize,
}

#[derive(Debug, Clone)]
pub struct ExposureJoinOutput {
    /// One row per hexagon, empty ones included with zeros.
    pub hexes: Table,
    /// One row per assigned point: source row, hexagon id, distance.
    pub assignments: Table,
    pub report: JoinReport,
}

struct Hex {
    id: Value,
    geometry: MultiPolygon<f64>,
    projected: MultiPolygon<f64>,
    projected_box: Option<Rect<f64>>,
}

#[derive(Default)]
struct Bucket {
    count: usize,
    occupancy: Vec<f64>,
    cost: Vec<f64>,
}

/// Join exposure points to hexagons and aggregate per hexagon.
pub fn aggregate_points(points: &Table, hexes: &Table, config: &ExposureJoinConfig) -> Result<ExposureJoinOutput> {
    let geom_col = resolve_or_pinned(hexes, &HEX_GEOMETRY, config.hex_geometry_column.as_deref())?;
    let id_col = match &config.hex_id_column {
        Some(pinned) => Some(resolve_or_pinned(hexes, &HEX_ID, Some(pinned))?),
        None => resolve(hexes, &HEX_ID).ok(),
    };
    let location_columns: Vec<&String> = match (&config.lon_column, &config.lat_column) {
        (Some(lon), Some(lat)) => vec![lon, lat],
        _ => vec![&config.point_wkt_column],
    };
    if !points.is_empty() && !location_columns.iter().all(|c| points.has_column(c)) {
        return Err(SchemaResolutionError {
            role: "point location".to_string(),
            tried: location_columns.into_iter().cloned().collect(),
        }
        .into());
    }

    let mut report = JoinReport { points_total: points.len(), hexes_total: hexes.len(), ..Default::default() };
    let cells = load_hexes(hexes, &geom_col, id_col.as_deref(), &mut report);
    let id_name = id_col.unwrap_or_else(|| SYNTHETIC_HEX_ID.to_string());

    let parsed: ParsedPoints = match (&config.lon_column, &config.lat_column) {
        (Some(lon), Some(lat)) => parse_lon_lat_points(points, lon, lat),
        _ => parse_points(points, &config.point_wkt_column),
    };
    report.points_missing = parsed.missing;
    report.points_unparsable = parsed.unparsable;

    let assign = |&(row, p): &(usize, Point<f64>)| -> Option<(usize, usize, Option<f64>)> {
        match config.mode {
            JoinMode::Nearest => nearest_hex(&cells, &AreaCrs::WebMercator.project_point(&p))
                .map(|(hi, d)| (row, hi, Some(d))),
            JoinMode::Within => cells
                .iter()
                .position(|h| h.geometry.contains(&p))
                .map(|hi| (row, hi, None)),
        }
    };

    #[cfg(feature = "threading")]
    let assigned: Vec<(usize, usize, Option<f64>)> = parsed.points.par_iter().filter_map(assign).collect();
    #[cfg(not(feature = "threading"))]
    let assigned: Vec<(usize, usize, Option<f64>)> = parsed.points.iter().filter_map(assign).collect();

    report.points_assigned = assigned.len();
    info!(
        assigned = report.points_assigned,
        total = report.points_total,
        mode = ?config.mode,
        "points assigned to hexagons"
    );

    let mut buckets: Vec<Bucket> = (0..cells.len()).map(|_| Bucket::default()).collect();
    let mut assignments = Table::new(["point_row", id_name.as_str(), "nearest_m"]);
    for &(row, hi, dist) in &assigned {
        let b = &mut buckets[hi];
        b.count += 1;
        if let Some(v) = points.f64_at(row, &config.occupancy_column) {
            b.occupancy.push(v);
        }
        if let Some(v) = points.f64_at(row, &config.cost_column) {
            b.cost.push(v);
        }
        let mut out = Row::new();
        out.insert("point_row".into(), Value::from(row));
        out.insert(id_name.clone(), cells[hi].id.clone());
        out.insert("nearest_m".into(), dist.map(number).unwrap_or(Value::Null));
        assignments.push_row(out);
    }

    let mut table = Table::new([
        id_name.as_str(),
        "GEOM_WKT",
        "POINT_COUNT",
        "AVG_OCCUPANCY",
        "SUM_TOTAL_REPL_COST_USD",
        "AVG_TOTAL_REPL_COST_USD",
    ]);
    for (cell, b) in cells.iter().zip(&buckets) {
        let mut out = Row::new();
        out.insert(id_name.clone(), cell.id.clone());
        out.insert("GEOM_WKT".into(), Value::String(to_wkt(&cell.geometry)));
        out.insert("POINT_COUNT".into(), Value::from(b.count));
        out.insert("AVG_OCCUPANCY".into(), number(mean(&b.occupancy).unwrap_or(0.0)));
        out.insert("SUM_TOTAL_REPL_COST_USD".into(), number(b.cost.iter().sum()));
        out.insert("AVG_TOTAL_REPL_COST_USD".into(), number(mean(&b.cost).unwrap_or(0.0)));
        table.push_row(out);
    }

    Ok(ExposureJoinOutput { hexes: table, assignments, report })
}

fn load_hexes(table: &Table, geom_col: &str, id_col: Option<&str>, report: &mut JoinReport) -> Vec<Hex> {
    let mut cells = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let parsed = match table.str_at(row, geom_col) {
            Some(text) => parse_polygonal(text, row),
            None => Err(GeometryParseError { row, reason: "missing hexagon geometry".to_string() }),
        };
        let geometry = match parsed {
            Ok(g) => g,
            Err(e) => {
                warn!(row, error = %e.reason, "dropping hexagon");
                report.hexes_dropped += 1;
                continue;
            }
        };
        let id = match id_col {
            Some(col) => match table.rows()[row].get(col) {
                Some(v) if !v.is_null() => v.clone(),
                _ => {
                    warn!(row, "dropping hexagon without id");
                    report.hexes_dropped += 1;
                    continue;
                }
            },
            None => Value::from(cells.len()),
        };
        let projected = AreaCrs::WebMercator.project_polygonal(&geometry);
        let projected_box = bbox(&projected);
        cells.push(Hex { id, geometry, projected, projected_box });
    }
    cells
}

/// Closest hexagon by planar distance; ties keep the earlier hexagon.
fn nearest_hex(cells: &[Hex], p: &Point<f64>) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, cell) in cells.iter().enumerate() {
        let Some(rect) = &cell.projected_box else {
            continue;
        };
        if let Some((_, d)) = best {
            if rect_distance(rect, p) >= d {
                continue;
            }
        }
        let d = p.euclidean_distance(&cell.projected);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
            if d == 0.0 {
                break;
            }
        }
    }
    best
}

/// Lower bound on the distance from `p` to anything inside `r`.
fn rect_distance(r: &Rect<f64>, p: &Point<f64>) -> f64 {
    let dx = (r.min().x - p.x()).max(0.0).max(p.x() - r.max().x);
    let dy = (r.min().y - p.y()).max(0.0).max(p.y() - r.max().y);
    dx.hypot(dy)
}
