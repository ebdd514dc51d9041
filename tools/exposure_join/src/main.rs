/// Exposure join tool: buckets exposure points (replacement cost, occupancy)
/// into hexagons and writes per-hexagon aggregates.
///
/// Nearest mode gives every point to its closest hexagon in web Mercator;
/// within mode keeps only points that fall inside one.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use hexmass_core::exposure::{aggregate_points, ExposureJoinConfig, JoinMode};
use hexmass_core::logging::init_tracing;
use hexmass_core::Table;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "exposure_join", about = "Aggregate exposure points into hexagons")]
struct Args {
    /// Exposure points table (JSON records with a POINT WKT column)
    #[arg(long)]
    points: PathBuf,

    /// Hexagon table (JSON records with a polygon WKT column)
    #[arg(long)]
    hexes: PathBuf,

    /// Output path for the per-hexagon aggregates
    #[arg(short, long, default_value = "hex_exposure.json")]
    output: PathBuf,

    /// Optional path for the point-to-hexagon assignment table
    #[arg(long)]
    assignments: Option<PathBuf>,

    /// nearest | within
    #[arg(long, default_value = "nearest")]
    mode: JoinMode,

    /// Column holding the point WKT
    #[arg(long, default_value = "GEOPOINT_WKT")]
    point_column: String,

    /// Longitude column; with --lat-column, replaces the WKT column
    #[arg(long, requires = "lat_column")]
    lon_column: Option<String>,

    /// Latitude column
    #[arg(long, requires = "lon_column")]
    lat_column: Option<String>,

    /// Pin the hexagon id column (otherwise resolved, or numbered)
    #[arg(long)]
    hex_id_column: Option<String>,

    /// Pin the hexagon geometry column
    #[arg(long)]
    hex_geometry_column: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let points = Table::read_json(&args.points)
        .with_context(|| format!("Cannot read {}", args.points.display()))?;
    let hexes = Table::read_json(&args.hexes)
        .with_context(|| format!("Cannot read {}", args.hexes.display()))?;

    let cfg = ExposureJoinConfig {
        mode: args.mode,
        point_wkt_column: args.point_column.clone(),
        lon_column: args.lon_column.clone(),
        lat_column: args.lat_column.clone(),
        hex_id_column: args.hex_id_column.clone(),
        hex_geometry_column: args.hex_geometry_column.clone(),
        ..Default::default()
    };
    let out = aggregate_points(&points, &hexes, &cfg).context("Exposure join failed")?;

    let r = &out.report;
    if r.points_missing + r.points_unparsable > 0 {
        warn!(missing = r.points_missing, unparsable = r.points_unparsable, "points skipped");
    }
    info!(
        assigned = r.points_assigned,
        total = r.points_total,
        hexes = out.hexes.len(),
        "join complete"
    );

    out.hexes
        .write_json(&args.output)
        .with_context(|| format!("Cannot write {}", args.output.display()))?;
    if let Some(path) = &args.assignments {
        out.assignments
            .write_json(path)
            .with_context(|| format!("Cannot write {}", path.display()))?;
    }
    Ok(())
}
