/// Exposure statistics: point count, centroid, mean distance to centroid and
/// mean replacement cost, overall and for urban and rural settlements.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use hexmass_core::exposure::summary::to_table;
use hexmass_core::exposure::{summarize_exposure, ExposureStatsConfig};
use hexmass_core::logging::init_tracing;
use hexmass_core::Table;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "exposure_stats", about = "Spread and cost summary of exposure points")]
struct Args {
    /// Exposure points table (JSON records)
    #[arg(long)]
    points: PathBuf,

    /// Output path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "GEOPOINT_WKT")]
    point_column: String,

    /// Column whose text contains "urban" or "rural"
    #[arg(long, default_value = "SETTLEMENT")]
    settlement_column: String,

    #[arg(long, default_value = "TOTAL_REPL_COST_USD")]
    cost_column: String,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let points = Table::read_json(&args.points)
        .with_context(|| format!("Cannot read {}", args.points.display()))?;
    let cfg = ExposureStatsConfig {
        point_wkt_column: args.point_column,
        settlement_column: args.settlement_column,
        cost_column: args.cost_column,
    };
    let stats = summarize_exposure(&points, &cfg).context("Exposure statistics failed")?;
    for s in &stats {
        info!(group = %s.group, count = s.count, km = ?s.mean_distance_to_centroid_km, "group");
    }

    let table = to_table(&stats);
    match &args.output {
        Some(path) => table
            .write_json(path)
            .with_context(|| format!("Cannot write {}", path.display()))?,
        None => println!("{}", table.to_json_string()?),
    }
    Ok(())
}
