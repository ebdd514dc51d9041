/// Local Moran's I over a hexagon layer (Queen contiguity, row-standardised
/// weights). Appends lisa_I, lisa_p, lisa_cluster and lisa_significant to
/// every input row.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use hexmass_core::logging::init_tracing;
use hexmass_core::stats::{lisa_table, LisaConfig};
use hexmass_core::Table;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lisa", about = "Local spatial autocorrelation of one column over hexagons")]
struct Args {
    /// Input table (JSON records with polygon WKT)
    #[arg(long)]
    input: PathBuf,

    /// Column to analyse
    #[arg(long)]
    value: String,

    /// Geometry column (resolved from aliases when omitted)
    #[arg(long)]
    geometry_column: Option<String>,

    #[arg(short, long, default_value = "lisa.json")]
    output: PathBuf,

    /// Conditional permutations for the pseudo p-value (0 disables)
    #[arg(long, default_value = "999")]
    permutations: usize,

    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Significance level for lisa_significant
    #[arg(long, default_value = "0.05")]
    significance: f64,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let table = Table::read_json(&args.input)
        .with_context(|| format!("Cannot read {}", args.input.display()))?;
    let cfg = LisaConfig {
        permutations: args.permutations,
        seed: args.seed,
        significance: args.significance,
    };
    let (out, summary) = lisa_table(&table, &args.value, args.geometry_column.as_deref(), &cfg)
        .with_context(|| format!("LISA on `{}` failed", args.value))?;
    info!(
        analysed = summary.analysed,
        islands = summary.islands,
        significant = summary.significant,
        excluded = summary.missing_value + summary.bad_geometry,
        "LISA complete"
    );

    out.write_json(&args.output)
        .with_context(|| format!("Cannot write {}", args.output.display()))?;
    Ok(())
}
