/// Disaggregate coarse hexagon predictions onto fine hexagons.
///
/// Reads two JSON record tables (fine and coarse), links every fine unit to
/// its parent(s), splits each parent's prediction by the fine scores and
/// writes the allocation table. Logging goes to stderr, filtered by
/// `HEXMASS_LOG`.
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use hexmass_core::config::DisaggConfig;
use hexmass_core::geometry::AreaCrsSetting;
use hexmass_core::linkage::LinkMode;
use hexmass_core::logging::init_tracing;
use hexmass_core::{run, Table};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "hexmass",
    about = "Mass-preserving disaggregation of coarse hexagon predictions onto fine hexagons"
)]
struct Args {
    /// Fine-resolution table (JSON array of records)
    #[arg(long)]
    fine: PathBuf,

    /// Coarse-resolution table (JSON array of records)
    #[arg(long)]
    coarse: PathBuf,

    /// JSON configuration file; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output table path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write every (fine, coarse) fragment to this path
    #[arg(long)]
    pairs_output: Option<PathBuf>,

    /// Write the run report (JSON) to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Treat fine predictions as non-negative magnitudes instead of scores
    #[arg(long)]
    magnitude: bool,

    /// Split fine units across every parent they overlap
    #[arg(long)]
    fractional: bool,

    /// Projection for overlap areas: "auto" or "EPSG:<code>"
    #[arg(long)]
    area_crs: Option<AreaCrsSetting>,

    /// Floor for logarithms in score mode
    #[arg(long)]
    epsilon: Option<f64>,

    /// Carry fine geometry through as WKT
    #[arg(long)]
    include_geometry: bool,
}

impl Args {
    fn config(&self) -> Result<DisaggConfig> {
        let mut cfg = match &self.config {
            Some(path) => DisaggConfig::from_json_file(path)
                .with_context(|| format!("Cannot load config {}", path.display()))?,
            None => DisaggConfig::default(),
        };
        if self.magnitude {
            cfg.fine_is_score = false;
        }
        if self.fractional {
            cfg.link_mode = LinkMode::Fractional;
        }
        if let Some(crs) = self.area_crs {
            cfg.area_crs = crs;
        }
        if let Some(eps) = self.epsilon {
            cfg.epsilon = eps;
        }
        if self.include_geometry {
            cfg.include_geometry = true;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = args.config()?;

    let fine = Table::read_json(&args.fine)
        .with_context(|| format!("Cannot read fine table {}", args.fine.display()))?;
    let coarse = Table::read_json(&args.coarse)
        .with_context(|| format!("Cannot read coarse table {}", args.coarse.display()))?;
    info!(fine_rows = fine.len(), coarse_rows = coarse.len(), "tables loaded");

    let out = run(&fine, &coarse, &cfg).context("Disaggregation failed")?;

    let table = out.output_table();
    match &args.output {
        Some(path) => {
            table
                .write_json(path)
                .with_context(|| format!("Cannot write {}", path.display()))?;
            info!(rows = table.len(), path = %path.display(), "output written");
        }
        None => println!("{}", table.to_json_string()?),
    }

    if let Some(path) = &args.pairs_output {
        out.pairs_table()
            .write_json(path)
            .with_context(|| format!("Cannot write {}", path.display()))?;
    }
    if let Some(path) = &args.report {
        let text = serde_json::to_string_pretty(&out.report)?;
        fs::write(path, text).with_context(|| format!("Cannot write {}", path.display()))?;
    }

    info!(
        max_abs_error = out.report.conservation.max_abs_error,
        unlinked_fine = out.report.unlinked_fine,
        "done"
    );
    Ok(())
}
