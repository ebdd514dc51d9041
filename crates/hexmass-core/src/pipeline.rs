//! Disaggregation orchestrator: runs all stages in order.
//!
//! Pipeline order:
//!   1. Resolve column roles on both tables (fail fast)
//!   2. Load fine and coarse units, dropping unusable rows
//!   3. Link fine units to coarse units
//!   4. Per-parent proportions
//!   5. Allocate and verify conservation

use std::collections::BTreeSet;

use geo::Rect;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, info_span, warn};

use crate::allocate::{allocate, check_conservation, fine_totals, ConservationReport};
use crate::config::DisaggConfig;
use crate::error::{Error, Result};
use crate::geometry::{bbox, wkt::to_wkt, AreaCrs};
use crate::linkage::{link_containment, link_fractional, LinkMode};
use crate::schema::{
    resolve_or_pinned, UnitSchema, AREA_WEIGHT_COLUMN, COARSE_ID, FINE_ID, GEOMETRY, PREDICTION,
};
use crate::table::{number, Row, Table};
use crate::units::{load_coarse, load_fine, DropCounts, FineUnit};
use crate::weights::{proportions, WeightMode};

// ── Output rows ──────────────────────────────────────────────────────────────

/// One (fine, coarse) fragment of the result.
#[derive(Debug, Clone, PartialEq)]
pub struct PairRow {
    pub fine_id: String,
    pub coarse_id: String,
    pub overlap_fraction: f64,
    pub p_hat: f64,
    pub allocated_mass: f64,
}

/// Total mass received by one fine unit.
#[derive(Debug, Clone, PartialEq)]
pub struct FineTotalRow {
    pub fine_id: String,
    pub allocated_mass: f64,
    pub geometry_wkt: Option<String>,
}

/// Diagnostics for one run. Everything dropped or left unallocated is
/// counted here rather than discarded silently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisaggReport {
    pub link_mode: LinkMode,
    pub weight_mode: WeightMode,
    pub fine_id_column: String,
    pub coarse_id_column: String,
    pub fine_rows: usize,
    pub coarse_rows: usize,
    pub fine_dropped: DropCounts,
    pub coarse_dropped: DropCounts,
    pub link_rows: usize,
    pub unlinked_fine: usize,
    pub unallocated_coarse: usize,
    pub unallocated_mass: f64,
    pub degenerate_groups: usize,
    /// Projection used for overlap areas (fractional mode only).
    pub area_crs: Option<String>,
    pub conservation: ConservationReport,
}

#[derive(Debug, Clone)]
pub struct DisaggOutput {
    pub pairs: Vec<PairRow>,
    pub fine_totals: Vec<FineTotalRow>,
    pub report: DisaggReport,
    include_proportions: bool,
    include_geometry: bool,
    /// Fine geometry WKT per pair, when requested.
    pair_geometry: Vec<Option<String>>,
}

impl DisaggOutput {
    /// The primary output table.
    ///
    /// Containment: one row per linked fine unit with its parent.
    /// Fractional: one row per fine unit with its summed allocation.
    pub fn output_table(&self) -> Table {
        match self.report.link_mode {
            LinkMode::Containment => {
                let mut cols = vec!["fine_id", "coarse_id", "allocated_mass"];
                if self.include_proportions {
                    cols.push("p_hat");
                }
                if self.include_geometry {
                    cols.push("geometry");
                }
                let mut table = Table::new(cols);
                for (pair, geom) in self.pairs.iter().zip(&self.pair_geometry) {
                    let mut row = Row::new();
                    row.insert("fine_id".into(), Value::String(pair.fine_id.clone()));
                    row.insert("coarse_id".into(), Value::String(pair.coarse_id.clone()));
                    row.insert("allocated_mass".into(), number(pair.allocated_mass));
                    if self.include_proportions {
                        row.insert("p_hat".into(), number(pair.p_hat));
                    }
                    if let Some(wkt) = geom {
                        row.insert("geometry".into(), Value::String(wkt.clone()));
                    }
                    table.push_row(row);
                }
                table
            }
            LinkMode::Fractional => {
                let mut cols = vec!["fine_id", "allocated_mass"];
                if self.include_geometry {
                    cols.push("geometry");
                }
                let mut table = Table::new(cols);
                for total in &self.fine_totals {
                    let mut row = Row::new();
                    row.insert("fine_id".into(), Value::String(total.fine_id.clone()));
                    row.insert("allocated_mass".into(), number(total.allocated_mass));
                    if let Some(wkt) = &total.geometry_wkt {
                        row.insert("geometry".into(), Value::String(wkt.clone()));
                    }
                    table.push_row(row);
                }
                table
            }
        }
    }

    /// Every fragment with its overlap, proportion and mass, for auditing.
    pub fn pairs_table(&self) -> Table {
        let mut table =
            Table::new(["fine_id", "coarse_id", "overlap_fraction", "p_hat", "allocated_mass"]);
        for pair in &self.pairs {
            let mut row = Row::new();
            row.insert("fine_id".into(), Value::String(pair.fine_id.clone()));
            row.insert("coarse_id".into(), Value::String(pair.coarse_id.clone()));
            row.insert("overlap_fraction".into(), number(pair.overlap_fraction));
            row.insert("p_hat".into(), number(pair.p_hat));
            row.insert("allocated_mass".into(), number(pair.allocated_mass));
            table.push_row(row);
        }
        table
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Resolve the fine table's roles. `area_weight` is optional.
pub fn resolve_fine_schema(table: &Table, config: &DisaggConfig) -> Result<UnitSchema> {
    let cols = &config.columns;
    Ok(UnitSchema {
        id: resolve_or_pinned(table, &FINE_ID, cols.fine_id.as_deref())?,
        prediction: resolve_or_pinned(table, &PREDICTION, cols.fine_prediction.as_deref())?,
        geometry: resolve_or_pinned(table, &GEOMETRY, cols.fine_geometry.as_deref())?,
        weight: table
            .has_column(AREA_WEIGHT_COLUMN)
            .then(|| AREA_WEIGHT_COLUMN.to_string()),
    })
}

pub fn resolve_coarse_schema(table: &Table, config: &DisaggConfig) -> Result<UnitSchema> {
    let cols = &config.columns;
    Ok(UnitSchema {
        id: resolve_or_pinned(table, &COARSE_ID, cols.coarse_id.as_deref())?,
        prediction: resolve_or_pinned(table, &PREDICTION, cols.coarse_prediction.as_deref())?,
        geometry: resolve_or_pinned(table, &GEOMETRY, cols.coarse_geometry.as_deref())?,
        weight: None,
    })
}

/// Run one disaggregation pass over a fine and a coarse table.
pub fn run(fine_table: &Table, coarse_table: &Table, config: &DisaggConfig) -> Result<DisaggOutput> {
    let span = info_span!("disaggregate", mode = ?config.link_mode);
    let _enter = span.enter();

    config.validate()?;

    // ── 1. Schema ───────────────────────────────────────────────────────────
    let fine_schema = resolve_fine_schema(fine_table, config)?;
    let coarse_schema = resolve_coarse_schema(coarse_table, config)?;
    info!(
        fine_id = %fine_schema.id,
        fine_pred = %fine_schema.prediction,
        coarse_id = %coarse_schema.id,
        coarse_pred = %coarse_schema.prediction,
        area_weight = fine_schema.weight.is_some(),
        "resolved columns"
    );

    // ── 2. Units ────────────────────────────────────────────────────────────
    let fine = load_fine(fine_table, &fine_schema);
    let coarse = load_coarse(coarse_table, &coarse_schema);

    // ── 3. Linkage ──────────────────────────────────────────────────────────
    let (outcome, crs) = match config.link_mode {
        LinkMode::Containment => (link_containment(&fine.units, &coarse.units), None),
        LinkMode::Fractional => {
            let crs = config.area_crs.resolve(extent(&fine.units));
            (link_fractional(&fine.units, &coarse.units, crs), Some(crs))
        }
    };
    if outcome.links.is_empty() {
        return Err(Error::NoLinkage {
            fine_units: fine.units.len(),
            coarse_units: coarse.units.len(),
        });
    }
    if outcome.unlinked_fine > 0 {
        warn!(count = outcome.unlinked_fine, "fine units with no parent were excluded");
    }

    // ── 4. Proportions ──────────────────────────────────────────────────────
    let mode = config.weight_mode();
    let use_overlap = config.link_mode == LinkMode::Fractional;
    let props = proportions(&outcome.links, &fine.units, mode, use_overlap, config.epsilon);
    if props.degenerate_groups > 0 {
        warn!(groups = props.degenerate_groups, "degenerate weight groups split uniformly");
    }

    // ── 5. Allocation ───────────────────────────────────────────────────────
    let allocs = allocate(&outcome.links, &props.p_hat, &coarse.units);
    let conservation = check_conservation(&allocs, &coarse.units);
    info!(
        parents = conservation.parents_checked,
        max_abs_error = conservation.max_abs_error,
        "max parent mass error"
    );
    if !(conservation.max_rel_error <= config.conservation_tolerance) {
        let ci = conservation.worst_parent.unwrap_or_default();
        let allocated: f64 = allocs.iter().filter(|a| a.coarse == ci).map(|a| a.allocated_mass).sum();
        return Err(Error::MassConservation {
            coarse_id: coarse.units[ci].id.clone(),
            allocated,
            target: coarse.units[ci].target_mass,
        });
    }

    let linked_parents: BTreeSet<usize> = outcome.links.iter().map(|l| l.coarse).collect();
    let (unallocated_coarse, unallocated_mass) = coarse
        .units
        .iter()
        .enumerate()
        .filter(|(i, _)| !linked_parents.contains(i))
        .fold((0usize, 0.0f64), |(n, m), (_, c)| (n + 1, m + c.target_mass));
    if unallocated_coarse > 0 {
        warn!(count = unallocated_coarse, mass = unallocated_mass, "coarse units received no fine units");
    }

    let geometry_of = |fi: usize| config.include_geometry.then(|| to_wkt(&fine.units[fi].geometry));
    let pairs: Vec<PairRow> = allocs
        .iter()
        .map(|a| PairRow {
            fine_id: fine.units[a.fine].id.clone(),
            coarse_id: coarse.units[a.coarse].id.clone(),
            overlap_fraction: a.overlap_fraction,
            p_hat: a.p_hat,
            allocated_mass: a.allocated_mass,
        })
        .collect();
    let pair_geometry = allocs.iter().map(|a| geometry_of(a.fine)).collect();
    let totals = fine_totals(&allocs)
        .into_iter()
        .map(|(fi, mass)| FineTotalRow {
            fine_id: fine.units[fi].id.clone(),
            allocated_mass: mass,
            geometry_wkt: geometry_of(fi),
        })
        .collect();

    let report = DisaggReport {
        link_mode: config.link_mode,
        weight_mode: mode,
        fine_id_column: fine_schema.id,
        coarse_id_column: coarse_schema.id,
        fine_rows: fine_table.len(),
        coarse_rows: coarse_table.len(),
        fine_dropped: fine.dropped,
        coarse_dropped: coarse.dropped,
        link_rows: outcome.links.len(),
        unlinked_fine: outcome.unlinked_fine,
        unallocated_coarse,
        unallocated_mass,
        degenerate_groups: props.degenerate_groups,
        area_crs: crs.map(|c: AreaCrs| c.to_string()),
        conservation,
    };
    info!(links = report.link_rows, fine_units = fine.units.len(), "disaggregation complete");

    Ok(DisaggOutput {
        pairs,
        fine_totals: totals,
        report,
        include_proportions: config.include_proportions,
        include_geometry: config.include_geometry,
        pair_geometry,
    })
}

/// Union of the units' bounding boxes in lon/lat.
fn extent(units: &[FineUnit]) -> Option<Rect<f64>> {
    units.iter().filter_map(|u| bbox(&u.geometry)).reduce(|a, b| {
        Rect::new(
            geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
            geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_spans_all_units() {
        let units: Vec<FineUnit> = ["POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))", "POLYGON ((3 -2, 4 -2, 4 -1, 3 -1, 3 -2))"]
            .iter()
            .map(|w| FineUnit {
                id: String::new(),
                geometry: crate::geometry::wkt::parse_polygonal(w, 0).unwrap(),
                raw_prediction: 0.0,
                weight: 1.0,
            })
            .collect();
        let r = extent(&units).unwrap();
        assert_eq!((r.min().x, r.min().y, r.max().x, r.max().y), (0.0, -2.0, 4.0, 1.0));
        assert!(extent(&[]).is_none());
    }
}
