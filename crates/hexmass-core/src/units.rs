//! Fine and coarse spatial units, loaded from record tables.
//!
//! Loading never aborts on a bad row: rows with no id, no usable value,
//! a duplicate id or unparsable geometry are dropped and tallied in
//! [`DropCounts`].

use std::collections::HashSet;

use geo::MultiPolygon;
use serde::Serialize;
use tracing::warn;

use crate::error::GeometryParseError;
use crate::geometry::wkt::parse_polygonal;
use crate::schema::UnitSchema;
use crate::table::Table;

/// A high-resolution cell.
#[derive(Debug, Clone, PartialEq)]
pub struct FineUnit {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    /// Score/logit or non-negative magnitude, depending on the weight mode.
    pub raw_prediction: f64,
    /// Prior area/importance weight, 1.0 when absent.
    pub weight: f64,
}

/// A low-resolution cell carrying the mass to preserve.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseUnit {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub target_mass: f64,
}

/// Rows dropped while loading one table, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub missing_id: usize,
    pub missing_value: usize,
    pub duplicate_id: usize,
    pub bad_geometry: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.missing_id + self.missing_value + self.duplicate_id + self.bad_geometry
    }
}

/// Units that survived loading plus what was dropped on the way.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub units: Vec<T>,
    pub dropped: DropCounts,
    pub geometry_errors: Vec<GeometryParseError>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self { units: Vec::new(), dropped: DropCounts::default(), geometry_errors: Vec::new() }
    }
}

/// Per-row fields shared by both unit kinds.
struct RowParts {
    id: String,
    geometry: MultiPolygon<f64>,
    value: f64,
}

fn load_rows<T>(
    table: &Table,
    schema: &UnitSchema,
    label: &str,
    mut build: impl FnMut(usize, RowParts) -> T,
) -> Loaded<T> {
    let mut out = Loaded { units: Vec::with_capacity(table.len()), ..Default::default() };
    let mut seen: HashSet<String> = HashSet::with_capacity(table.len());

    for row in 0..table.len() {
        let Some(id) = table.id_at(row, &schema.id) else {
            out.dropped.missing_id += 1;
            continue;
        };
        let value = match table.f64_at(row, &schema.prediction) {
            Some(v) if v.is_finite() => v,
            _ => {
                out.dropped.missing_value += 1;
                continue;
            }
        };
        let geometry = match table.str_at(row, &schema.geometry) {
            Some(text) => parse_polygonal(text, row),
            None => Err(GeometryParseError { row, reason: "geometry cell is not text".to_string() }),
        };
        let geometry = match geometry {
            Ok(g) => g,
            Err(e) => {
                warn!(table = label, row, error = %e.reason, "dropping row with unparsable geometry");
                out.dropped.bad_geometry += 1;
                out.geometry_errors.push(e);
                continue;
            }
        };
        if !seen.insert(id.clone()) {
            out.dropped.duplicate_id += 1;
            continue;
        }
        out.units.push(build(row, RowParts { id, geometry, value }));
    }

    if out.dropped.total() > 0 {
        warn!(table = label, dropped = ?out.dropped, "rows dropped while loading units");
    }
    out
}

/// Load fine units. A missing or non-numeric weight cell reads as 1.0.
pub fn load_fine(table: &Table, schema: &UnitSchema) -> Loaded<FineUnit> {
    load_rows(table, schema, "fine", |row, parts| FineUnit {
        id: parts.id,
        geometry: parts.geometry,
        raw_prediction: parts.value,
        weight: schema
            .weight
            .as_deref()
            .and_then(|col| table.f64_at(row, col))
            .unwrap_or(1.0),
    })
}

pub fn load_coarse(table: &Table, schema: &UnitSchema) -> Loaded<CoarseUnit> {
    load_rows(table, schema, "coarse", |_, parts| CoarseUnit {
        id: parts.id,
        geometry: parts.geometry,
        target_mass: parts.value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))";

    fn schema(weight: bool) -> UnitSchema {
        UnitSchema {
            id: "h3".into(),
            prediction: "prediction".into(),
            geometry: "geometry".into(),
            weight: weight.then(|| "area_weight".to_string()),
        }
    }

    #[test]
    fn weight_defaults_to_one() {
        let t = Table::from_json_str(&format!(
            r#"[{{"h3": "a", "prediction": 2, "geometry": "{SQUARE}"}},
                {{"h3": "b", "prediction": 3, "geometry": "{SQUARE}", "area_weight": 0.5}},
                {{"h3": "c", "prediction": 4, "geometry": "{SQUARE}", "area_weight": "x"}}]"#
        ))
        .unwrap();
        let loaded = load_fine(&t, &schema(true));
        let weights: Vec<f64> = loaded.units.iter().map(|u| u.weight).collect();
        assert_eq!(weights, vec![1.0, 0.5, 1.0]);
        let loaded = load_fine(&t, &schema(false));
        assert!(loaded.units.iter().all(|u| u.weight == 1.0));
    }

    #[test]
    fn bad_rows_are_dropped_and_counted() {
        let t = Table::from_json_str(&format!(
            r#"[{{"h3": "a", "prediction": 1, "geometry": "{SQUARE}"}},
                {{"h3": null, "prediction": 1, "geometry": "{SQUARE}"}},
                {{"h3": "b", "prediction": null, "geometry": "{SQUARE}"}},
                {{"h3": "c", "prediction": 1, "geometry": "POLYGON ((0 0"}},
                {{"h3": "d", "prediction": 1, "geometry": 17}},
                {{"h3": "a", "prediction": 5, "geometry": "{SQUARE}"}}]"#
        ))
        .unwrap();
        let loaded = load_coarse(&t, &schema(false));
        assert_eq!(loaded.units.len(), 1);
        assert_eq!(loaded.units[0].target_mass, 1.0);
        assert_eq!(
            loaded.dropped,
            DropCounts { missing_id: 1, missing_value: 1, duplicate_id: 1, bad_geometry: 2 }
        );
        assert_eq!(loaded.geometry_errors.len(), 2);
        assert_eq!(loaded.geometry_errors[0].row, 3);
    }

    #[test]
    fn empty_loaded_needs_no_default_unit() {
        struct Opaque;
        let loaded: Loaded<Opaque> = Loaded::default();
        assert!(loaded.units.is_empty());
        assert_eq!(loaded.dropped.total(), 0);
        assert!(loaded.geometry_errors.is_empty());
    }
}
