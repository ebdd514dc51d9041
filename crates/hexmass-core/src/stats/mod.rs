//! Spatial autocorrelation over hexagon layers.
pub mod contiguity;
pub mod morans;

pub use contiguity::{queen, Contiguity};
pub use morans::{local_moran, LisaConfig, LocalMoran, Quadrant};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, SchemaResolutionError};
use crate::geometry::wkt::parse_polygonal;
use crate::schema::{resolve_or_pinned, GEOMETRY};
use crate::table::{number, Table};

pub const LISA_I: &str = "lisa_I";
pub const LISA_P: &str = "lisa_p";
pub const LISA_CLUSTER: &str = "lisa_cluster";
pub const LISA_SIGNIFICANT: &str = "lisa_significant";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LisaSummary {
    pub rows: usize,
    pub analysed: usize,
    pub missing_value: usize,
    pub bad_geometry: usize,
    pub islands: usize,
    pub significant: usize,
}

/// Run local Moran's I on `value_column` and return the input rows with the
/// four `lisa_*` columns appended. Rows without a numeric value or a valid
/// polygon are kept but take no part and get nulls.
pub fn lisa_table(
    table: &Table,
    value_column: &str,
    geometry_column: Option<&str>,
    config: &LisaConfig,
) -> Result<(Table, LisaSummary)> {
    let geom_col = resolve_or_pinned(table, &GEOMETRY, geometry_column)?;
    if !table.has_column(value_column) {
        return Err(SchemaResolutionError {
            role: "value".to_string(),
            tried: vec![value_column.to_string()],
        }
        .into());
    }

    let mut summary = LisaSummary { rows: table.len(), ..Default::default() };
    let mut rows_used = Vec::new();
    let mut values = Vec::new();
    let mut polygons = Vec::new();
    for row in 0..table.len() {
        let Some(v) = table.f64_at(row, value_column).filter(|v| v.is_finite()) else {
            summary.missing_value += 1;
            continue;
        };
        let parsed = table
            .str_at(row, &geom_col)
            .ok_or_else(|| "missing geometry".to_string())
            .and_then(|text| parse_polygonal(text, row).map_err(|e| e.reason));
        match parsed {
            Ok(poly) => {
                rows_used.push(row);
                values.push(v);
                polygons.push(poly);
            }
            Err(reason) => {
                warn!(row, %reason, "excluding row from LISA");
                summary.bad_geometry += 1;
            }
        }
    }

    let w = queen(&polygons);
    let lisa = local_moran(&values, &w, config)?;
    summary.analysed = rows_used.len();
    summary.islands = w.islands().len();

    let mut columns = table.columns().to_vec();
    for col in [LISA_I, LISA_P, LISA_CLUSTER, LISA_SIGNIFICANT] {
        if !table.has_column(col) {
            columns.push(col.to_string());
        }
    }
    let mut out = Table::new(columns);
    let mut used = rows_used.iter().enumerate().peekable();
    for (row, record) in table.rows().iter().enumerate() {
        let mut record = record.clone();
        let unit = match used.peek() {
            Some(&(k, &r)) if r == row => {
                used.next();
                Some(k)
            }
            _ => None,
        };
        let (i, p, cluster, significant) = match unit {
            Some(k) => {
                let sig = lisa.is_significant(k, config.significance);
                summary.significant += usize::from(sig);
                (
                    number(lisa.i[k]),
                    lisa.p_sim[k].map(number).unwrap_or(Value::Null),
                    lisa.quadrant[k].map(|q| Value::from(q.code())).unwrap_or(Value::Null),
                    Value::Bool(sig),
                )
            }
            None => (Value::Null, Value::Null, Value::Null, Value::Null),
        };
        record.insert(LISA_I.into(), i);
        record.insert(LISA_P.into(), p);
        record.insert(LISA_CLUSTER.into(), cluster);
        record.insert(LISA_SIGNIFICANT.into(), significant);
        out.push_row(record);
    }
    Ok((out, summary))
}
