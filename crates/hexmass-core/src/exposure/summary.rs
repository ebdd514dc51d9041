//! Spread and cost summaries of exposure points, overall and split by
//! settlement type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{mean, parse_points, COST_COLUMN, POINT_WKT_COLUMN};
use crate::error::{Result, SchemaResolutionError};
use crate::geometry::sphere::{mean_centroid, mean_distance_to_centroid_km};
use crate::table::{number, Row, Table};

pub const SETTLEMENT_COLUMN: &str = "SETTLEMENT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureStatsConfig {
    pub point_wkt_column: String,
    pub settlement_column: String,
    pub cost_column: String,
}

impl Default for ExposureStatsConfig {
    fn default() -> Self {
        Self {
            point_wkt_column: POINT_WKT_COLUMN.to_string(),
            settlement_column: SETTLEMENT_COLUMN.to_string(),
            cost_column: COST_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Urban,
    Rural,
}

/// Substring match, urban checked first. Anything else is unclassified.
fn classify(v: Option<&Value>) -> Option<Settlement> {
    let text = match v? {
        Value::String(s) => s.trim().to_lowercase(),
        Value::Null => return None,
        other => other.to_string().to_lowercase(),
    };
    if text.contains("urban") {
        Some(Settlement::Urban)
    } else if text.contains("rural") {
        Some(Settlement::Rural)
    } else {
        None
    }
}

/// Summary of one group of points. Every field but `count` is `None` for an
/// empty group; the cost mean is also `None` when no cost parses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub group: String,
    pub count: usize,
    pub mean_distance_to_centroid_km: Option<f64>,
    pub centroid_lat: Option<f64>,
    pub centroid_lon: Option<f64>,
    pub avg_total_repl_cost_usd: Option<f64>,
}

impl GroupStats {
    fn compute(group: &str, coords: &[(f64, f64)], costs: &[f64]) -> Self {
        let centroid = mean_centroid(coords);
        Self {
            group: group.to_string(),
            count: coords.len(),
            mean_distance_to_centroid_km: mean_distance_to_centroid_km(coords),
            centroid_lat: centroid.map(|c| c.0),
            centroid_lon: centroid.map(|c| c.1),
            avg_total_repl_cost_usd: mean(costs),
        }
    }
}

/// `Overall`, `Urban` and `Rural` statistics, in that order. Rows whose
/// point WKT is missing or unparsable are left out of every group.
pub fn summarize_exposure(points: &Table, config: &ExposureStatsConfig) -> Result<Vec<GroupStats>> {
    if !points.is_empty() && !points.has_column(&config.point_wkt_column) {
        return Err(SchemaResolutionError {
            role: "point geometry".to_string(),
            tried: vec![config.point_wkt_column.clone()],
        }
        .into());
    }
    let parsed = parse_points(points, &config.point_wkt_column);
    debug!(
        parsed = parsed.points.len(),
        missing = parsed.missing,
        unparsable = parsed.unparsable,
        "exposure points read"
    );

    let mut all = (Vec::new(), Vec::new());
    let mut urban = (Vec::new(), Vec::new());
    let mut rural = (Vec::new(), Vec::new());
    for &(row, p) in &parsed.points {
        let coord = (p.y(), p.x());
        let cost = points.f64_at(row, &config.cost_column);
        let settlement = classify(points.rows()[row].get(&config.settlement_column));
        let mut targets = vec![&mut all];
        match settlement {
            Some(Settlement::Urban) => targets.push(&mut urban),
            Some(Settlement::Rural) => targets.push(&mut rural),
            None => {}
        }
        for (coords, costs) in targets {
            coords.push(coord);
            costs.extend(cost);
        }
    }

    Ok(vec![
        GroupStats::compute("Overall", &all.0, &all.1),
        GroupStats::compute("Urban", &urban.0, &urban.1),
        GroupStats::compute("Rural", &rural.0, &rural.1),
    ])
}

/// Record table with the report's customary column names.
pub fn to_table(stats: &[GroupStats]) -> Table {
    let opt = |v: Option<f64>| v.map(number).unwrap_or(Value::Null);
    let mut table = Table::new([
        "Group",
        "Count",
        "Mean_Distance_to_Centroid_km",
        "Centroid_Lat",
        "Centroid_Lon",
        "Avg_Total_Repl_Cost_USD",
    ]);
    for s in stats {
        let mut row = Row::new();
        row.insert("Group".into(), Value::String(s.group.clone()));
        row.insert("Count".into(), Value::from(s.count));
        row.insert("Mean_Distance_to_Centroid_km".into(), opt(s.mean_distance_to_centroid_km));
        row.insert("Centroid_Lat".into(), opt(s.centroid_lat));
        row.insert("Centroid_Lon".into(), opt(s.centroid_lon));
        row.insert("Avg_Total_Repl_Cost_USD".into(), opt(s.avg_total_repl_cost_usd));
        table.push_row(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> Table {
        Table::from_json_str(
            r#"[
                {"GEOPOINT_WKT": "POINT (120 10)", "SETTLEMENT": "Urban core", "TOTAL_REPL_COST_USD": 100},
                {"GEOPOINT_WKT": "POINT (122 10)", "SETTLEMENT": " URBAN", "TOTAL_REPL_COST_USD": "300"},
                {"GEOPOINT_WKT": "POINT (121 12)", "SETTLEMENT": "rural", "TOTAL_REPL_COST_USD": null},
                {"GEOPOINT_WKT": "POINT (121 11)", "SETTLEMENT": "unknown", "TOTAL_REPL_COST_USD": 50},
                {"GEOPOINT_WKT": "garbage", "SETTLEMENT": "Urban", "TOTAL_REPL_COST_USD": 1e9}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn groups_are_split_by_settlement() {
        let stats = summarize_exposure(&sample(), &ExposureStatsConfig::default()).unwrap();
        let names: Vec<&str> = stats.iter().map(|s| s.group.as_str()).collect();
        assert_eq!(names, ["Overall", "Urban", "Rural"]);
        assert_eq!(stats[0].count, 4);
        assert_eq!(stats[1].count, 2);
        assert_eq!(stats[2].count, 1);
    }

    #[test]
    fn centroid_and_cost_means() {
        let stats = summarize_exposure(&sample(), &ExposureStatsConfig::default()).unwrap();
        let overall = &stats[0];
        assert_relative_eq!(overall.centroid_lat.unwrap(), 10.75, epsilon = 1e-12);
        assert_relative_eq!(overall.centroid_lon.unwrap(), 121.0, epsilon = 1e-12);
        assert_relative_eq!(overall.avg_total_repl_cost_usd.unwrap(), 150.0, epsilon = 1e-12);

        let urban = &stats[1];
        assert_relative_eq!(urban.centroid_lon.unwrap(), 121.0, epsilon = 1e-12);
        // Both points sit one degree of longitude at 10°N from the centroid.
        let d = urban.mean_distance_to_centroid_km.unwrap();
        assert!((d - 109.5).abs() < 0.2, "d={d}");

        let rural = &stats[2];
        assert_eq!(rural.mean_distance_to_centroid_km, Some(0.0));
        assert_eq!(rural.avg_total_repl_cost_usd, None);
    }

    #[test]
    fn empty_group_is_null() {
        let points = Table::from_json_str(r#"[{"GEOPOINT_WKT": "POINT (0 0)", "SETTLEMENT": "Urban"}]"#).unwrap();
        let stats = summarize_exposure(&points, &ExposureStatsConfig::default()).unwrap();
        let rural = &stats[2];
        assert_eq!(rural.count, 0);
        assert_eq!(rural.centroid_lat, None);
        assert_eq!(rural.mean_distance_to_centroid_km, None);

        let table = to_table(&stats);
        assert_eq!(table.rows()[2]["Centroid_Lat"], Value::Null);
        assert_eq!(table.rows()[2]["Count"], Value::from(0));
    }

    #[test]
    fn missing_point_column_fails() {
        let points = Table::from_json_str(r#"[{"WKT": "POINT (0 0)"}]"#).unwrap();
        assert!(summarize_exposure(&points, &ExposureStatsConfig::default()).is_err());
    }
}
