//! End-to-end runs of the disaggregation pipeline on small hand-made grids.

use approx::assert_abs_diff_eq;
use hexmass_core::config::DisaggConfig;
use hexmass_core::geometry::{AreaCrs, AreaCrsSetting};
use hexmass_core::linkage::LinkMode;
use hexmass_core::{run, Error, Table};
use proptest::prelude::*;
use serde_json::{json, Value};

fn square(x0: f64, y0: f64, size: f64) -> String {
    let (x1, y1) = (x0 + size, y0 + size);
    format!("POLYGON (({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))")
}

fn table(rows: Vec<Value>) -> Table {
    Table::from_json_str(&Value::Array(rows).to_string()).unwrap()
}

/// One coarse unit `P` over [0, 10]² and fine units in a row inside it.
fn single_parent(preds: &[f64], target: f64) -> (Table, Table) {
    let fine = preds
        .iter()
        .enumerate()
        .map(|(k, p)| json!({"h3_r7": format!("f{k}"), "prediction": p, "geometry": square(0.1 + k as f64 * 0.01, 0.1, 0.005)}))
        .collect();
    let coarse = vec![json!({"h3_r5": "P", "prediction": target, "geometry": square(0.0, 0.0, 10.0)})];
    (table(fine), table(coarse))
}

fn masses(out: &Table) -> Vec<f64> {
    out.rows().iter().map(|r| r["allocated_mass"].as_f64().unwrap()).collect()
}

#[test]
fn magnitude_split_is_proportional() {
    let (fine, coarse) = single_parent(&[1.0, 2.0, 3.0], 100.0);
    let cfg = DisaggConfig { fine_is_score: false, ..Default::default() };
    let out = run(&fine, &coarse, &cfg).unwrap();
    let m = masses(&out.output_table());
    assert_abs_diff_eq!(m[0], 100.0 / 6.0, epsilon = 1e-9);
    assert_abs_diff_eq!(m[1], 200.0 / 6.0, epsilon = 1e-9);
    assert_abs_diff_eq!(m[2], 50.0, epsilon = 1e-9);
}

#[test]
fn equal_scores_split_evenly() {
    let (fine, coarse) = single_parent(&[0.0, 0.0, 0.0], 9.0);
    let out = run(&fine, &coarse, &DisaggConfig::default()).unwrap();
    let table = out.output_table();
    assert_eq!(table.columns(), ["fine_id", "coarse_id", "allocated_mass", "p_hat"]);
    for m in masses(&table) {
        assert_abs_diff_eq!(m, 3.0, epsilon = 1e-12);
    }
    assert_eq!(table.rows()[0]["coarse_id"], json!("P"));
}

#[test]
fn all_zero_magnitudes_fall_back_to_uniform() {
    let (fine, coarse) = single_parent(&[0.0, 0.0, 0.0, 0.0], 8.0);
    let cfg = DisaggConfig { fine_is_score: false, ..Default::default() };
    let out = run(&fine, &coarse, &cfg).unwrap();
    assert_eq!(out.report.degenerate_groups, 1);
    for m in masses(&out.output_table()) {
        assert_abs_diff_eq!(m, 2.0, epsilon = 1e-12);
    }
}

#[test]
fn straddling_unit_collects_from_both_parents() {
    let fine = table(vec![
        json!({"h3_r7": "A", "prediction": 0.0, "geometry": square(0.5, 0.0, 1.0)}),
        json!({"h3_r7": "B", "prediction": 0.0, "geometry": square(0.1, 0.1, 0.3)}),
    ]);
    let coarse = table(vec![
        json!({"h3_r5": "L", "prediction": 30.0, "geometry": square(0.0, 0.0, 1.0)}),
        json!({"h3_r5": "R", "prediction": 10.0, "geometry": square(1.0, 0.0, 1.0)}),
    ]);
    let cfg = DisaggConfig {
        link_mode: LinkMode::Fractional,
        area_crs: AreaCrsSetting::Fixed(AreaCrs::EqualAreaCylindrical),
        ..Default::default()
    };
    let out = run(&fine, &coarse, &cfg).unwrap();

    let pairs = out.pairs_table();
    assert_eq!(pairs.len(), 3);
    for row in pairs.rows().iter().filter(|r| r["fine_id"] == json!("A")) {
        assert_abs_diff_eq!(row["overlap_fraction"].as_f64().unwrap(), 0.5, epsilon = 1e-9);
    }

    // In L: A carries ln 0.5, B carries ln 1, so A gets 1/3 of 30. R goes to A alone.
    let totals = out.output_table();
    assert_eq!(totals.columns(), ["fine_id", "allocated_mass"]);
    let m = masses(&totals);
    assert_abs_diff_eq!(m[0], 20.0, epsilon = 1e-9);
    assert_abs_diff_eq!(m[1], 20.0, epsilon = 1e-9);
    assert_eq!(out.report.area_crs.as_deref(), Some("EPSG:6933"));
}

#[test]
fn containment_gives_each_fine_unit_one_parent() {
    let fine = table(vec![
        json!({"h3_r7": "a", "prediction": 1.0, "geometry": square(0.2, 0.2, 0.1)}),
        json!({"h3_r7": "b", "prediction": 1.0, "geometry": square(5.0, 5.0, 0.1)}),
    ]);
    // Both parents cover `a`; the first listed wins.
    let coarse = table(vec![
        json!({"h3_r5": "first", "prediction": 4.0, "geometry": square(0.0, 0.0, 1.0)}),
        json!({"h3_r5": "second", "prediction": 6.0, "geometry": square(0.0, 0.0, 2.0)}),
        json!({"h3_r5": "empty", "prediction": 5.0, "geometry": square(20.0, 20.0, 1.0)}),
    ]);
    let out = run(&fine, &coarse, &DisaggConfig::default()).unwrap();
    let t = out.output_table();
    assert_eq!(t.len(), 1);
    assert_eq!(t.rows()[0]["coarse_id"], json!("first"));
    assert_eq!(out.report.unlinked_fine, 1);
    assert_eq!(out.report.unallocated_coarse, 2);
    assert_abs_diff_eq!(out.report.unallocated_mass, 11.0);
}

#[test]
fn reruns_are_identical() {
    let (fine, coarse) = single_parent(&[0.3, -1.2, 2.5, 0.0], 123.456);
    let cfg = DisaggConfig { include_geometry: true, ..Default::default() };
    let a = run(&fine, &coarse, &cfg).unwrap();
    let b = run(&fine, &coarse, &cfg).unwrap();
    assert_eq!(a.output_table().to_json_string().unwrap(), b.output_table().to_json_string().unwrap());
    assert!(a.output_table().has_column("geometry"));
}

#[test]
fn unusable_rows_are_counted() {
    let fine = table(vec![
        json!({"h3_r7": "a", "prediction": 1.0, "geometry": square(0.2, 0.2, 0.1)}),
        json!({"h3_r7": "a", "prediction": 2.0, "geometry": square(0.4, 0.2, 0.1)}),
        json!({"h3_r7": "c", "prediction": null, "geometry": square(0.6, 0.2, 0.1)}),
        json!({"h3_r7": null, "prediction": 1.0, "geometry": square(0.6, 0.2, 0.1)}),
        json!({"h3_r7": "e", "prediction": 1.0, "geometry": "POLYGON (("}),
    ]);
    let coarse = table(vec![json!({"h3_r5": "P", "prediction": 7.0, "geometry": square(0.0, 0.0, 1.0)})]);
    let out = run(&fine, &coarse, &DisaggConfig::default()).unwrap();
    let d = &out.report.fine_dropped;
    assert_eq!((d.duplicate_id, d.missing_value, d.missing_id, d.bad_geometry), (1, 1, 1, 1));
    assert_abs_diff_eq!(masses(&out.output_table())[0], 7.0, epsilon = 1e-12);
}

#[test]
fn missing_prediction_column_fails_fast() {
    let fine = table(vec![json!({"h3_r7": "a", "value": 1.0, "geometry": square(0.2, 0.2, 0.1)})]);
    let coarse = table(vec![json!({"h3_r5": "P", "prediction": 7.0, "geometry": square(0.0, 0.0, 1.0)})]);
    let err = run(&fine, &coarse, &DisaggConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Schema(ref e) if e.role == "prediction"), "{err}");
}

#[test]
fn disjoint_layers_report_no_linkage() {
    let fine = table(vec![json!({"h3_r7": "a", "prediction": 1.0, "geometry": square(50.0, 50.0, 0.1)})]);
    let coarse = table(vec![json!({"h3_r5": "P", "prediction": 7.0, "geometry": square(0.0, 0.0, 1.0)})]);
    let err = run(&fine, &coarse, &DisaggConfig::default()).unwrap_err();
    assert!(matches!(err, Error::NoLinkage { fine_units: 1, coarse_units: 1 }));
}

#[test]
fn pinned_columns_override_aliases() {
    let fine = table(vec![json!({"hex": "a", "y_hat": 1.0, "shape": square(0.2, 0.2, 0.1)})]);
    let coarse = table(vec![json!({"parent": "P", "total": 7.0, "shape": square(0.0, 0.0, 1.0)})]);
    let cfg = DisaggConfig::from_json_str(
        r#"{"columns": {"fine_id": "hex", "fine_prediction": "y_hat", "fine_geometry": "shape",
                        "coarse_id": "parent", "coarse_prediction": "total", "coarse_geometry": "shape"}}"#,
    )
    .unwrap();
    let out = run(&fine, &coarse, &cfg).unwrap();
    assert_eq!(out.report.fine_id_column, "hex");
    assert_abs_diff_eq!(masses(&out.output_table())[0], 7.0);
}

proptest! {
    #[test]
    fn every_parent_is_conserved(
        preds in prop::collection::vec(-50.0f64..50.0, 1..12),
        target in -1.0e3f64..1.0e6,
        score in any::<bool>(),
    ) {
        let (fine, coarse) = single_parent(&preds, target);
        let cfg = DisaggConfig { fine_is_score: score, ..Default::default() };
        let out = run(&fine, &coarse, &cfg).unwrap();
        let total: f64 = masses(&out.output_table()).iter().sum();
        prop_assert!((total - target).abs() <= 1e-9 * target.abs().max(1.0));
        for m in masses(&out.output_table()) {
            if target >= 0.0 {
                prop_assert!(m >= 0.0);
            }
        }
    }
}
