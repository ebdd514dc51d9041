//! Column role resolution: statically declared alias tables per role,
//! resolved once per run and failed fast.

use crate::error::SchemaResolutionError;
use crate::table::Table;

/// One way a column name may match a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Exact(&'static str),
    Prefix(&'static str),
    Suffix(&'static str),
}

impl Pattern {
    fn matches(self, column: &str, ignore_case: bool) -> bool {
        let column = if ignore_case { column.to_lowercase() } else { column.to_string() };
        match self {
            Pattern::Exact(p) => column == p,
            Pattern::Prefix(p) => column.starts_with(p),
            Pattern::Suffix(p) => column.ends_with(p),
        }
    }

    fn describe(self) -> String {
        match self {
            Pattern::Exact(p) => p.to_string(),
            Pattern::Prefix(p) => format!("{p}*"),
            Pattern::Suffix(p) => format!("*{p}"),
        }
    }
}

/// A logical column role and its accepted names, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct RoleSpec {
    pub role: &'static str,
    pub patterns: &'static [Pattern],
    pub ignore_case: bool,
}

pub const FINE_ID: RoleSpec = RoleSpec {
    role: "fine id",
    patterns: &[
        Pattern::Exact("h3_r7"),
        Pattern::Exact("r7_id"),
        Pattern::Exact("h3_index"),
        Pattern::Exact("h3"),
        Pattern::Exact("cell_id"),
    ],
    ignore_case: false,
};

pub const COARSE_ID: RoleSpec = RoleSpec {
    role: "coarse id",
    patterns: &[
        Pattern::Exact("h3_r5"),
        Pattern::Exact("r5_id"),
        Pattern::Exact("h3_index"),
        Pattern::Exact("h3"),
        Pattern::Exact("cell_id"),
    ],
    ignore_case: false,
};

pub const GEOMETRY: RoleSpec = RoleSpec {
    role: "geometry",
    patterns: &[Pattern::Exact("geometry"), Pattern::Exact("wkt"), Pattern::Exact("geom")],
    ignore_case: false,
};

/// Names a scoring step typically gives its output column.
pub const PREDICTION: RoleSpec = RoleSpec {
    role: "prediction",
    patterns: &[
        Pattern::Exact("prediction"),
        Pattern::Prefix("prediction_"),
        Pattern::Suffix("_prediction"),
        Pattern::Suffix("_pred"),
        Pattern::Exact("y_pred"),
        Pattern::Exact("score"),
        Pattern::Exact("pred"),
    ],
    ignore_case: true,
};

pub const AREA_WEIGHT_COLUMN: &str = "area_weight";

/// Return the first column matching `spec`. Patterns are tried in priority
/// order; within one pattern the first column in table order wins.
pub fn resolve(table: &Table, spec: &RoleSpec) -> Result<String, SchemaResolutionError> {
    for pattern in spec.patterns {
        if let Some(col) = table
            .columns()
            .iter()
            .find(|c| pattern.matches(c, spec.ignore_case))
        {
            return Ok(col.clone());
        }
    }
    Err(SchemaResolutionError {
        role: spec.role.to_string(),
        tried: spec.patterns.iter().map(|p| p.describe()).collect(),
    })
}

/// Resolve `spec`, unless the caller pinned an explicit column name. A
/// pinned name that is absent is a failure, never a fallback.
pub fn resolve_or_pinned(
    table: &Table,
    spec: &RoleSpec,
    pinned: Option<&str>,
) -> Result<String, SchemaResolutionError> {
    match pinned {
        Some(name) if table.has_column(name) => Ok(name.to_string()),
        Some(name) => Err(SchemaResolutionError {
            role: spec.role.to_string(),
            tried: vec![name.to_string()],
        }),
        None => resolve(table, spec),
    }
}

/// Resolved column names for one side of a disaggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSchema {
    pub id: String,
    pub prediction: String,
    pub geometry: String,
    pub weight: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(cols: &[&str]) -> Table {
        let mut row = serde_json::Map::new();
        for c in cols {
            row.insert(c.to_string(), json!(1));
        }
        Table::from_rows(vec![row])
    }

    #[test]
    fn alias_priority_beats_column_order() {
        let t = table(&["cell_id", "h3", "r7_id"]);
        assert_eq!(resolve(&t, &FINE_ID).unwrap(), "r7_id");
    }

    #[test]
    fn missing_role_names_candidates() {
        let t = table(&["foo", "bar"]);
        let err = resolve(&t, &COARSE_ID).unwrap_err();
        assert_eq!(err.role, "coarse id");
        assert_eq!(err.tried[0], "h3_r5");
        assert_eq!(err.tried.len(), 5);
    }

    #[test]
    fn prediction_patterns_ignore_case() {
        let t = table(&["id", "Target_Pred", "other"]);
        assert_eq!(resolve(&t, &PREDICTION).unwrap(), "Target_Pred");
        let t = table(&["score", "prediction_litpop"]);
        assert_eq!(resolve(&t, &PREDICTION).unwrap(), "prediction_litpop");
    }

    #[test]
    fn ids_are_case_sensitive() {
        let t = table(&["H3"]);
        assert!(resolve(&t, &FINE_ID).is_err());
    }

    #[test]
    fn pinned_name_must_exist() {
        let t = table(&["h3", "my_id"]);
        assert_eq!(resolve_or_pinned(&t, &FINE_ID, Some("my_id")).unwrap(), "my_id");
        let err = resolve_or_pinned(&t, &FINE_ID, Some("nope")).unwrap_err();
        assert_eq!(err.tried, vec!["nope".to_string()]);
        assert_eq!(resolve_or_pinned(&t, &FINE_ID, None).unwrap(), "h3");
    }
}
