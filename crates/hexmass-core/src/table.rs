//! In-memory record tables, read from and written to JSON arrays of objects.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::TableError;

/// One record: column name to cell value, in insertion order.
pub type Row = Map<String, Value>;

/// An ordered set of columns plus rows. A row need not carry every column;
/// absent cells read as missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Create an empty table with the given column order.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from records. Columns are the union of row keys in
    /// first-seen order.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut table = Self::default();
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, registering any column not seen before.
    pub fn push_row(&mut self, row: Row) {
        for key in row.keys() {
            if !self.has_column(key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    /// Numeric view of one cell; see [`value_as_f64`].
    pub fn f64_at(&self, row: usize, column: &str) -> Option<f64> {
        self.rows.get(row)?.get(column).and_then(value_as_f64)
    }

    /// Identifier view of one cell; see [`value_as_id`].
    pub fn id_at(&self, row: usize, column: &str) -> Option<String> {
        self.rows.get(row)?.get(column).and_then(value_as_id)
    }

    /// Text view of one cell. Only JSON strings qualify.
    pub fn str_at(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row)?.get(column).and_then(Value::as_str)
    }

    pub fn from_json_str(s: &str) -> Result<Self, TableError> {
        let value: Value = serde_json::from_str(s)?;
        let Value::Array(items) = value else {
            return Err(TableError::NotRecords(json_kind(&value).to_string()));
        };
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Object(row) => rows.push(row),
                other => {
                    return Err(TableError::NotRecords(format!(
                        "array element of type {}",
                        json_kind(&other)
                    )))
                }
            }
        }
        Ok(Self::from_rows(rows))
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Serialise as an array of records. Each record lists the table's
    /// columns in order; missing cells are written as `null`.
    pub fn to_json_string(&self) -> Result<String, TableError> {
        let records: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut out = Map::with_capacity(self.columns.len());
                for col in &self.columns {
                    out.insert(col.clone(), row.get(col).cloned().unwrap_or(Value::Null));
                }
                Value::Object(out)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        let path = path.as_ref();
        let text = self.to_json_string()?;
        fs::write(path, text).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Coerce a cell to a number: JSON numbers as-is, numeric strings parsed,
/// everything else missing.
pub fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce a cell to an identifier: strings verbatim, numbers by their JSON
/// text. Empty strings and nulls are missing.
pub fn value_as_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Number cell, or `null` when the value is not finite (JSON has no NaN).
pub fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn columns_follow_first_seen_order() {
        let t = Table::from_json_str(r#"[{"b": 1, "a": 2}, {"a": 3, "c": 4}]"#).unwrap();
        assert_eq!(t.columns(), &["b", "a", "c"]);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn numeric_coercion_accepts_strings() {
        assert_eq!(value_as_f64(&json!(2.5)), Some(2.5));
        assert_eq!(value_as_f64(&json!(" 7 ")), Some(7.0));
        assert_eq!(value_as_f64(&json!("n/a")), None);
        assert_eq!(value_as_f64(&Value::Null), None);
    }

    #[test]
    fn numeric_ids_render_as_text() {
        assert_eq!(value_as_id(&json!(42)), Some("42".to_string()));
        assert_eq!(value_as_id(&json!("872a1")), Some("872a1".to_string()));
        assert_eq!(value_as_id(&json!("")), None);
    }

    #[test]
    fn non_array_input_is_rejected() {
        let err = Table::from_json_str(r#"{"a": 1}"#).unwrap_err();
        assert!(matches!(err, TableError::NotRecords(_)));
        let err = Table::from_json_str(r#"[1, 2]"#).unwrap_err();
        assert!(matches!(err, TableError::NotRecords(_)));
    }

    #[test]
    fn missing_cells_serialise_as_null() {
        let t = Table::from_json_str(r#"[{"a": 1}, {"b": "x"}]"#).unwrap();
        let back: Value = serde_json::from_str(&t.to_json_string().unwrap()).unwrap();
        assert_eq!(back, json!([{"a": 1, "b": null}, {"a": null, "b": "x"}]));
    }

    #[test]
    fn non_finite_numbers_become_null() {
        assert_eq!(number(f64::NAN), Value::Null);
        assert_eq!(number(1.5), json!(1.5));
    }
}
