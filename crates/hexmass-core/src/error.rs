//! Error types shared by every stage of the crate.

use std::path::PathBuf;

/// A required column role could not be matched to any column of a table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("could not resolve {role} column; tried {tried:?}")]
pub struct SchemaResolutionError {
    pub role: String,
    pub tried: Vec<String>,
}

/// A single row's geometry cell could not be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("row {row}: {reason}")]
pub struct GeometryParseError {
    pub row: usize,
    pub reason: String,
}

/// Reading or writing a JSON record table failed.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected an array of record objects, found {0}")]
    NotRecords(String),
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid configuration `{field}`: {reason}")]
pub struct ConfigError {
    pub field: String,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

/// Top-level error for every fallible operation in the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("schema resolution failed: {0}")]
    Schema(#[from] SchemaResolutionError),

    #[error("geometry parse failed: {0}")]
    Geometry(#[from] GeometryParseError),

    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no fine unit could be linked to a coarse unit ({fine_units} fine, {coarse_units} coarse)")]
    NoLinkage { fine_units: usize, coarse_units: usize },

    #[error(
        "mass conservation violated for coarse unit {coarse_id}: allocated {allocated}, target {target}"
    )]
    MassConservation {
        coarse_id: String,
        allocated: f64,
        target: f64,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
