//! Run configuration for a disaggregation pass.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, TableError};
use crate::geometry::AreaCrsSetting;
use crate::linkage::LinkMode;
use crate::weights::{WeightMode, DEFAULT_EPSILON};

/// Default relative tolerance of the per-parent conservation check.
pub const DEFAULT_CONSERVATION_TOLERANCE: f64 = 1e-6;

/// Explicit column names that bypass alias resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOverrides {
    pub fine_id: Option<String>,
    pub coarse_id: Option<String>,
    pub fine_prediction: Option<String>,
    pub coarse_prediction: Option<String>,
    pub fine_geometry: Option<String>,
    pub coarse_geometry: Option<String>,
}

/// All knobs of a run. Missing JSON fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisaggConfig {
    /// true: fine predictions are scores (softmax). false: magnitudes.
    pub fine_is_score: bool,
    /// Floor for logarithms.
    pub epsilon: f64,
    /// Projection for overlap areas in fractional mode.
    pub area_crs: AreaCrsSetting,
    pub link_mode: LinkMode,
    pub conservation_tolerance: f64,
    /// Emit `p_hat` in the output table.
    pub include_proportions: bool,
    /// Carry the fine geometry through as WKT.
    pub include_geometry: bool,
    pub columns: ColumnOverrides,
}

impl Default for DisaggConfig {
    fn default() -> Self {
        Self {
            fine_is_score: true,
            epsilon: DEFAULT_EPSILON,
            area_crs: AreaCrsSetting::Auto,
            link_mode: LinkMode::Containment,
            conservation_tolerance: DEFAULT_CONSERVATION_TOLERANCE,
            include_proportions: true,
            include_geometry: false,
            columns: ColumnOverrides::default(),
        }
    }
}

impl DisaggConfig {
    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        let cfg: Self =
            serde_json::from_str(s).map_err(|e| ConfigError::new("config", e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn weight_mode(&self) -> WeightMode {
        WeightMode::from_fine_is_score(self.fine_is_score)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(ConfigError::new("epsilon", format!("must be finite and > 0, got {}", self.epsilon)));
        }
        if !(self.conservation_tolerance.is_finite() && self.conservation_tolerance > 0.0) {
            return Err(ConfigError::new(
                "conservation_tolerance",
                format!("must be finite and > 0, got {}", self.conservation_tolerance),
            ));
        }
        Ok(())
    }
}
