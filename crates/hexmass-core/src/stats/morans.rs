//! Local Moran's I with conditional-permutation pseudo p-values.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use super::contiguity::Contiguity;
use crate::error::{ConfigError, Result};

pub const DEFAULT_PERMUTATIONS: usize = 999;
pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;
pub const DEFAULT_SEED: u64 = 12345;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LisaConfig {
    /// 0 disables the permutation test.
    pub permutations: usize,
    pub seed: u64,
    pub significance: f64,
}

impl Default for LisaConfig {
    fn default() -> Self {
        Self {
            permutations: DEFAULT_PERMUTATIONS,
            seed: DEFAULT_SEED,
            significance: DEFAULT_SIGNIFICANCE,
        }
    }
}

impl LisaConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(ConfigError::new(
                "significance",
                format!("must lie in (0, 1), got {}", self.significance),
            ));
        }
        Ok(())
    }
}

/// Moran scatterplot quadrant of a unit: own deviation vs. neighbour lag.
/// A zero deviation counts as low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quadrant {
    HighHigh = 1,
    LowHigh = 2,
    LowLow = 3,
    HighLow = 4,
}

impl Quadrant {
    fn of(z: f64, lag: f64) -> Self {
        match (z > 0.0, lag > 0.0) {
            (true, true) => Quadrant::HighHigh,
            (false, true) => Quadrant::LowHigh,
            (false, false) => Quadrant::LowLow,
            (true, false) => Quadrant::HighLow,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalMoran {
    pub i: Vec<f64>,
    /// `None` for islands, for a constant variable, or when permutations are off.
    pub p_sim: Vec<Option<f64>>,
    /// `None` for islands.
    pub quadrant: Vec<Option<Quadrant>>,
}

impl LocalMoran {
    pub fn is_significant(&self, unit: usize, level: f64) -> bool {
        self.p_sim[unit].is_some_and(|p| p < level)
    }
}

/// Local Moran's I of `y` under row-standardised weights `w`.
///
/// `I_i = (n - 1) z_i lag_i / Σz²`. The pseudo p-value compares `I_i` with
/// values obtained by drawing the unit's neighbours at random from the
/// other `n - 1` units, folded to the smaller tail.
pub fn local_moran(y: &[f64], w: &Contiguity, config: &LisaConfig) -> Result<LocalMoran> {
    config.validate()?;
    if y.len() != w.len() {
        return Err(ConfigError::new(
            "values",
            format!("{} values for {} spatial units", y.len(), w.len()),
        )
        .into());
    }
    let n = y.len();
    if n == 0 {
        return Ok(LocalMoran { i: Vec::new(), p_sim: Vec::new(), quadrant: Vec::new() });
    }

    let mean = y.iter().sum::<f64>() / n as f64;
    let z: Vec<f64> = y.iter().map(|v| v - mean).collect();
    let den: f64 = z.iter().map(|v| v * v).sum();
    let lag = w.lag(&z);
    let quadrant: Vec<Option<Quadrant>> = (0..n)
        .map(|k| (!w.neighbors(k).is_empty()).then(|| Quadrant::of(z[k], lag[k])))
        .collect();

    if !(den > 0.0) || n < 2 {
        warn!(units = n, "value column has no variance, local Moran's I is zero everywhere");
        return Ok(LocalMoran { i: vec![0.0; n], p_sim: vec![None; n], quadrant });
    }

    let scale = (n - 1) as f64 / den;
    let i: Vec<f64> = (0..n).map(|k| scale * z[k] * lag[k]).collect();

    let permute = |k: usize| -> Option<f64> {
        let degree = w.neighbors(k).len();
        if degree == 0 || config.permutations == 0 {
            return None;
        }
        let mut rng = StdRng::seed_from_u64(config.seed ^ (k as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut larger = 0usize;
        for _ in 0..config.permutations {
            let drawn: f64 = index::sample(&mut rng, n - 1, degree)
                .iter()
                .map(|j| if j >= k { z[j + 1] } else { z[j] })
                .sum();
            let sim = scale * z[k] * drawn / degree as f64;
            if sim >= i[k] {
                larger += 1;
            }
        }
        let folded = larger.min(config.permutations - larger);
        Some((folded + 1) as f64 / (config.permutations + 1) as f64)
    };

    #[cfg(feature = "threading")]
    let p_sim: Vec<Option<f64>> = (0..n).into_par_iter().map(permute).collect();
    #[cfg(not(feature = "threading"))]
    let p_sim: Vec<Option<f64>> = (0..n).map(permute).collect();

    let significant = p_sim.iter().filter(|p| p.is_some_and(|p| p < config.significance)).count();
    info!(units = n, islands = w.islands().len(), significant, "local Moran's I computed");

    Ok(LocalMoran { i, p_sim, quadrant })
}
