//! Per-parent proportions `p_hat` for every link.
//!
//! Links are partitioned by coarse unit and each partition is normalised on
//! its own, so groups never interact. A degenerate group (no finite
//! maximum, or a sum of weights that is zero or non-finite) falls back to a
//! uniform split instead of producing NaN.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::linkage::Link;
use crate::units::FineUnit;

/// Floor for logarithms so zero weights do not produce -inf.
pub const DEFAULT_EPSILON: f64 = 1e-12;

/// How a fine unit's `raw_prediction` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// Unbounded score/logit: softmax over log-weights.
    Score,
    /// Non-negative magnitude: direct normalisation.
    Magnitude,
}

impl WeightMode {
    pub fn from_fine_is_score(fine_is_score: bool) -> Self {
        if fine_is_score {
            WeightMode::Score
        } else {
            WeightMode::Magnitude
        }
    }
}

/// A normalised group and whether the uniform fallback fired.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub values: Vec<f64>,
    pub uniform_fallback: bool,
}

impl Normalized {
    fn uniform(n: usize) -> Self {
        Self { values: vec![1.0 / n as f64; n], uniform_fallback: true }
    }
}

/// Numerically stable softmax. NaN inputs get zero probability.
pub fn softmax_group(x: &[f64]) -> Normalized {
    if x.is_empty() {
        return Normalized { values: Vec::new(), uniform_fallback: false };
    }
    let max = x.iter().copied().filter(|v| !v.is_nan()).fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Normalized::uniform(x.len());
    }
    let ex: Vec<f64> = x.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = ex.iter().filter(|v| !v.is_nan()).sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return Normalized::uniform(x.len());
    }
    Normalized {
        values: ex.iter().map(|&e| if e.is_nan() { 0.0 } else { e / sum }).collect(),
        uniform_fallback: false,
    }
}

/// Clip to non-negative (NaN counts as zero) and divide by the sum.
pub fn normalise_nonneg(x: &[f64]) -> Normalized {
    if x.is_empty() {
        return Normalized { values: Vec::new(), uniform_fallback: false };
    }
    let clipped: Vec<f64> = x.iter().map(|&v| if v > 0.0 { v } else { 0.0 }).collect();
    let sum: f64 = clipped.iter().sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return Normalized::uniform(x.len());
    }
    Normalized {
        values: clipped.iter().map(|&v| v / sum).collect(),
        uniform_fallback: false,
    }
}

/// `raw + ln(max(weight, eps)) [+ ln(max(overlap, eps))]`.
pub fn log_weight(raw: f64, weight: f64, overlap: Option<f64>, eps: f64) -> f64 {
    let mut lw = raw + weight.max(eps).ln();
    if let Some(frac) = overlap {
        lw += frac.max(eps).ln();
    }
    lw
}

/// `max(raw, 0) * max(weight, 0) [* overlap]`.
pub fn magnitude_weight(raw: f64, weight: f64, overlap: Option<f64>) -> f64 {
    raw.max(0.0) * weight.max(0.0) * overlap.unwrap_or(1.0)
}

/// Proportions for every link, aligned with `links`.
#[derive(Debug, Clone, PartialEq)]
pub struct Proportions {
    pub p_hat: Vec<f64>,
    /// Coarse groups that fell back to a uniform split.
    pub degenerate_groups: usize,
}

/// Compute `p_hat` per link, grouped by coarse unit.
///
/// `use_overlap` adds the overlap term: the fractional variant includes it,
/// the containment variant omits it.
pub fn proportions(
    links: &[Link],
    fine: &[FineUnit],
    mode: WeightMode,
    use_overlap: bool,
    eps: f64,
) -> Proportions {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, link) in links.iter().enumerate() {
        groups.entry(link.coarse).or_default().push(i);
    }

    let normalise = |members: &Vec<usize>| -> Normalized {
        let raw: Vec<f64> = members
            .iter()
            .map(|&i| {
                let link = &links[i];
                let unit = &fine[link.fine];
                let overlap = use_overlap.then_some(link.overlap_fraction);
                match mode {
                    WeightMode::Score => log_weight(unit.raw_prediction, unit.weight, overlap, eps),
                    WeightMode::Magnitude => magnitude_weight(unit.raw_prediction, unit.weight, overlap),
                }
            })
            .collect();
        match mode {
            WeightMode::Score => softmax_group(&raw),
            WeightMode::Magnitude => normalise_nonneg(&raw),
        }
    };

    let members: Vec<&Vec<usize>> = groups.values().collect();
    #[cfg(feature = "threading")]
    let normalised: Vec<Normalized> = members.par_iter().map(|&m| normalise(m)).collect();
    #[cfg(not(feature = "threading"))]
    let normalised: Vec<Normalized> = members.iter().map(|&m| normalise(m)).collect();

    let mut p_hat = vec![0.0; links.len()];
    let mut degenerate_groups = 0;
    for (idx, norm) in members.iter().zip(normalised) {
        if norm.uniform_fallback {
            degenerate_groups += 1;
        }
        for (&i, p) in idx.iter().zip(norm.values) {
            p_hat[i] = p;
        }
    }
    Proportions { p_hat, degenerate_groups }
}
