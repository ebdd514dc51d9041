//! Mass allocation and the conservation check.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::linkage::Link;
use crate::units::CoarseUnit;

/// One allocated fragment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    pub fine: usize,
    pub coarse: usize,
    pub overlap_fraction: f64,
    pub p_hat: f64,
    pub allocated_mass: f64,
}

/// `allocated_mass = p_hat * target_mass`, nothing more.
pub fn allocate(links: &[Link], p_hat: &[f64], coarse: &[CoarseUnit]) -> Vec<Allocation> {
    links
        .iter()
        .zip(p_hat)
        .map(|(link, &p)| Allocation {
            fine: link.fine,
            coarse: link.coarse,
            overlap_fraction: link.overlap_fraction,
            p_hat: p,
            allocated_mass: p * coarse[link.coarse].target_mass,
        })
        .collect()
}

/// Worst per-parent deviation between allocated and target mass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConservationReport {
    pub parents_checked: usize,
    pub max_abs_error: f64,
    /// Relative to `max(|target|, 1)`.
    pub max_rel_error: f64,
    /// Coarse index with the largest relative error.
    #[serde(skip)]
    pub worst_parent: Option<usize>,
}

/// Sum allocations per coarse unit and compare against the targets.
/// A NaN sum counts as an infinite error.
pub fn check_conservation(allocs: &[Allocation], coarse: &[CoarseUnit]) -> ConservationReport {
    let mut sums: BTreeMap<usize, f64> = BTreeMap::new();
    for a in allocs {
        *sums.entry(a.coarse).or_insert(0.0) += a.allocated_mass;
    }

    let mut report = ConservationReport { parents_checked: sums.len(), ..Default::default() };
    for (&ci, &sum) in &sums {
        let target = coarse[ci].target_mass;
        let mut abs = (sum - target).abs();
        if abs.is_nan() {
            abs = f64::INFINITY;
        }
        let rel = abs / target.abs().max(1.0);
        report.max_abs_error = report.max_abs_error.max(abs);
        if report.worst_parent.is_none() || rel > report.max_rel_error {
            report.max_rel_error = rel;
            report.worst_parent = Some(ci);
        }
    }
    report
}

/// Total allocated mass per fine unit, drawn from every parent it touches.
pub fn fine_totals(allocs: &[Allocation]) -> BTreeMap<usize, f64> {
    let mut totals = BTreeMap::new();
    for a in allocs {
        *totals.entry(a.fine).or_insert(0.0) += a.allocated_mass;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::MultiPolygon;

    fn parent(mass: f64) -> CoarseUnit {
        CoarseUnit { id: String::new(), geometry: MultiPolygon::new(vec![]), target_mass: mass }
    }

    fn link(fine: usize, coarse: usize) -> Link {
        Link { fine, coarse, overlap_fraction: 1.0 }
    }

    #[test]
    fn allocation_is_elementwise() {
        let coarse = vec![parent(10.0), parent(4.0)];
        let links = vec![link(0, 0), link(1, 0), link(2, 1)];
        let allocs = allocate(&links, &[0.3, 0.7, 1.0], &coarse);
        let masses: Vec<f64> = allocs.iter().map(|a| a.allocated_mass).collect();
        assert_eq!(masses, vec![3.0, 7.0, 4.0]);
        let report = check_conservation(&allocs, &coarse);
        assert_eq!(report.parents_checked, 2);
        assert!(report.max_abs_error < 1e-12);
    }

    #[test]
    fn conservation_flags_shortfall() {
        let coarse = vec![parent(10.0), parent(200.0)];
        let links = vec![link(0, 0), link(1, 1)];
        let allocs = allocate(&links, &[0.5, 1.0], &coarse);
        let report = check_conservation(&allocs, &coarse);
        assert_eq!(report.max_abs_error, 5.0);
        assert_eq!(report.max_rel_error, 0.5);
        assert_eq!(report.worst_parent, Some(0));
    }

    #[test]
    fn fine_totals_sum_across_parents() {
        let coarse = vec![parent(10.0), parent(20.0)];
        let links = vec![link(0, 0), link(0, 1), link(1, 1)];
        let allocs = allocate(&links, &[1.0, 0.25, 0.75], &coarse);
        let totals = fine_totals(&allocs);
        assert_eq!(totals[&0], 15.0);
        assert_eq!(totals[&1], 15.0);
    }
}
