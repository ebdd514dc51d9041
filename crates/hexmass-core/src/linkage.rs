//! Parent-child linkage between fine and coarse units.

use geo::{Area, BooleanOps, Contains, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::geometry::{bbox, rect_covers, rects_intersect, AreaCrs};
use crate::units::{CoarseUnit, FineUnit};

/// Fragments at or below this share of the fine unit's area are discarded.
pub const MIN_OVERLAP_FRACTION: f64 = 1e-9;

/// How fine units attach to coarse units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Each fine unit belongs to the first coarse unit that fully contains it.
    #[default]
    Containment,
    /// Fine units split across every coarse unit they overlap, by area.
    Fractional,
}

/// One (fine, coarse) pair. Indices point into the unit slices the
/// linkage was computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub fine: usize,
    pub coarse: usize,
    /// Share of the fine unit's area inside the coarse unit, in (0, 1].
    pub overlap_fraction: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkOutcome {
    /// Ordered by fine index, then coarse index.
    pub links: Vec<Link>,
    /// Fine units that matched no coarse unit.
    pub unlinked_fine: usize,
}

/// Containment linkage: full "within" predicate, first container wins, so
/// a fine unit appears in at most one link.
pub fn link_containment(fine: &[FineUnit], coarse: &[CoarseUnit]) -> LinkOutcome {
    let coarse_boxes: Vec<Option<Rect<f64>>> = coarse.iter().map(|c| bbox(&c.geometry)).collect();

    let find_parent = |f: &FineUnit| -> Option<usize> {
        let fb = bbox(&f.geometry)?;
        coarse.iter().zip(&coarse_boxes).position(|(c, cb)| {
            cb.as_ref().is_some_and(|cb| rect_covers(cb, &fb)) && c.geometry.contains(&f.geometry)
        })
    };

    #[cfg(feature = "threading")]
    let parents: Vec<Option<usize>> = fine.par_iter().map(find_parent).collect();
    #[cfg(not(feature = "threading"))]
    let parents: Vec<Option<usize>> = fine.iter().map(find_parent).collect();

    let mut outcome = LinkOutcome::default();
    for (fi, parent) in parents.into_iter().enumerate() {
        match parent {
            Some(ci) => outcome.links.push(Link { fine: fi, coarse: ci, overlap_fraction: 1.0 }),
            None => outcome.unlinked_fine += 1,
        }
    }
    debug!(links = outcome.links.len(), unlinked = outcome.unlinked_fine, "containment linkage");
    outcome
}

/// Fractional linkage. Geometries are projected to `crs` before any area
/// is measured.
pub fn link_fractional(fine: &[FineUnit], coarse: &[CoarseUnit], crs: AreaCrs) -> LinkOutcome {
    let coarse_proj: Vec<(MultiPolygon<f64>, Option<Rect<f64>>)> = coarse
        .iter()
        .map(|c| {
            let g = crs.project_polygonal(&c.geometry);
            let b = bbox(&g);
            (g, b)
        })
        .collect();

    let fragments = |(fi, f): (usize, &FineUnit)| -> Vec<Link> {
        let fg = crs.project_polygonal(&f.geometry);
        let fine_area = fg.unsigned_area();
        let Some(fb) = bbox(&fg) else {
            return Vec::new();
        };
        if !(fine_area > 0.0) {
            return Vec::new();
        }
        coarse_proj
            .iter()
            .enumerate()
            .filter(|(_, (_, cb))| cb.as_ref().is_some_and(|cb| rects_intersect(cb, &fb)))
            .filter_map(|(ci, (cg, _))| {
                let overlap = (fg.intersection(cg).unsigned_area() / fine_area).clamp(0.0, 1.0);
                (overlap > MIN_OVERLAP_FRACTION).then_some(Link {
                    fine: fi,
                    coarse: ci,
                    overlap_fraction: overlap,
                })
            })
            .collect()
    };

    #[cfg(feature = "threading")]
    let per_fine: Vec<Vec<Link>> = fine.par_iter().enumerate().map(fragments).collect();
    #[cfg(not(feature = "threading"))]
    let per_fine: Vec<Vec<Link>> = fine.iter().enumerate().map(fragments).collect();

    let mut outcome = LinkOutcome::default();
    for links in per_fine {
        if links.is_empty() {
            outcome.unlinked_fine += 1;
        }
        outcome.links.extend(links);
    }
    debug!(
        links = outcome.links.len(),
        unlinked = outcome.unlinked_fine,
        crs = %crs,
        "fractional linkage"
    );
    outcome
}
