//! Geometry helpers: WKT conversion, projections for area/distance work,
//! great-circle distances, and bounding-box prefilters.
pub mod projection;
pub mod sphere;
pub mod wkt;

use geo::{BoundingRect, MultiPolygon, Rect};

pub use projection::{AreaCrs, AreaCrsSetting};

/// Bounding rectangle of a polygonal geometry; `None` when it has no
/// coordinates.
pub fn bbox(g: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    g.bounding_rect()
}

/// True when two rectangles share at least one point.
pub fn rects_intersect(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

/// True when `outer` covers `inner` entirely.
pub fn rect_covers(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && outer.max().x >= inner.max().x
        && outer.max().y >= inner.max().y
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
        Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 })
    }

    #[test]
    fn touching_rects_intersect() {
        assert!(rects_intersect(&rect(0.0, 0.0, 1.0, 1.0), &rect(1.0, 0.0, 2.0, 1.0)));
        assert!(!rects_intersect(&rect(0.0, 0.0, 1.0, 1.0), &rect(1.5, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn cover_requires_full_extent() {
        assert!(rect_covers(&rect(0.0, 0.0, 4.0, 4.0), &rect(1.0, 1.0, 2.0, 2.0)));
        assert!(!rect_covers(&rect(0.0, 0.0, 4.0, 4.0), &rect(3.0, 3.0, 5.0, 5.0)));
    }
}
