//! Queen contiguity between polygons: two units are neighbours when they
//! share at least one vertex.

use std::collections::{BTreeSet, HashMap};

use geo::{CoordsIter, MultiPolygon};

/// Vertices are matched after rounding to this many units per degree.
const VERTEX_SCALE: f64 = 1e9;

/// Neighbour lists, sorted and without self-links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contiguity {
    neighbors: Vec<Vec<usize>>,
}

impl Contiguity {
    /// Build from explicit neighbour lists. Lists are sorted, deduplicated
    /// and made symmetric; self-links and out-of-range indices are dropped.
    pub fn from_neighbors(lists: Vec<Vec<usize>>) -> Self {
        let n = lists.len();
        let mut sets: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for (i, list) in lists.into_iter().enumerate() {
            for j in list {
                if j != i && j < n {
                    sets[i].insert(j);
                    sets[j].insert(i);
                }
            }
        }
        Self { neighbors: sets.into_iter().map(|s| s.into_iter().collect()).collect() }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    /// Units with no neighbour at all.
    pub fn islands(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.neighbors[i].is_empty()).collect()
    }

    /// Row-standardised spatial lag: the mean of `z` over each unit's
    /// neighbours, 0 for islands.
    pub fn lag(&self, z: &[f64]) -> Vec<f64> {
        self.neighbors
            .iter()
            .map(|nb| {
                if nb.is_empty() {
                    0.0
                } else {
                    nb.iter().map(|&j| z[j]).sum::<f64>() / nb.len() as f64
                }
            })
            .collect()
    }
}

fn vertex_key(x: f64, y: f64) -> (i64, i64) {
    ((x * VERTEX_SCALE).round() as i64, (y * VERTEX_SCALE).round() as i64)
}

/// Queen contiguity over `polygons`, index-aligned with the input.
pub fn queen(polygons: &[MultiPolygon<f64>]) -> Contiguity {
    let mut owners: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, poly) in polygons.iter().enumerate() {
        let keys: BTreeSet<(i64, i64)> = poly.coords_iter().map(|c| vertex_key(c.x, c.y)).collect();
        for key in keys {
            owners.entry(key).or_default().push(i);
        }
    }

    let mut lists: Vec<Vec<usize>> = vec![Vec::new(); polygons.len()];
    for shared in owners.values().filter(|o| o.len() > 1) {
        for &i in shared {
            lists[i].extend(shared.iter().copied().filter(|&j| j != i));
        }
    }
    Contiguity::from_neighbors(lists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::wkt::parse_polygonal;

    fn square(x: f64, y: f64) -> MultiPolygon<f64> {
        let wkt = format!(
            "POLYGON (({x} {y}, {x1} {y}, {x1} {y1}, {x} {y1}, {x} {y}))",
            x1 = x + 1.0,
            y1 = y + 1.0
        );
        parse_polygonal(&wkt, 0).unwrap()
    }

    #[test]
    fn grid_queen_neighbours() {
        // 3x3 grid, row-major.
        let cells: Vec<_> = (0..9).map(|k| square((k % 3) as f64, (k / 3) as f64)).collect();
        let w = queen(&cells);
        assert_eq!(w.neighbors(4), &[0, 1, 2, 3, 5, 6, 7, 8]);
        assert_eq!(w.neighbors(0), &[1, 3, 4]);
        assert_eq!(w.neighbors(2), &[1, 4, 5]);
        assert!(w.islands().is_empty());
    }

    #[test]
    fn corner_touch_counts_and_gap_does_not() {
        let cells = vec![square(0.0, 0.0), square(1.0, 1.0), square(5.0, 5.0)];
        let w = queen(&cells);
        assert_eq!(w.neighbors(0), &[1]);
        assert_eq!(w.islands(), vec![2]);
    }

    #[test]
    fn tiny_float_noise_still_matches() {
        let a = square(0.0, 0.0);
        let b = parse_polygonal("POLYGON ((1.0000000000001 0, 2 0, 2 1, 1.0000000000001 1, 1.0000000000001 0))", 0)
            .unwrap();
        let w = queen(&[a, b]);
        assert_eq!(w.neighbors(0), &[1]);
    }

    #[test]
    fn lag_is_neighbour_mean() {
        let w = Contiguity::from_neighbors(vec![vec![1, 2], vec![], vec![], vec![]]);
        assert_eq!(w.neighbors(1), &[0]);
        let lag = w.lag(&[0.0, 2.0, 4.0, 9.0]);
        assert_eq!(lag, vec![3.0, 0.0, 0.0, 0.0]);
    }
}
