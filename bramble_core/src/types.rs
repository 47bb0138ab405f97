// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Point and box math over `&[f64]` slices, and the pluggable distance
//! functions used by the k-NN traversals.
//!
//! Keys are d-dimensional and dynamically sized, so the primitives here work
//! on slices rather than on a fixed-arity geometry type. Boxes are given as a
//! `(min, max)` pair of equal-length slices with `min[i] <= max[i]` in every
//! dimension; the helpers assume the caller upholds that and none of them
//! repair violations.

/// Whether the point lies inside the closed box `[min, max]`.
#[inline]
pub fn contains(min: &[f64], max: &[f64], point: &[f64]) -> bool {
    debug_assert_eq!(min.len(), point.len(), "dimensionality mismatch");
    point
        .iter()
        .zip(min.iter().zip(max))
        .all(|(&p, (&lo, &hi))| lo <= p && p <= hi)
}

/// Whether box `a` fully encloses box `b` (closed bounds).
#[inline]
pub fn encloses(a_min: &[f64], a_max: &[f64], b_min: &[f64], b_max: &[f64]) -> bool {
    a_min
        .iter()
        .zip(b_min)
        .all(|(&outer, &inner)| outer <= inner)
        && a_max
            .iter()
            .zip(b_max)
            .all(|(&outer, &inner)| outer >= inner)
}

/// Whether two closed boxes overlap in every dimension.
///
/// A shared face counts as an overlap, matching the closed-interval window
/// query semantics of every Bramble index.
#[inline]
pub fn intersects(a_min: &[f64], a_max: &[f64], b_min: &[f64], b_max: &[f64]) -> bool {
    debug_assert_eq!(a_min.len(), b_min.len(), "dimensionality mismatch");
    a_min
        .iter()
        .zip(a_max)
        .zip(b_min.iter().zip(b_max))
        .all(|((&a_lo, &a_hi), (&b_lo, &b_hi))| a_lo <= b_hi && a_hi >= b_lo)
}

/// Whether two boxes are equal in every dimension.
#[inline]
pub fn box_equals(a_min: &[f64], a_max: &[f64], b_min: &[f64], b_max: &[f64]) -> bool {
    a_min == b_min && a_max == b_max
}

/// Grow `(min, max)` in place to also cover `(other_min, other_max)`.
#[inline]
pub fn extend(min: &mut [f64], max: &mut [f64], other_min: &[f64], other_max: &[f64]) {
    for (m, &o) in min.iter_mut().zip(other_min) {
        if o < *m {
            *m = o;
        }
    }
    for (m, &o) in max.iter_mut().zip(other_max) {
        if o > *m {
            *m = o;
        }
    }
}

/// Write the center of `(min, max)` into `out`.
#[inline]
pub fn center_into(min: &[f64], max: &[f64], out: &mut [f64]) {
    for (c, (&lo, &hi)) in out.iter_mut().zip(min.iter().zip(max)) {
        *c = (lo + hi) * 0.5;
    }
}

/// Squared Euclidean distance between two points.
#[inline]
pub fn dist_l2_squared(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "dimensionality mismatch");
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Euclidean distance between two points.
#[inline]
pub fn dist_l2(a: &[f64], b: &[f64]) -> f64 {
    dist_l2_squared(a, b).sqrt()
}

/// Squared distance from a point to the nearest face of a box.
///
/// Zero when the point lies inside the box.
#[inline]
pub fn dist_edge_squared(point: &[f64], min: &[f64], max: &[f64]) -> f64 {
    debug_assert_eq!(point.len(), min.len(), "dimensionality mismatch");
    point
        .iter()
        .zip(min.iter().zip(max))
        .map(|(&p, (&lo, &hi))| {
            let d = if p < lo {
                lo - p
            } else if p > hi {
                p - hi
            } else {
                0.0
            };
            d * d
        })
        .sum()
}

/// Distance from a point to the nearest face of a box (zero inside).
#[inline]
pub fn dist_edge(point: &[f64], min: &[f64], max: &[f64]) -> f64 {
    dist_edge_squared(point, min, max).sqrt()
}

/// Distance from a point to the center of a box.
#[inline]
pub fn dist_center(point: &[f64], min: &[f64], max: &[f64]) -> f64 {
    point
        .iter()
        .zip(min.iter().zip(max))
        .map(|(&p, (&lo, &hi))| {
            let d = p - (lo + hi) * 0.5;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Distance from a point to the farthest corner of a box.
///
/// This is the upper counterpart of [`dist_edge`]; the far-neighbor wrapper
/// uses its reciprocal as the admissible subtree bound.
#[inline]
pub fn dist_far_corner(point: &[f64], min: &[f64], max: &[f64]) -> f64 {
    point
        .iter()
        .zip(min.iter().zip(max))
        .map(|(&p, (&lo, &hi))| {
            let d = (p - lo).abs().max((p - hi).abs());
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Distance function plugged into the k-NN traversals.
///
/// The engine asks for three kinds of distances:
///
/// - [`to_point`][Self::to_point] — query point to a stored point key,
/// - [`to_box`][Self::to_box] — query point to a stored box key,
/// - [`node_bound`][Self::node_bound] — a lower bound on
///   `to_point`/`to_box` for every entry stored below a node with the given
///   bounding volume. Best-first ordering is only correct if this really is
///   a lower bound.
///
/// All results must be non-negative. `NaN` results are treated as `+∞` by
/// the engine (the candidate loses every comparison).
pub trait Distance {
    /// Distance from the query point `a` to the stored point `b`.
    fn to_point(&self, a: &[f64], b: &[f64]) -> f64;

    /// Distance from the query point to a stored box key.
    fn to_box(&self, point: &[f64], min: &[f64], max: &[f64]) -> f64;

    /// Lower bound for all entries inside the bounding volume `(min, max)`.
    ///
    /// Defaults to [`to_box`][Self::to_box], which is correct whenever the
    /// distance to a box is the minimum over the points it contains.
    fn node_bound(&self, point: &[f64], min: &[f64], max: &[f64]) -> f64 {
        self.to_box(point, min, max)
    }
}

/// Euclidean point distance; boxes are measured to their nearest face.
///
/// This is the default for point keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct L2Distance;

impl Distance for L2Distance {
    #[inline]
    fn to_point(&self, a: &[f64], b: &[f64]) -> f64 {
        dist_l2(a, b)
    }

    #[inline]
    fn to_box(&self, point: &[f64], min: &[f64], max: &[f64]) -> f64 {
        dist_edge(point, min, max)
    }
}

/// Distance to the nearest face of a box, zero inside.
///
/// This is the default for box keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdgeDistance;

impl Distance for EdgeDistance {
    #[inline]
    fn to_point(&self, a: &[f64], b: &[f64]) -> f64 {
        dist_l2(a, b)
    }

    #[inline]
    fn to_box(&self, point: &[f64], min: &[f64], max: &[f64]) -> f64 {
        dist_edge(point, min, max)
    }
}

/// Distance to the center of a box.
#[derive(Clone, Copy, Debug, Default)]
pub struct CenterDistance;

impl Distance for CenterDistance {
    #[inline]
    fn to_point(&self, a: &[f64], b: &[f64]) -> f64 {
        dist_l2(a, b)
    }

    #[inline]
    fn to_box(&self, point: &[f64], min: &[f64], max: &[f64]) -> f64 {
        dist_center(point, min, max)
    }

    // The center of a child box can be farther from the query than the
    // centers of boxes stored below it, so the bound must fall back to the
    // nearest-face distance.
    #[inline]
    fn node_bound(&self, point: &[f64], min: &[f64], max: &[f64]) -> f64 {
        dist_edge(point, min, max)
    }
}

/// Reciprocal wrapper turning the k-NN iterator into farthest-first order.
///
/// Entry distances become `1 / inner`, so the smallest wrapped value belongs
/// to the farthest entry. The subtree bound uses the farthest corner of the
/// node volume: every entry in the node is at most that far away, hence its
/// wrapped value is at least `1 / far_corner`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FarNeighborDistance<D>(pub D);

impl<D: Distance> Distance for FarNeighborDistance<D> {
    #[inline]
    fn to_point(&self, a: &[f64], b: &[f64]) -> f64 {
        1.0 / self.0.to_point(a, b)
    }

    #[inline]
    fn to_box(&self, point: &[f64], min: &[f64], max: &[f64]) -> f64 {
        1.0 / self.0.to_box(point, min, max)
    }

    #[inline]
    fn node_bound(&self, point: &[f64], min: &[f64], max: &[f64]) -> f64 {
        1.0 / dist_far_corner(point, min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_is_closed() {
        let min = [0.0, 0.0];
        let max = [2.0, 4.0];
        assert!(contains(&min, &max, &[0.0, 4.0]));
        assert!(contains(&min, &max, &[1.0, 2.0]));
        assert!(!contains(&min, &max, &[2.1, 2.0]));
    }

    #[test]
    fn intersection_counts_shared_faces() {
        assert!(intersects(&[0.0, 0.0], &[1.0, 1.0], &[1.0, 0.5], &[2.0, 2.0]));
        assert!(!intersects(
            &[0.0, 0.0],
            &[1.0, 1.0],
            &[1.5, 0.5],
            &[2.0, 2.0]
        ));
    }

    #[test]
    fn extend_covers_both_boxes() {
        let mut min = [1.0, 1.0];
        let mut max = [2.0, 2.0];
        extend(&mut min, &mut max, &[0.0, 1.5], &[0.5, 3.0]);
        assert_eq!(min, [0.0, 1.0]);
        assert_eq!(max, [2.0, 3.0]);
    }

    #[test]
    fn edge_distance_is_zero_inside() {
        let min = [0.0, 0.0];
        let max = [10.0, 10.0];
        assert_eq!(dist_edge(&[5.0, 5.0], &min, &max), 0.0);
        assert_eq!(dist_edge(&[0.0, 0.0], &min, &max), 0.0);
        assert_eq!(dist_edge(&[-3.0, 4.0], &min, &max), 3.0);
        // Corner distance combines both axes.
        assert_eq!(dist_edge(&[-3.0, 14.0], &min, &max), 5.0);
    }

    #[test]
    fn center_distance_measures_the_midpoint() {
        let d = dist_center(&[0.0, 0.0], &[2.0, 2.0], &[4.0, 4.0]);
        assert!((d - (18.0_f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn far_corner_bounds_every_contained_point() {
        let min = [0.0, 0.0];
        let max = [4.0, 4.0];
        let p = [-1.0, 2.0];
        let far = dist_far_corner(&p, &min, &max);
        for corner in [[0.0, 0.0], [4.0, 0.0], [0.0, 4.0], [4.0, 4.0]] {
            assert!(dist_l2(&p, &corner) <= far + 1e-12);
        }
    }

    #[test]
    fn far_neighbor_node_bound_is_admissible() {
        let d = FarNeighborDistance(EdgeDistance);
        let p = [0.0, 0.0];
        let (min, max) = ([3.0, 3.0], [5.0, 5.0]);
        let bound = d.node_bound(&p, &min, &max);
        // Every point inside the box has a wrapped distance >= the bound.
        for q in [[3.0, 3.0], [5.0, 5.0], [4.0, 3.5]] {
            assert!(d.to_point(&p, &q) >= bound);
        }
    }
}
