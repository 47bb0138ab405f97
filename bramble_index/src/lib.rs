// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bramble Index: one façade over the Bramble spatial index family.
//!
//! The tree crates each stand alone; this crate ties them together:
//!
//! - [`IndexKind`] and the factory functions pick an implementation by
//!   name (`array`, `kd-tree`, `ph-tree`, `quadtree`, `quadtree-hc`,
//!   `quadtree-hc2`, `rstar-tree`, `str-packed-rstar-tree`),
//! - [`ArrayIndex`] is the linear-scan reference used as a testing oracle,
//! - [`RTreePointMultimap`] serves the point contract from the box-keyed
//!   R*-tree,
//! - the commonly used types of every member crate are re-exported.
//!
//! # Example
//!
//! ```rust
//! use bramble_index::{IndexConfig, IndexKind, create_point_multimap};
//!
//! let cfg = IndexConfig::new(2);
//! let mut idx = create_point_multimap::<u32>(IndexKind::QuadtreeHc2, &cfg).unwrap();
//! idx.insert(&[1.0, 1.0], 7);
//! idx.insert(&[2.0, 2.0], 8);
//! assert_eq!(idx.query_1nn(&[1.9, 1.9]).map(|(_, _, &v)| v), Some(8));
//! ```

mod adapter;
mod array;
mod factory;

pub use adapter::RTreePointMultimap;
pub use array::ArrayIndex;
pub use factory::{IndexKind, bulk_load_point_multimap, create_point_map, create_point_multimap};

pub use bramble_core::{
    BoxMap, BoxMultimap, CenterDistance, Distance, EdgeDistance, FarNeighborDistance,
    IndexConfig, IndexError, IndexStats, L2Distance, MinMaxHeap, PointMap, PointMultimap,
    SpatialIndex, f64_to_sortable, sortable_to_f64,
};
pub use bramble_critbit::{CritBit, CritBit64, CritBitKd, CritBitKdMap};
pub use bramble_kdtree::KdTree;
pub use bramble_quadtree::{QuadTree, QuadTreeHc, QuadTreeHc2};
pub use bramble_rtree::{MixedIter, RTree};

#[cfg(test)]
mod scenarios {
    //! Cross-tree correctness scenarios, checked against the linear-scan
    //! oracle.

    use crate::{ArrayIndex, IndexConfig, IndexKind, PointMultimap, RTree};
    use bramble_core::types::{dist_l2, intersects};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn uniform_points(n: usize, dims: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dims).map(|_| rng.gen_range(0.0..1.0)).collect())
            .collect()
    }

    #[test]
    fn rtree_window_query_matches_naive_scan() {
        let points = uniform_points(10_000, 2, 1001);
        let mut tree = RTree::new(2).expect("valid dims");
        for (i, p) in points.iter().enumerate() {
            tree.insert(p, p, i);
        }
        let mut rng = StdRng::seed_from_u64(1002);
        for _ in 0..100 {
            let a = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
            let b = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
            let min = [a[0].min(b[0]), a[1].min(b[1])];
            let max = [a[0].max(b[0]), a[1].max(b[1])];
            let mut got: Vec<usize> = tree.query_intersect(&min, &max).map(|(_, _, &v)| v).collect();
            got.sort_unstable();
            let mut expected: Vec<usize> = points
                .iter()
                .enumerate()
                .filter(|(_, p)| intersects(p, p, &min, &max))
                .map(|(i, _)| i)
                .collect();
            expected.sort_unstable();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn rtree_knn_is_monotone_and_complete() {
        let points = uniform_points(10_000, 3, 2001);
        let mut tree = RTree::new(3).expect("valid dims");
        for (i, p) in points.iter().enumerate() {
            tree.insert(p, p, i);
        }
        let mut rng = StdRng::seed_from_u64(2002);
        for _ in 0..100 {
            let center: Vec<f64> = (0..3).map(|_| rng.gen_range(0.0..1.0)).collect();
            let yielded: Vec<f64> = tree.query_knn(&center, 50).map(|e| e.dist).collect();
            assert_eq!(yielded.len(), 50);
            for w in yielded.windows(2) {
                assert!(w[0] <= w[1], "distances must be non-decreasing");
            }
            // The head of the stream is the 1-NN.
            let (first, _) = tree.query_1nn(&center).expect("tree is not empty");
            assert_eq!(first, yielded[0]);
            // No entry outside the yielded set is closer than the cut-off.
            let mut all: Vec<f64> = points.iter().map(|p| dist_l2(&center, p)).collect();
            all.sort_by(f64::total_cmp);
            for (y, e) in yielded.iter().zip(&all[..50]) {
                assert!((y - e).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn str_load_and_incremental_knn_agree() {
        let points = uniform_points(5_000, 2, 3001);
        let mut incremental = RTree::new(2).expect("valid dims");
        for (i, p) in points.iter().enumerate() {
            incremental.insert(p, p, i);
        }
        let entries: Vec<(Box<[f64]>, Box<[f64]>, usize)> = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let b: Box<[f64]> = p.clone().into();
                (b.clone(), b, i)
            })
            .collect();
        let packed = RTree::str_load(2, entries).expect("valid config");
        packed.check_invariants();

        let mut rng = StdRng::seed_from_u64(3002);
        for _ in 0..20 {
            let center = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
            let a: Vec<f64> = incremental.query_knn(&center, 40).map(|e| e.dist).collect();
            let b: Vec<f64> = packed.query_knn(&center, 40).map(|e| e.dist).collect();
            assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(&b) {
                assert!((x - y).abs() < 1e-12, "k-NN streams diverged");
            }
        }
    }

    #[test]
    fn coincident_points_overflow_in_every_quadtree_kind() {
        for kind in [
            IndexKind::Quadtree,
            IndexKind::QuadtreeHc,
            IndexKind::QuadtreeHc2,
        ] {
            let cfg = IndexConfig::new(2);
            let mut idx =
                crate::create_point_multimap::<u32>(kind, &cfg).expect("constructible");
            for i in 0..100 {
                idx.insert(&[0.5, 0.5], i);
            }
            assert_eq!(idx.size(), 100, "{kind}");
            let all: Vec<_> = idx.entries().collect();
            assert_eq!(all.len(), 100, "{kind}");
            for i in 0..100 {
                assert!(idx.remove_entry(&[0.5, 0.5], &i), "{kind}");
            }
            assert_eq!(idx.size(), 0, "{kind}");
        }
    }

    #[test]
    fn all_kinds_agree_with_the_oracle() {
        let cfg = IndexConfig::new(2);
        let kinds = [
            IndexKind::KdTree,
            IndexKind::Quadtree,
            IndexKind::QuadtreeHc,
            IndexKind::QuadtreeHc2,
            IndexKind::RStarTree,
        ];
        let mut rng = StdRng::seed_from_u64(4001);
        let mut oracle = ArrayIndex::new(2).expect("valid dims");
        let mut indexes: Vec<_> = kinds
            .iter()
            .map(|&k| crate::create_point_multimap::<u32>(k, &cfg).expect("constructible"))
            .collect();

        let mut live: Vec<(Vec<f64>, u32)> = Vec::new();
        for i in 0..1500_u32 {
            if !live.is_empty() && rng.gen_bool(0.25) {
                let at = rng.gen_range(0..live.len());
                let (p, v) = live.swap_remove(at);
                assert!(oracle.remove_entry(&p, &v));
                for idx in &mut indexes {
                    assert!(idx.remove_entry(&p, &v));
                }
            } else {
                let p = vec![rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0)];
                oracle.insert(&p, i);
                for idx in &mut indexes {
                    idx.insert(&p, i);
                }
                live.push((p, i));
            }
        }

        for _ in 0..40 {
            let a = [rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0)];
            let b = [rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0)];
            let min = [a[0].min(b[0]), a[1].min(b[1])];
            let max = [a[0].max(b[0]), a[1].max(b[1])];
            let mut expected: Vec<u32> = oracle.query(&min, &max).map(|(_, &v)| v).collect();
            expected.sort_unstable();
            for (kind, idx) in kinds.iter().zip(&indexes) {
                let mut got: Vec<u32> = idx.query(&min, &max).map(|(_, &v)| v).collect();
                got.sort_unstable();
                assert_eq!(got, expected, "window diverged for {kind}");
            }

            let center = [rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0)];
            let expected_dists: Vec<f64> =
                oracle.query_knn(&center, 10).map(|(d, _, _)| d).collect();
            for (kind, idx) in kinds.iter().zip(&indexes) {
                let got: Vec<f64> = idx.query_knn(&center, 10).map(|(d, _, _)| d).collect();
                assert_eq!(got.len(), expected_dists.len(), "k-NN size for {kind}");
                for (g, e) in got.iter().zip(&expected_dists) {
                    assert!((g - e).abs() < 1e-9, "k-NN diverged for {kind}");
                }
            }
        }
    }
}
