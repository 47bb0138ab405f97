// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Floating-point point map over the k-D crit-bit trie.
//!
//! [`CritBitKdMap`] stores `f64` points by passing every coordinate through
//! the sortable-integer codec and interleaving the results. Window queries
//! translate directly (the codec is order-preserving per dimension), and
//! k-NN works best-first: the interleaved prefix of a trie node implies a
//! per-dimension integer interval, which decodes back into an axis-aligned
//! box whose edge distance lower-bounds every key below the node.

use std::cell::Cell;

use bramble_core::{
    Distance, IndexError, IndexStats, KnnIter, KnnNav, L2Distance, PointMap, PointVisitor,
    SpatialIndex, f64_to_sortable, sortable_to_f64,
};

use crate::bits::kd_dim_bounds;
use crate::tree::{CbSlot, CritBitKd};

static L2: L2Distance = L2Distance;

/// Point map over `f64` coordinates backed by a [`CritBitKd`] trie.
///
/// Map semantics: one value per point, inserts overwrite. This is the
/// prefix-trie (PH-tree style) entry of the index family.
#[derive(Debug)]
pub struct CritBitKdMap<V> {
    kd: CritBitKd<V>,
    dist_calls: Cell<u64>,
}

impl<V> CritBitKdMap<V> {
    /// Create a map for `dims`-dimensional points.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        Ok(Self {
            kd: CritBitKd::new(dims, 64)?,
            dist_calls: Cell::new(0),
        })
    }

    fn encode(&self, point: &[f64]) -> Vec<u64> {
        assert_eq!(
            point.len(),
            self.kd.dims(),
            "point has {} dimensions, index expects {}",
            point.len(),
            self.kd.dims()
        );
        point.iter().map(|&c| f64_to_sortable(c)).collect()
    }

    fn decode(encoded: &[u64]) -> Box<[f64]> {
        encoded.iter().map(|&c| sortable_to_f64(c)).collect()
    }

    fn count_dist(&self) {
        self.dist_calls.set(self.dist_calls.get() + 1);
    }

    // Decoded box implied by a node prefix. Integer intervals reaching into
    // the NaN encodings are clamped to +-infinity, which keeps the bound
    // conservative.
    fn node_box(&self, prefix: &[u64], pos_diff: usize) -> (Vec<f64>, Vec<f64>) {
        let dims = self.kd.dims();
        let mut lo = vec![0.0; dims];
        let mut hi = vec![0.0; dims];
        for d in 0..dims {
            let (l, h) = kd_dim_bounds(prefix, pos_diff, dims, 64, d);
            let lv = sortable_to_f64(l);
            let hv = sortable_to_f64(h);
            lo[d] = if lv.is_nan() { f64::NEG_INFINITY } else { lv };
            hi[d] = if hv.is_nan() { f64::INFINITY } else { hv };
        }
        (lo, hi)
    }
}

impl<'a, V: 'a> KnnNav<'a> for CritBitKdMap<V> {
    type Node = &'a CbSlot<V>;
    type Entry = (Box<[f64]>, &'a V);

    fn knn_root(&'a self, _center: &[f64], _dist: &dyn Distance) -> Option<(f64, Self::Node)> {
        let root = self.kd.root_slot();
        if matches!(root, CbSlot::Free) {
            None
        } else {
            Some((0.0, root))
        }
    }

    fn knn_expand(
        &'a self,
        node: &Self::Node,
        center: &[f64],
        dist: &dyn Distance,
        push_node: &mut dyn FnMut(f64, Self::Node),
        push_entry: &mut dyn FnMut(f64, Self::Entry),
    ) {
        let mut visit = |slot: &'a CbSlot<V>| match slot {
            CbSlot::Free => {}
            CbSlot::Entry { key, value } => {
                let mut point = vec![0; self.kd.dims()];
                crate::deinterleave(key, self.kd.dims(), 64, &mut point);
                let point = Self::decode(&point);
                self.count_dist();
                let d = dist.to_point(center, &point);
                push_entry(d, (point, value));
            }
            CbSlot::Node(child) => {
                let (lo, hi) = self.node_box(&child.prefix, child.pos_diff);
                self.count_dist();
                push_node(dist.node_bound(center, &lo, &hi), slot);
            }
        };
        match node {
            // Only the root can be a bare entry; hand it straight over.
            CbSlot::Free | CbSlot::Entry { .. } => visit(node),
            CbSlot::Node(n) => {
                visit(&n.lo);
                visit(&n.hi);
            }
        }
    }
}

impl<V> SpatialIndex<V> for CritBitKdMap<V> {
    fn dims(&self) -> usize {
        self.kd.dims()
    }

    fn size(&self) -> usize {
        self.kd.size()
    }

    fn clear(&mut self) {
        self.kd.clear();
    }

    fn stats(&self) -> IndexStats {
        let mut stats = self.kd.stats();
        stats.dist_calls = self.dist_calls.get();
        stats
    }
}

impl<V> PointMap<V> for CritBitKdMap<V> {
    fn insert(&mut self, key: &[f64], value: V) -> Option<V> {
        let encoded = self.encode(key);
        self.kd.insert(&encoded, value)
    }

    fn get(&self, key: &[f64]) -> Option<&V> {
        let encoded = self.encode(key);
        self.kd.get(&encoded)
    }

    fn remove(&mut self, key: &[f64]) -> Option<V> {
        let encoded = self.encode(key);
        self.kd.remove(&encoded)
    }

    fn update(&mut self, old_key: &[f64], new_key: &[f64]) -> bool {
        let old = self.encode(old_key);
        let new = self.encode(new_key);
        match self.kd.remove(&old) {
            Some(value) => {
                // Map semantics: an existing value at the new key is
                // overwritten.
                self.kd.insert(&new, value);
                true
            }
            None => false,
        }
    }

    fn visit_all(&self, f: &mut PointVisitor<'_, '_, V>) {
        for (point, value) in self.kd.iter() {
            let decoded = Self::decode(&point);
            f(&decoded, value);
        }
    }

    fn visit_query(&self, min: &[f64], max: &[f64], f: &mut PointVisitor<'_, '_, V>) {
        let min = self.encode(min);
        let max = self.encode(max);
        for (point, value) in self.kd.query(&min, &max) {
            let decoded = Self::decode(&point);
            f(&decoded, value);
        }
    }

    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, &'_ V)> + '_> {
        assert_eq!(
            center.len(),
            self.kd.dims(),
            "center has {} dimensions, index expects {}",
            center.len(),
            self.kd.dims()
        );
        Box::new(
            KnnIter::new(self, center, k, &L2)
                .map(|e| (e.dist, e.entry.0, e.entry.1)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::CritBitKdMap;
    use bramble_core::{PointMap, SpatialIndex};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample(rng: &mut StdRng, dims: usize) -> Vec<f64> {
        (0..dims).map(|_| rng.gen_range(-100.0..100.0)).collect()
    }

    #[test]
    fn put_get_remove_with_negative_coordinates() {
        let mut map = CritBitKdMap::new(2).expect("valid dims");
        assert_eq!(map.insert(&[-1.5, 2.25], "a"), None);
        assert_eq!(map.insert(&[-1.5, 2.25], "b"), Some("a"));
        assert_eq!(map.get(&[-1.5, 2.25]), Some(&"b"));
        assert!(!map.contains(&[1.5, 2.25]));
        assert_eq!(map.remove(&[-1.5, 2.25]), Some("b"));
        assert_eq!(map.size(), 0);
    }

    #[test]
    fn window_query_matches_linear_scan() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut map = CritBitKdMap::new(3).expect("valid dims");
        let mut points = Vec::new();
        for i in 0..400_u32 {
            let p = sample(&mut rng, 3);
            if map.insert(&p, i).is_none() {
                points.push(p);
            }
        }
        for _ in 0..50 {
            let a = sample(&mut rng, 3);
            let b = sample(&mut rng, 3);
            let min: Vec<f64> = a.iter().zip(&b).map(|(&x, &y)| x.min(y)).collect();
            let max: Vec<f64> = a.iter().zip(&b).map(|(&x, &y)| x.max(y)).collect();
            let mut got = Vec::new();
            map.visit_query(&min, &max, &mut |k, _| got.push(k.to_vec()));
            let mut expected: Vec<Vec<f64>> = points
                .iter()
                .filter(|p| p.iter().zip(min.iter().zip(&max)).all(|(&c, (&lo, &hi))| lo <= c && c <= hi))
                .cloned()
                .collect();
            got.sort_by(|a, b| a.partial_cmp(b).expect("finite coordinates"));
            expected.sort_by(|a, b| a.partial_cmp(b).expect("finite coordinates"));
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn knn_matches_linear_scan() {
        let mut rng = StdRng::seed_from_u64(23);
        let mut map = CritBitKdMap::new(2).expect("valid dims");
        let mut points = Vec::new();
        for i in 0..300_u32 {
            let p = sample(&mut rng, 2);
            if map.insert(&p, i).is_none() {
                points.push(p);
            }
        }
        for _ in 0..20 {
            let center = sample(&mut rng, 2);
            let got: Vec<f64> = map.query_knn(&center, 10).map(|(d, _, _)| d).collect();
            assert_eq!(got.len(), 10);
            for w in got.windows(2) {
                assert!(w[0] <= w[1]);
            }
            let mut expected: Vec<f64> = points
                .iter()
                .map(|p| bramble_core::types::dist_l2(&center, p))
                .collect();
            expected.sort_by(|a, b| a.partial_cmp(b).expect("finite distances"));
            for (g, e) in got.iter().zip(expected.iter().take(10)) {
                assert!((g - e).abs() < 1e-9);
            }
        }
        assert!(map.stats().dist_calls > 0);
    }

    #[test]
    fn one_nn_agrees_with_knn_head() {
        let mut map = CritBitKdMap::new(2).expect("valid dims");
        map.insert(&[0.0, 0.0], 0);
        map.insert(&[5.0, 5.0], 1);
        map.insert(&[-3.0, 1.0], 2);
        let (d, _, v) = map.query_1nn(&[4.0, 4.0]).expect("map is not empty");
        assert_eq!(*v, 1);
        assert!((d - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn update_relocates() {
        let mut map = CritBitKdMap::new(2).expect("valid dims");
        map.insert(&[1.0, 1.0], 7);
        assert!(map.update(&[1.0, 1.0], &[2.0, 2.0]));
        assert!(!map.contains(&[1.0, 1.0]));
        assert_eq!(map.get(&[2.0, 2.0]), Some(&7));
        assert!(!map.update(&[9.0, 9.0], &[0.0, 0.0]));
    }
}
