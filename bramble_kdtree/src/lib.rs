// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bramble KdTree: an axis-cycling kd-tree point multimap.
//!
//! Every node stores one entry and splits space along one dimension,
//! cycling through the dimensions by depth. Keys with an equal coordinate
//! along a node's split axis route to the high side, which keeps exact
//! lookups on a single descent path even with duplicate points. Deletion
//! replaces an inner node with the minimum of its high subtree along the
//! node's axis (moving the low subtree over when the high side is empty),
//! the classic kd-tree erase.
//!
//! # Example
//!
//! ```rust
//! use bramble_kdtree::KdTree;
//!
//! let mut t = KdTree::new(2).unwrap();
//! t.insert(&[1.0, 5.0], "a");
//! t.insert(&[4.0, 2.0], "b");
//! let nearest = t.query_knn(&[4.2, 2.2], 1).next().unwrap();
//! assert_eq!(*nearest.entry.1, "b");
//! ```

use std::cell::Cell;

use smallvec::SmallVec;
use tracing::debug;

use bramble_core::types::contains;
use bramble_core::{
    Distance, IndexConfig, IndexError, IndexStats, KnnIter, KnnNav, L2Distance, PointMultimap,
    PointVisitor, SpatialIndex,
};

static L2: L2Distance = L2Distance;

#[derive(Clone, Debug)]
struct KdNode<V> {
    point: Box<[f64]>,
    value: V,
    axis: usize,
    lo: Option<Box<KdNode<V>>>,
    hi: Option<Box<KdNode<V>>>,
}

/// kd-tree multimap over d-dimensional points.
#[derive(Clone, Debug)]
pub struct KdTree<V> {
    dims: usize,
    root: Option<Box<KdNode<V>>>,
    size: usize,
    dist_calls: Cell<u64>,
}

impl<V> KdTree<V> {
    /// Create an empty tree.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        Self::from_config(&IndexConfig::new(dims))
    }

    /// Create an empty tree from a configuration record.
    ///
    /// Only the dimensionality applies; a kd-tree has no node capacity.
    pub fn from_config(config: &IndexConfig) -> Result<Self, IndexError> {
        config.validate(1, usize::MAX)?;
        debug!(dims = config.dims, "creating kd-tree");
        Ok(Self {
            dims: config.dims,
            root: None,
            size: 0,
            dist_calls: Cell::new(0),
        })
    }

    /// Number of dimensions.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.root = None;
        self.size = 0;
    }

    #[track_caller]
    fn check_dims(&self, key: &[f64]) {
        assert_eq!(
            key.len(),
            self.dims,
            "key has {} dimensions, tree expects {}",
            key.len(),
            self.dims
        );
    }

    /// Insert an entry. Duplicate `(point, value)` pairs are stored again.
    pub fn insert(&mut self, key: &[f64], value: V) {
        self.check_dims(key);
        let dims = self.dims;
        let mut slot = &mut self.root;
        let mut depth = 0;
        while let Some(node) = slot {
            slot = if key[node.axis] >= node.point[node.axis] {
                &mut node.hi
            } else {
                &mut node.lo
            };
            depth += 1;
        }
        *slot = Some(Box::new(KdNode {
            point: key.into(),
            value,
            axis: depth % dims,
            lo: None,
            hi: None,
        }));
        self.size += 1;
    }

    /// Remove one entry at `key` whose value satisfies `pred`.
    pub fn remove_if(&mut self, key: &[f64], pred: &mut dyn FnMut(&V) -> bool) -> Option<V> {
        self.check_dims(key);
        let removed = Self::remove_rec(&mut self.root, key, pred);
        if removed.is_some() {
            self.size -= 1;
        }
        removed
    }

    /// Remove one entry matching `(key, value)`.
    pub fn remove(&mut self, key: &[f64], value: &V) -> Option<V>
    where
        V: PartialEq,
    {
        self.remove_if(key, &mut |v| v == value)
    }

    fn remove_rec(
        slot: &mut Option<Box<KdNode<V>>>,
        key: &[f64],
        pred: &mut dyn FnMut(&V) -> bool,
    ) -> Option<V> {
        let node = slot.as_deref_mut()?;
        if *node.point == *key && pred(&node.value) {
            return Some(Self::delete_at(slot));
        }
        let branch = if key[node.axis] >= node.point[node.axis] {
            &mut node.hi
        } else {
            &mut node.lo
        };
        Self::remove_rec(branch, key, pred)
    }

    // Erase the node in `slot`, pulling up the minimum of a subtree to keep
    // the split invariants intact.
    fn delete_at(slot: &mut Option<Box<KdNode<V>>>) -> V {
        let node = slot
            .as_deref_mut()
            .expect("delete_at on an empty slot");
        let axis = node.axis;
        if node.hi.is_some() {
            let min_point = Self::find_min(node.hi.as_deref().expect("checked above"), axis)
                .point
                .clone();
            let replacement = Self::remove_rec(&mut node.hi, &min_point, &mut |_| true)
                .expect("minimum vanished from its subtree");
            node.point = min_point;
            std::mem::replace(&mut node.value, replacement)
        } else if node.lo.is_some() {
            // No high subtree: pull the minimum out of the low side and
            // move the remainder over. Every low point is at or above the
            // new split value, so the high side is where it now belongs.
            let min_point = Self::find_min(node.lo.as_deref().expect("checked above"), axis)
                .point
                .clone();
            let replacement = Self::remove_rec(&mut node.lo, &min_point, &mut |_| true)
                .expect("minimum vanished from its subtree");
            node.point = min_point;
            node.hi = node.lo.take();
            std::mem::replace(&mut node.value, replacement)
        } else {
            let node = slot.take().expect("delete_at on an empty slot");
            node.value
        }
    }

    // Node with the smallest coordinate along `axis` in the subtree.
    fn find_min<'x>(node: &'x KdNode<V>, axis: usize) -> &'x KdNode<V> {
        let mut best = node;
        if let Some(lo) = node.lo.as_deref() {
            let m = Self::find_min(lo, axis);
            if m.point[axis] < best.point[axis] {
                best = m;
            }
        }
        // Along the node's own split axis the high side cannot undercut
        // the node; elsewhere it can.
        if node.axis != axis
            && let Some(hi) = node.hi.as_deref()
        {
            let m = Self::find_min(hi, axis);
            if m.point[axis] < best.point[axis] {
                best = m;
            }
        }
        best
    }

    /// Relocate one entry `(old_key, value)` to `new_key`.
    pub fn update(&mut self, old_key: &[f64], new_key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        self.check_dims(new_key);
        match self.remove(old_key, value) {
            Some(v) => {
                self.insert(new_key, v);
                true
            }
            None => false,
        }
    }

    /// Whether any entry has exactly this point key.
    pub fn contains_point(&self, key: &[f64]) -> bool {
        self.check_dims(key);
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            if *n.point == *key {
                return true;
            }
            node = if key[n.axis] >= n.point[n.axis] {
                n.hi.as_deref()
            } else {
                n.lo.as_deref()
            };
        }
        false
    }

    /// Visit every entry whose key equals `key`.
    pub fn visit_exact(&self, key: &[f64], f: &mut dyn FnMut(&[f64], &V)) {
        self.check_dims(key);
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            if *n.point == *key {
                f(&n.point, &n.value);
            }
            // Exact matches route high on equal coordinates, so one path
            // covers all duplicates.
            node = if key[n.axis] >= n.point[n.axis] {
                n.hi.as_deref()
            } else {
                n.lo.as_deref()
            };
        }
    }

    /// All entries whose key lies in the closed box `[min, max]`.
    pub fn query(&self, min: &[f64], max: &[f64]) -> KdWindowIter<'_, V> {
        self.check_dims(min);
        self.check_dims(max);
        KdWindowIter::new(self.root.as_deref(), min, max, false)
    }

    /// All entries.
    pub fn iter(&self) -> KdWindowIter<'_, V> {
        KdWindowIter::new(self.root.as_deref(), &[], &[], true)
    }

    /// The `k` entries nearest to `center`, in non-decreasing L2 order.
    pub fn query_knn<'a>(&'a self, center: &[f64], k: usize) -> KnnIter<'a, Self> {
        self.query_knn_with(center, k, &L2)
    }

    /// k-NN under a caller-supplied distance function.
    ///
    /// Subtree bounds come from the split planes crossed on the way down,
    /// so the distance's point metric must dominate a single-axis
    /// difference (true for the Euclidean family) for the ordering
    /// guarantee to hold.
    pub fn query_knn_with<'a>(
        &'a self,
        center: &[f64],
        k: usize,
        dist: &'a dyn Distance,
    ) -> KnnIter<'a, Self> {
        self.check_dims(center);
        KnnIter::new(self, center, k, dist)
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::new(self.dims);
        Self::stats_walk(self.root.as_deref(), 0, &mut stats);
        stats.finish(self.dist_calls.get())
    }

    fn stats_walk(node: Option<&KdNode<V>>, level: usize, stats: &mut IndexStats) {
        let Some(node) = node else {
            return;
        };
        let is_leaf = node.lo.is_none() && node.hi.is_none();
        stats.record_node(level, is_leaf);
        stats.record_entries(level, 1);
        Self::stats_walk(node.lo.as_deref(), level + 1, stats);
        Self::stats_walk(node.hi.as_deref(), level + 1, stats);
    }

    /// Opt-in structural validation; panics on the first violation.
    pub fn check_invariants(&self) {
        let counted = Self::check_node(self.root.as_deref(), 0, self.dims);
        assert_eq!(counted, self.size, "entry count diverged from size()");
    }

    fn check_node(node: Option<&KdNode<V>>, depth: usize, dims: usize) -> usize {
        let Some(node) = node else {
            return 0;
        };
        assert_eq!(node.axis, depth % dims, "split axis off the depth cycle");
        if let Some(lo) = node.lo.as_deref() {
            Self::assert_side(lo, node.axis, node.point[node.axis], false);
        }
        if let Some(hi) = node.hi.as_deref() {
            Self::assert_side(hi, node.axis, node.point[node.axis], true);
        }
        1 + Self::check_node(node.lo.as_deref(), depth + 1, dims)
            + Self::check_node(node.hi.as_deref(), depth + 1, dims)
    }

    fn assert_side(node: &KdNode<V>, axis: usize, split: f64, high: bool) {
        if high {
            assert!(
                node.point[axis] >= split,
                "high subtree undercuts its split plane"
            );
        } else {
            assert!(
                node.point[axis] < split,
                "low subtree reaches its split plane"
            );
        }
        if let Some(lo) = node.lo.as_deref() {
            Self::assert_side(lo, axis, split, high);
        }
        if let Some(hi) = node.hi.as_deref() {
            Self::assert_side(hi, axis, split, high);
        }
    }
}

/// Resumable window iterator over a [`KdTree`].
#[derive(Debug)]
pub struct KdWindowIter<'a, V> {
    min: Box<[f64]>,
    max: Box<[f64]>,
    all: bool,
    stack: SmallVec<[&'a KdNode<V>; 32]>,
}

impl<'a, V> KdWindowIter<'a, V> {
    fn new(root: Option<&'a KdNode<V>>, min: &[f64], max: &[f64], all: bool) -> Self {
        let mut stack = SmallVec::new();
        if let Some(root) = root {
            stack.push(root);
        }
        Self {
            min: min.into(),
            max: max.into(),
            all,
            stack,
        }
    }
}

impl<'a, V> Iterator for KdWindowIter<'a, V> {
    type Item = (&'a [f64], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            let split = node.point[node.axis];
            if let Some(lo) = node.lo.as_deref()
                && (self.all || self.min[node.axis] < split)
            {
                self.stack.push(lo);
            }
            if let Some(hi) = node.hi.as_deref()
                && (self.all || self.max[node.axis] >= split)
            {
                self.stack.push(hi);
            }
            if self.all || contains(&self.min, &self.max, &node.point) {
                return Some((&node.point, &node.value));
            }
        }
        None
    }
}

/// Best-first navigation handle: a subtree plus the lower bound inherited
/// from the split planes crossed to reach it.
#[derive(Debug)]
pub struct KdNav<'a, V> {
    node: &'a KdNode<V>,
    bound: f64,
}

// Derived `Clone` would demand `V: Clone`; the handle only holds a
// reference.
impl<V> Clone for KdNav<'_, V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            bound: self.bound,
        }
    }
}

impl<'a, V: 'a> KnnNav<'a> for KdTree<V> {
    type Node = KdNav<'a, V>;
    type Entry = (&'a [f64], &'a V);

    fn knn_root(&'a self, _center: &[f64], _dist: &dyn Distance) -> Option<(f64, Self::Node)> {
        self.root.as_deref().map(|node| {
            (
                0.0,
                KdNav { node, bound: 0.0 },
            )
        })
    }

    fn knn_expand(
        &'a self,
        nav: &Self::Node,
        center: &[f64],
        dist: &dyn Distance,
        push_node: &mut dyn FnMut(f64, Self::Node),
        push_entry: &mut dyn FnMut(f64, Self::Entry),
    ) {
        let node = nav.node;
        self.dist_calls.set(self.dist_calls.get() + 1);
        push_entry(
            dist.to_point(center, &node.point),
            (&node.point, &node.value),
        );
        let axis = node.axis;
        let split = node.point[axis];
        let plane = (center[axis] - split).abs();
        if let Some(lo) = node.lo.as_deref() {
            // Crossing the plane is only forced when the query sits on the
            // high side.
            let bound = if center[axis] >= split {
                nav.bound.max(plane)
            } else {
                nav.bound
            };
            push_node(bound, KdNav { node: lo, bound });
        }
        if let Some(hi) = node.hi.as_deref() {
            let bound = if center[axis] < split {
                nav.bound.max(plane)
            } else {
                nav.bound
            };
            push_node(bound, KdNav { node: hi, bound });
        }
    }
}

impl<V> SpatialIndex<V> for KdTree<V> {
    fn dims(&self) -> usize {
        self.dims
    }

    fn size(&self) -> usize {
        self.size
    }

    fn clear(&mut self) {
        Self::clear(self);
    }

    fn stats(&self) -> IndexStats {
        Self::stats(self)
    }
}

impl<V> PointMultimap<V> for KdTree<V> {
    fn insert(&mut self, key: &[f64], value: V) {
        Self::insert(self, key, value);
    }

    fn contains_point(&self, key: &[f64]) -> bool {
        Self::contains_point(self, key)
    }

    fn contains_entry(&self, key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        let mut found = false;
        Self::visit_exact(self, key, &mut |_, v| found |= v == value);
        found
    }

    fn remove_entry(&mut self, key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        Self::remove(self, key, value).is_some()
    }

    fn remove_if(&mut self, key: &[f64], pred: &mut dyn FnMut(&V) -> bool) -> bool {
        Self::remove_if(self, key, pred).is_some()
    }

    fn update_entry(&mut self, old_key: &[f64], new_key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        self.update(old_key, new_key, value)
    }

    fn visit_all(&self, f: &mut PointVisitor<'_, '_, V>) {
        for (point, value) in self.iter() {
            f(point, value);
        }
    }

    fn visit_query(&self, min: &[f64], max: &[f64], f: &mut PointVisitor<'_, '_, V>) {
        for (point, value) in Self::query(self, min, max) {
            f(point, value);
        }
    }

    fn visit_exact(&self, key: &[f64], f: &mut PointVisitor<'_, '_, V>) {
        Self::visit_exact(self, key, f);
    }

    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, &'_ V)> + '_> {
        Box::new(
            Self::query_knn(self, center, k).map(|e| (e.dist, e.entry.0.into(), e.entry.1)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::KdTree;
    use bramble_core::types::{contains, dist_l2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample(rng: &mut StdRng, dims: usize) -> Vec<f64> {
        (0..dims).map(|_| rng.gen_range(-10.0..10.0)).collect()
    }

    #[test]
    fn insert_query_remove_round_trip() {
        let mut rng = StdRng::seed_from_u64(41);
        let mut t = KdTree::new(3).expect("valid dims");
        let mut reference: Vec<(Vec<f64>, u32)> = Vec::new();
        for i in 0..600_u32 {
            let p = sample(&mut rng, 3);
            t.insert(&p, i);
            reference.push((p, i));
        }
        t.check_invariants();

        for _ in 0..40 {
            let a = sample(&mut rng, 3);
            let b = sample(&mut rng, 3);
            let min: Vec<f64> = a.iter().zip(&b).map(|(&x, &y)| x.min(y)).collect();
            let max: Vec<f64> = a.iter().zip(&b).map(|(&x, &y)| x.max(y)).collect();
            let mut got: Vec<u32> = t.query(&min, &max).map(|(_, &v)| v).collect();
            got.sort_unstable();
            let mut expected: Vec<u32> = reference
                .iter()
                .filter(|(p, _)| contains(&min, &max, p))
                .map(|&(_, v)| v)
                .collect();
            expected.sort_unstable();
            assert_eq!(got, expected);
        }

        // Remove in a scrambled order, validating along the way.
        for (i, (p, v)) in reference.iter().enumerate().rev() {
            assert_eq!(t.remove(p, v), Some(*v));
            if i % 97 == 0 {
                t.check_invariants();
            }
        }
        assert!(t.is_empty());
    }

    #[test]
    fn deletion_pulls_up_subtree_minima() {
        let mut t = KdTree::new(2).expect("valid dims");
        // A fixed shape that forces both the high-side and the moved
        // low-side replacement paths.
        let pts = [
            [5.0, 5.0],
            [3.0, 8.0],
            [8.0, 2.0],
            [2.0, 3.0],
            [4.0, 9.0],
            [7.0, 1.0],
            [9.0, 6.0],
        ];
        for (i, p) in pts.iter().enumerate() {
            t.insert(p, i);
        }
        assert_eq!(t.remove(&[5.0, 5.0], &0), Some(0));
        t.check_invariants();
        assert_eq!(t.remove(&[3.0, 8.0], &1), Some(1));
        t.check_invariants();
        assert_eq!(t.size(), 5);
        for (i, p) in pts.iter().enumerate().skip(2) {
            assert!(t.contains_point(p), "lost {i}");
        }
    }

    #[test]
    fn duplicates_coexist_and_remove_individually() {
        let mut t = KdTree::new(2).expect("valid dims");
        t.insert(&[1.0, 1.0], "a");
        t.insert(&[1.0, 1.0], "b");
        t.insert(&[1.0, 1.0], "a");
        assert_eq!(t.size(), 3);
        let mut seen = Vec::new();
        t.visit_exact(&[1.0, 1.0], &mut |_, &v| seen.push(v));
        assert_eq!(seen.len(), 3);
        assert_eq!(t.remove(&[1.0, 1.0], &"a"), Some("a"));
        assert_eq!(t.remove(&[1.0, 1.0], &"a"), Some("a"));
        assert_eq!(t.remove(&[1.0, 1.0], &"a"), None);
        assert_eq!(t.remove(&[1.0, 1.0], &"b"), Some("b"));
        assert!(t.is_empty());
        t.check_invariants();
    }

    #[test]
    fn knn_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(43);
        let mut t = KdTree::new(2).expect("valid dims");
        let mut pts = Vec::new();
        for i in 0..500_u32 {
            let p = sample(&mut rng, 2);
            t.insert(&p, i);
            pts.push(p);
        }
        for _ in 0..25 {
            let center = sample(&mut rng, 2);
            let got: Vec<f64> = t.query_knn(&center, 12).map(|e| e.dist).collect();
            assert_eq!(got.len(), 12);
            for w in got.windows(2) {
                assert!(w[0] <= w[1]);
            }
            let mut expected: Vec<f64> = pts.iter().map(|p| dist_l2(&center, p)).collect();
            expected.sort_by(f64::total_cmp);
            for (g, e) in got.iter().zip(&expected[..12]) {
                assert!((g - e).abs() < 1e-9);
            }
        }
    }
}
