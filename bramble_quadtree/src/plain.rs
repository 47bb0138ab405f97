// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plain PR-quadtree: directory nodes keep a dense list of the subnodes
//! that actually exist.
//!
//! Entries live in leaves only. A leaf splits once it holds
//! `max_node_capacity` distinct points and another arrives; a leaf whose
//! points are all coincident grows past the capacity instead, since no
//! split could separate them. Removal merges a directory back into a leaf
//! when all of its children are leaves and their entries fit into one
//! node.

use std::cell::Cell;

use smallvec::SmallVec;
use tracing::{debug, trace};

use bramble_core::types::contains;
use bramble_core::{
    Distance, IndexConfig, IndexError, IndexStats, KnnIter, KnnNav, L2Distance,
};

use crate::common::{
    QEntry, cube_bounds, cube_intersects, child_center, fits_in_node, grow_towards,
    initial_root, quadrant,
};

static L2: L2Distance = L2Distance;

#[derive(Clone, Debug)]
pub(crate) enum QKind<V> {
    Leaf(Vec<QEntry<V>>),
    Dir(Vec<QNode<V>>),
}

#[derive(Clone, Debug)]
pub struct QNode<V> {
    pub(crate) center: Box<[f64]>,
    pub(crate) radius: f64,
    pub(crate) kind: QKind<V>,
}

/// Plain PR-quadtree multimap over d-dimensional points.
///
/// ```rust
/// use bramble_quadtree::QuadTree;
///
/// let mut t = QuadTree::new(2).unwrap();
/// t.insert(&[1.0, 1.0], "a");
/// t.insert(&[-4.0, 2.5], "b");
/// let hits: Vec<_> = t.query(&[0.0, 0.0], &[2.0, 2.0]).collect();
/// assert_eq!(hits.len(), 1);
/// ```
#[derive(Debug)]
pub struct QuadTree<V> {
    dims: usize,
    max_node_capacity: usize,
    align: bool,
    hint: Option<(Box<[f64]>, f64)>,
    pub(crate) root: Option<QNode<V>>,
    size: usize,
    pub(crate) dist_calls: Cell<u64>,
}

impl<V> QuadTree<V> {
    /// Create an empty tree with the default node capacity.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        Self::from_config(&IndexConfig::new(dims))
    }

    /// Create an empty tree from a configuration record.
    pub fn from_config(config: &IndexConfig) -> Result<Self, IndexError> {
        config.validate(1, usize::MAX)?;
        debug!(
            dims = config.dims,
            capacity = config.max_node_capacity,
            "creating plain quadtree"
        );
        Ok(Self {
            dims: config.dims,
            max_node_capacity: config.max_node_capacity,
            align: config.align,
            hint: config
                .root_hint
                .as_ref()
                .map(|h| (h.center.clone(), h.radius)),
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

    /// Remove all entries (the root geometry is dropped too).
    pub fn clear(&mut self) {
        self.root = None;
        self.size = 0;
    }

    #[track_caller]
    pub(crate) fn check_dims(&self, key: &[f64]) {
        assert_eq!(
            key.len(),
            self.dims,
            "key has {} dimensions, tree expects {}",
            key.len(),
            self.dims
        );
    }

    fn ensure_root_covers(&mut self, key: &[f64]) {
        if self.root.is_none() {
            let (center, radius) = initial_root(
                self.hint.as_ref().map(|(c, r)| (&**c, *r)),
                self.align,
                key,
            );
            self.root = Some(QNode {
                center,
                radius,
                kind: QKind::Leaf(Vec::new()),
            });
        }
        if self.size == 0 {
            // Nothing stored yet: re-scale in place instead of nesting
            // directories around an empty leaf.
            let root = self.root.as_mut().expect("root was just created");
            while !fits_in_node(key, &root.center, root.radius) {
                let (center, radius, _) = grow_towards(&root.center, root.radius, key);
                root.center = center;
                root.radius = radius;
            }
            return;
        }
        while {
            let root = self.root.as_ref().expect("non-empty tree without root");
            !fits_in_node(key, &root.center, root.radius)
        } {
            let old = self.root.take().expect("non-empty tree without root");
            let (center, radius, _) = grow_towards(&old.center, old.radius, key);
            trace!(radius, "growing quadtree root");
            self.root = Some(QNode {
                center,
                radius,
                kind: QKind::Dir(vec![old]),
            });
        }
    }

    /// Insert an entry. Duplicate `(point, value)` pairs are stored again.
    pub fn insert(&mut self, key: &[f64], value: V) {
        self.check_dims(key);
        self.ensure_root_covers(key);
        let cap = self.max_node_capacity;
        let root = self.root.as_mut().expect("root exists after coverage");
        Self::insert_rec(root, QEntry::new(key, value), cap);
        self.size += 1;
    }

    fn insert_rec(node: &mut QNode<V>, entry: QEntry<V>, cap: usize) {
        debug_assert!(
            fits_in_node(&entry.point, &node.center, node.radius),
            "routing violated the node cube"
        );
        match &mut node.kind {
            QKind::Leaf(entries) => {
                if entries.len() < cap || entries.iter().all(|e| e.point == entry.point) {
                    entries.push(entry);
                    return;
                }
                let old = std::mem::take(entries);
                node.kind = QKind::Dir(Vec::new());
                for e in old {
                    Self::insert_into_dir(node, e, cap);
                }
                Self::insert_into_dir(node, entry, cap);
            }
            QKind::Dir(_) => Self::insert_into_dir(node, entry, cap),
        }
    }

    fn insert_into_dir(node: &mut QNode<V>, entry: QEntry<V>, cap: usize) {
        let center = node.center.clone();
        let radius = node.radius;
        let q = quadrant(&center, &entry.point);
        let QKind::Dir(subs) = &mut node.kind else {
            unreachable!("insert_into_dir on a leaf");
        };
        match subs
            .iter_mut()
            .find(|s| quadrant(&center, &s.center) == q)
        {
            Some(sub) => Self::insert_rec(sub, entry, cap),
            None => subs.push(QNode {
                center: child_center(&center, radius, q),
                radius: radius * 0.5,
                kind: QKind::Leaf(vec![entry]),
            }),
        }
    }

    /// Remove one entry at `key` whose value satisfies `pred`.
    pub fn remove_if(&mut self, key: &[f64], pred: &mut dyn FnMut(&V) -> bool) -> Option<V> {
        self.check_dims(key);
        let cap = self.max_node_capacity;
        let root = self.root.as_mut()?;
        if !fits_in_node(key, &root.center, root.radius) {
            return None;
        }
        let removed = Self::remove_rec(root, key, pred, cap);
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
        node: &mut QNode<V>,
        key: &[f64],
        pred: &mut dyn FnMut(&V) -> bool,
        cap: usize,
    ) -> Option<V> {
        match &mut node.kind {
            QKind::Leaf(entries) => {
                let pos = entries
                    .iter()
                    .position(|e| *e.point == *key && pred(&e.value))?;
                Some(entries.remove(pos).value)
            }
            QKind::Dir(_) => {
                let center = node.center.clone();
                let QKind::Dir(subs) = &mut node.kind else {
                    unreachable!("kind changed under us");
                };
                let q = quadrant(&center, key);
                let idx = subs
                    .iter()
                    .position(|s| quadrant(&center, &s.center) == q)?;
                let removed = Self::remove_rec(&mut subs[idx], key, pred, cap)?;
                if matches!(&subs[idx].kind, QKind::Leaf(es) if es.is_empty()) {
                    subs.swap_remove(idx);
                }
                Self::try_merge(node, cap);
                Some(removed)
            }
        }
    }

    // Collapse a directory whose children are all leaves with few enough
    // entries back into a single leaf. The merged vector is always rebuilt.
    fn try_merge(node: &mut QNode<V>, cap: usize) {
        let QKind::Dir(subs) = &node.kind else {
            return;
        };
        let mut total = 0;
        for s in subs {
            match &s.kind {
                QKind::Leaf(es) => total += es.len(),
                QKind::Dir(_) => return,
            }
        }
        if total > cap {
            return;
        }
        trace!(total, "merging quadtree leaves");
        let QKind::Dir(subs) = std::mem::replace(&mut node.kind, QKind::Leaf(Vec::new()))
        else {
            unreachable!("kind changed under us");
        };
        let QKind::Leaf(entries) = &mut node.kind else {
            unreachable!("kind changed under us");
        };
        for s in subs {
            let QKind::Leaf(es) = s.kind else {
                unreachable!("merge saw a directory child");
            };
            entries.extend(es);
        }
    }

    /// Relocate one entry `(old_key, value)` to `new_key`.
    ///
    /// If the new key still fits the cube of the node holding the entry,
    /// the key is rewritten in place; otherwise the entry bubbles up to the
    /// nearest ancestor that can absorb it, falling back to a fresh descent
    /// from the root.
    pub fn update(&mut self, old_key: &[f64], new_key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        self.check_dims(old_key);
        self.check_dims(new_key);
        let cap = self.max_node_capacity;
        let Some(root) = self.root.as_mut() else {
            return false;
        };
        if !fits_in_node(old_key, &root.center, root.radius) {
            return false;
        }
        match Self::update_rec(root, old_key, new_key, &mut |v| v == value, cap) {
            Outcome::NotFound => false,
            Outcome::Done => true,
            Outcome::Reinsert(entry) => {
                self.ensure_root_covers(new_key);
                let root = self.root.as_mut().expect("root exists after coverage");
                Self::insert_rec(root, entry, cap);
                true
            }
        }
    }

    // Relocation bubbles the entry up as `Reinsert` until an ancestor cube
    // absorbs it; the insert goes back through `insert_rec` so capacity
    // and split rules apply to the new position.
    fn update_rec(
        node: &mut QNode<V>,
        old_key: &[f64],
        new_key: &[f64],
        matches: &mut dyn FnMut(&V) -> bool,
        cap: usize,
    ) -> Outcome<V> {
        let outcome = match &mut node.kind {
            QKind::Leaf(entries) => {
                let Some(pos) = entries
                    .iter()
                    .position(|e| *e.point == *old_key && matches(&e.value))
                else {
                    return Outcome::NotFound;
                };
                let e = entries.remove(pos);
                Outcome::Reinsert(QEntry {
                    point: new_key.into(),
                    value: e.value,
                })
            }
            QKind::Dir(_) => {
                let center = node.center.clone();
                let QKind::Dir(subs) = &mut node.kind else {
                    unreachable!("kind changed under us");
                };
                let q = quadrant(&center, old_key);
                let Some(idx) = subs
                    .iter()
                    .position(|s| quadrant(&center, &s.center) == q)
                else {
                    return Outcome::NotFound;
                };
                let outcome = Self::update_rec(&mut subs[idx], old_key, new_key, matches, cap);
                if matches!(outcome, Outcome::Reinsert(_))
                    && matches!(&subs[idx].kind, QKind::Leaf(es) if es.is_empty())
                {
                    subs.swap_remove(idx);
                }
                outcome
            }
        };
        // The same consolidation as after a removal; it also folds a
        // directory that just lost its last child back into a leaf.
        Self::try_merge(node, cap);
        match outcome {
            Outcome::Reinsert(entry)
                if fits_in_node(new_key, &node.center, node.radius) =>
            {
                Self::insert_rec(node, entry, cap);
                Outcome::Done
            }
            other => other,
        }
    }

    /// Whether any entry has exactly this point key.
    pub fn contains_point(&self, key: &[f64]) -> bool {
        self.check_dims(key);
        self.find_leaf_entries(key)
            .is_some_and(|entries| entries.iter().any(|e| *e.point == *key))
    }

    // Entries of the leaf whose cube routes `key`, if any.
    fn find_leaf_entries(&self, key: &[f64]) -> Option<&Vec<QEntry<V>>> {
        let mut node = self.root.as_ref()?;
        if !fits_in_node(key, &node.center, node.radius) {
            return None;
        }
        loop {
            match &node.kind {
                QKind::Leaf(entries) => return Some(entries),
                QKind::Dir(subs) => {
                    let q = quadrant(&node.center, key);
                    node = subs
                        .iter()
                        .find(|s| quadrant(&node.center, &s.center) == q)?;
                }
            }
        }
    }

    /// Visit every entry whose key equals `key`.
    pub fn visit_exact<'a>(&'a self, key: &[f64], f: &mut dyn FnMut(&[f64], &'a V)) {
        self.check_dims(key);
        if let Some(entries) = self.find_leaf_entries(key) {
            for e in entries {
                if *e.point == *key {
                    f(&e.point, &e.value);
                }
            }
        }
    }

    /// All entries whose key lies in the closed box `[min, max]`.
    pub fn query(&self, min: &[f64], max: &[f64]) -> PlainWindowIter<'_, V> {
        self.check_dims(min);
        self.check_dims(max);
        PlainWindowIter::new(self.root.as_ref(), min, max, false)
    }

    /// All entries, in the tree's traversal order.
    pub fn iter(&self) -> PlainWindowIter<'_, V> {
        PlainWindowIter::new(self.root.as_ref(), &[], &[], true)
    }

    /// The `k` entries nearest to `center`, in non-decreasing L2 order.
    pub fn query_knn<'a>(&'a self, center: &[f64], k: usize) -> KnnIter<'a, Self> {
        self.query_knn_with(center, k, &L2)
    }

    /// k-NN under a caller-supplied distance function.
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
        match &self.root {
            None => {}
            Some(root) => Self::stats_walk(root, 0, &mut stats),
        }
        stats.finish(self.dist_calls.get())
    }

    fn stats_walk(node: &QNode<V>, level: usize, stats: &mut IndexStats) {
        match &node.kind {
            QKind::Leaf(entries) => {
                stats.record_node(level, true);
                stats.record_entries(level, entries.len());
            }
            QKind::Dir(subs) => {
                stats.record_node(level, false);
                for s in subs {
                    Self::stats_walk(s, level + 1, stats);
                }
            }
        }
    }

    /// Opt-in structural validation.
    ///
    /// Checks entry containment, child-cube enclosure (within the epsilon
    /// tolerance), leaf capacity (allowing coincident overflow), and that
    /// no cube has degenerated below floating-point precision. Panics with
    /// a description of the first violation.
    pub fn check_invariants(&self) {
        if let Some(root) = &self.root {
            let counted = Self::check_node(root, None, self.max_node_capacity);
            assert_eq!(counted, self.size, "entry count diverged from size()");
        } else {
            assert_eq!(self.size, 0, "rootless tree with entries");
        }
    }

    pub(crate) fn check_node(
        node: &QNode<V>,
        parent: Option<(&[f64], f64)>,
        cap: usize,
    ) -> usize {
        assert!(
            node.radius.is_finite() && node.radius > f64::MIN_POSITIVE * 4.0,
            "node cube degenerated below floating-point precision"
        );
        if let Some((pc, pr)) = parent {
            let enclosed = node
                .center
                .iter()
                .zip(pc)
                .all(|(&c, &p)| (c - p).abs() + node.radius <= pr * crate::common::EPS_MUL);
            assert!(enclosed, "child cube leaks out of its parent");
        }
        match &node.kind {
            QKind::Leaf(entries) => {
                for e in entries {
                    assert!(
                        fits_in_node(&e.point, &node.center, node.radius),
                        "entry outside its leaf cube"
                    );
                }
                let coincident =
                    entries.len() > 1 && entries.iter().all(|e| e.point == entries[0].point);
                assert!(
                    entries.len() <= cap || coincident,
                    "leaf over capacity without coincident points"
                );
                entries.len()
            }
            QKind::Dir(subs) => {
                assert!(!subs.is_empty(), "directory without subnodes");
                subs.iter()
                    .map(|s| Self::check_node(s, Some((&node.center, node.radius)), cap))
                    .sum()
            }
        }
    }
}

enum Outcome<V> {
    NotFound,
    Done,
    Reinsert(QEntry<V>),
}

/// Resumable window iterator over a plain quadtree.
#[derive(Debug)]
pub struct PlainWindowIter<'a, V> {
    min: Box<[f64]>,
    max: Box<[f64]>,
    all: bool,
    stack: SmallVec<[(&'a QNode<V>, usize); 16]>,
}

impl<'a, V> PlainWindowIter<'a, V> {
    fn new(root: Option<&'a QNode<V>>, min: &[f64], max: &[f64], all: bool) -> Self {
        let mut stack = SmallVec::new();
        if let Some(root) = root
            && (all || cube_intersects(&root.center, root.radius, min, max))
        {
            stack.push((root, 0));
        }
        Self {
            min: min.into(),
            max: max.into(),
            all,
            stack,
        }
    }
}

impl<'a, V> Iterator for PlainWindowIter<'a, V> {
    type Item = (&'a [f64], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.last_mut() {
            let (node, pos) = *frame;
            match &node.kind {
                QKind::Leaf(entries) => {
                    let mut i = pos;
                    while let Some(e) = entries.get(i) {
                        i += 1;
                        if self.all || contains(&self.min, &self.max, &e.point) {
                            frame.1 = i;
                            return Some((&e.point, &e.value));
                        }
                    }
                    self.stack.pop();
                }
                QKind::Dir(subs) => match subs.get(pos) {
                    None => {
                        self.stack.pop();
                    }
                    Some(sub) => {
                        frame.1 = pos + 1;
                        if self.all
                            || cube_intersects(&sub.center, sub.radius, &self.min, &self.max)
                        {
                            self.stack.push((sub, 0));
                        }
                    }
                },
            }
        }
        None
    }
}

impl<'a, V: 'a> KnnNav<'a> for QuadTree<V> {
    type Node = &'a QNode<V>;
    type Entry = &'a QEntry<V>;

    fn knn_root(&'a self, center: &[f64], dist: &dyn Distance) -> Option<(f64, Self::Node)> {
        if self.size == 0 {
            return None;
        }
        let root = self.root.as_ref()?;
        let mut lo = vec![0.0; self.dims];
        let mut hi = vec![0.0; self.dims];
        cube_bounds(&root.center, root.radius, &mut lo, &mut hi);
        self.dist_calls.set(self.dist_calls.get() + 1);
        Some((dist.node_bound(center, &lo, &hi), root))
    }

    fn knn_expand(
        &'a self,
        node: &Self::Node,
        center: &[f64],
        dist: &dyn Distance,
        push_node: &mut dyn FnMut(f64, Self::Node),
        push_entry: &mut dyn FnMut(f64, Self::Entry),
    ) {
        match &node.kind {
            QKind::Leaf(entries) => {
                for e in entries {
                    self.dist_calls.set(self.dist_calls.get() + 1);
                    push_entry(dist.to_point(center, &e.point), e);
                }
            }
            QKind::Dir(subs) => {
                let mut lo = vec![0.0; self.dims];
                let mut hi = vec![0.0; self.dims];
                for s in subs {
                    cube_bounds(&s.center, s.radius, &mut lo, &mut hi);
                    self.dist_calls.set(self.dist_calls.get() + 1);
                    push_node(dist.node_bound(center, &lo, &hi), s);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QuadTree;
    use bramble_core::IndexConfig;
    use bramble_core::types::{contains, dist_l2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample(rng: &mut StdRng, dims: usize) -> Vec<f64> {
        (0..dims).map(|_| rng.gen_range(-50.0..50.0)).collect()
    }

    #[test]
    fn insert_query_remove_round_trip() {
        let mut rng = StdRng::seed_from_u64(31);
        let mut t = QuadTree::new(2).expect("valid dims");
        let mut reference: Vec<(Vec<f64>, u32)> = Vec::new();
        for i in 0..800_u32 {
            let p = sample(&mut rng, 2);
            t.insert(&p, i);
            reference.push((p, i));
        }
        assert_eq!(t.size(), 800);
        t.check_invariants();

        for _ in 0..60 {
            let a = sample(&mut rng, 2);
            let b = sample(&mut rng, 2);
            let min = [a[0].min(b[0]), a[1].min(b[1])];
            let max = [a[0].max(b[0]), a[1].max(b[1])];
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

        for (p, v) in &reference {
            assert_eq!(t.remove(p, v), Some(*v));
        }
        assert_eq!(t.size(), 0);
        t.check_invariants();
    }

    #[test]
    fn coincident_points_overflow_one_leaf() {
        let mut t = QuadTree::new(2).expect("valid dims");
        for i in 0..100_u32 {
            t.insert(&[0.5, 0.5], i);
        }
        assert_eq!(t.size(), 100);
        // No split can separate identical points, so the root stays a leaf.
        let stats = t.stats();
        assert_eq!(stats.n_nodes, 1);
        assert_eq!(stats.n_leaves, 1);
        assert_eq!(stats.max_node_entries, 100);
        t.check_invariants();

        let all: Vec<u32> = t.iter().map(|(_, &v)| v).collect();
        assert_eq!(all.len(), 100);
        for i in 0..100_u32 {
            assert_eq!(t.remove(&[0.5, 0.5], &i), Some(i));
        }
        assert_eq!(t.size(), 0);
    }

    #[test]
    fn merge_collapses_sparse_directories() {
        let mut t = QuadTree::new(2).expect("valid dims");
        for i in 0..40_u32 {
            let x = f64::from(i % 8) * 3.0;
            let y = f64::from(i / 8) * 3.0;
            t.insert(&[x, y], i);
        }
        let grown = t.stats().n_nodes;
        assert!(grown > 1);
        for i in 0..36_u32 {
            let x = f64::from(i % 8) * 3.0;
            let y = f64::from(i / 8) * 3.0;
            assert_eq!(t.remove(&[x, y], &i), Some(i));
        }
        t.check_invariants();
        assert!(t.stats().n_nodes < grown);
        assert_eq!(t.size(), 4);
    }

    #[test]
    fn update_fast_and_slow_paths() {
        let mut t = QuadTree::new(2).expect("valid dims");
        for i in 0..50_u32 {
            t.insert(&[f64::from(i), 0.0], i);
        }
        // Nearby move: stays in the same region.
        assert!(t.update(&[3.0, 0.0], &[3.1, 0.1], &3));
        assert!(t.contains_point(&[3.1, 0.1]));
        assert!(!t.contains_point(&[3.0, 0.0]));
        // Far move: forces re-insertion from an ancestor.
        assert!(t.update(&[40.0, 0.0], &[-200.0, -200.0], &40));
        assert!(t.contains_point(&[-200.0, -200.0]));
        assert_eq!(t.size(), 50);
        t.check_invariants();
        // Missing entries leave the tree unchanged.
        assert!(!t.update(&[3.0, 0.0], &[4.0, 0.0], &3));
    }

    #[test]
    fn knn_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(91);
        let mut t = QuadTree::new(3).expect("valid dims");
        let mut pts = Vec::new();
        for i in 0..500_u32 {
            let p = sample(&mut rng, 3);
            t.insert(&p, i);
            pts.push(p);
        }
        for _ in 0..20 {
            let center = sample(&mut rng, 3);
            let got: Vec<f64> = t.query_knn(&center, 20).map(|e| e.dist).collect();
            assert_eq!(got.len(), 20);
            for w in got.windows(2) {
                assert!(w[0] <= w[1]);
            }
            let mut expected: Vec<f64> = pts.iter().map(|p| dist_l2(&center, p)).collect();
            expected.sort_by(f64::total_cmp);
            for (g, e) in got.iter().zip(&expected[..20]) {
                assert!((g - e).abs() < 1e-9);
            }
        }
        assert!(t.stats().dist_calls > 0);
    }

    #[test]
    fn root_hint_and_alignment_are_honored() {
        let cfg = IndexConfig::new(2)
            .with_root_hint(&[0.3, 0.7], 3.0)
            .with_align(true);
        let mut t = QuadTree::from_config(&cfg).expect("valid config");
        t.insert(&[0.1, 0.2], "in");
        // Points outside the hinted domain still land via root growth.
        t.insert(&[100.0, 100.0], "out");
        assert_eq!(t.size(), 2);
        assert!(t.contains_point(&[100.0, 100.0]));
        t.check_invariants();
    }

    #[test]
    fn duplicates_and_remove_if() {
        let mut t = QuadTree::new(2).expect("valid dims");
        t.insert(&[1.0, 1.0], 7);
        t.insert(&[1.0, 1.0], 8);
        let mut seen = Vec::new();
        t.visit_exact(&[1.0, 1.0], &mut |_, &v| seen.push(v));
        seen.sort_unstable();
        assert_eq!(seen, [7, 8]);
        assert_eq!(t.remove_if(&[1.0, 1.0], &mut |&v| v > 7), Some(8));
        assert_eq!(t.remove_if(&[1.0, 1.0], &mut |&v| v > 7), None);
        assert_eq!(t.size(), 1);
    }
}
