// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hypercube-indexed PR-quadtree: directory nodes hold a packed `2^d`
//! child array addressed by the quadrant index.
//!
//! Compared to the plain variant this trades memory for O(1) child lookup;
//! entries still live in leaves only. The dimensionality is capped so the
//! child array stays sane.

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

type ChildArray<V> = Box<[Option<Box<HcNode<V>>>]>;

#[derive(Clone, Debug)]
pub(crate) enum HcKind<V> {
    Leaf(Vec<QEntry<V>>),
    Dir(ChildArray<V>),
}

#[derive(Clone, Debug)]
pub struct HcNode<V> {
    pub(crate) center: Box<[f64]>,
    pub(crate) radius: f64,
    pub(crate) kind: HcKind<V>,
}

fn empty_children<V>(dims: usize) -> ChildArray<V> {
    let mut v = Vec::with_capacity(1 << dims);
    v.resize_with(1 << dims, || None);
    v.into_boxed_slice()
}

/// Hypercube-indexed PR-quadtree multimap over d-dimensional points.
#[derive(Debug)]
pub struct QuadTreeHc<V> {
    dims: usize,
    max_node_capacity: usize,
    align: bool,
    hint: Option<(Box<[f64]>, f64)>,
    pub(crate) root: Option<Box<HcNode<V>>>,
    size: usize,
    pub(crate) dist_calls: Cell<u64>,
}

impl<V> QuadTreeHc<V> {
    /// Largest supported dimensionality (the child array has `2^d` slots).
    pub const MAX_DIMS: usize = 16;

    /// Create an empty tree with the default node capacity.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        Self::from_config(&IndexConfig::new(dims))
    }

    /// Create an empty tree from a configuration record.
    pub fn from_config(config: &IndexConfig) -> Result<Self, IndexError> {
        config.validate(1, Self::MAX_DIMS)?;
        debug!(
            dims = config.dims,
            capacity = config.max_node_capacity,
            "creating hypercube quadtree"
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
        let dims = self.dims;
        if self.root.is_none() {
            let (center, radius) = initial_root(
                self.hint.as_ref().map(|(c, r)| (&**c, *r)),
                self.align,
                key,
            );
            self.root = Some(Box::new(HcNode {
                center,
                radius,
                kind: HcKind::Leaf(Vec::new()),
            }));
        }
        if self.size == 0 {
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
            let (center, radius, old_q) = grow_towards(&old.center, old.radius, key);
            trace!(radius, "growing quadtree root");
            let mut children = empty_children(dims);
            children[old_q] = Some(old);
            self.root = Some(Box::new(HcNode {
                center,
                radius,
                kind: HcKind::Dir(children),
            }));
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

    fn insert_rec(node: &mut HcNode<V>, entry: QEntry<V>, cap: usize) {
        debug_assert!(
            fits_in_node(&entry.point, &node.center, node.radius),
            "routing violated the node cube"
        );
        match &mut node.kind {
            HcKind::Leaf(entries) => {
                if entries.len() < cap || entries.iter().all(|e| e.point == entry.point) {
                    entries.push(entry);
                    return;
                }
                let dims = node.center.len();
                let old = std::mem::take(entries);
                node.kind = HcKind::Dir(empty_children(dims));
                for e in old {
                    Self::insert_into_dir(node, e, cap);
                }
                Self::insert_into_dir(node, entry, cap);
            }
            HcKind::Dir(_) => Self::insert_into_dir(node, entry, cap),
        }
    }

    fn insert_into_dir(node: &mut HcNode<V>, entry: QEntry<V>, cap: usize) {
        let center = node.center.clone();
        let radius = node.radius;
        let q = quadrant(&center, &entry.point);
        let HcKind::Dir(children) = &mut node.kind else {
            unreachable!("insert_into_dir on a leaf");
        };
        match &mut children[q] {
            Some(sub) => Self::insert_rec(sub, entry, cap),
            slot @ None => {
                *slot = Some(Box::new(HcNode {
                    center: child_center(&center, radius, q),
                    radius: radius * 0.5,
                    kind: HcKind::Leaf(vec![entry]),
                }));
            }
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
        node: &mut HcNode<V>,
        key: &[f64],
        pred: &mut dyn FnMut(&V) -> bool,
        cap: usize,
    ) -> Option<V> {
        match &mut node.kind {
            HcKind::Leaf(entries) => {
                let pos = entries
                    .iter()
                    .position(|e| *e.point == *key && pred(&e.value))?;
                Some(entries.remove(pos).value)
            }
            HcKind::Dir(_) => {
                let center = node.center.clone();
                let HcKind::Dir(children) = &mut node.kind else {
                    unreachable!("kind changed under us");
                };
                let q = quadrant(&center, key);
                let sub = children[q].as_mut()?;
                let removed = Self::remove_rec(sub, key, pred, cap)?;
                if matches!(&sub.kind, HcKind::Leaf(es) if es.is_empty()) {
                    children[q] = None;
                }
                Self::try_merge(node, cap);
                Some(removed)
            }
        }
    }

    // Collapse a directory whose present children are all leaves with few
    // enough entries back into a single leaf.
    fn try_merge(node: &mut HcNode<V>, cap: usize) {
        let HcKind::Dir(children) = &node.kind else {
            return;
        };
        let mut total = 0;
        for slot in children {
            match slot.as_deref() {
                None => {}
                Some(HcNode {
                    kind: HcKind::Leaf(es),
                    ..
                }) => total += es.len(),
                Some(_) => return,
            }
        }
        if total > cap {
            return;
        }
        trace!(total, "merging quadtree leaves");
        let HcKind::Dir(children) = std::mem::replace(&mut node.kind, HcKind::Leaf(Vec::new()))
        else {
            unreachable!("kind changed under us");
        };
        let HcKind::Leaf(entries) = &mut node.kind else {
            unreachable!("kind changed under us");
        };
        for slot in children {
            if let Some(sub) = slot {
                let HcKind::Leaf(es) = sub.kind else {
                    unreachable!("merge saw a directory child");
                };
                entries.extend(es);
            }
        }
    }

    /// Relocate one entry `(old_key, value)` to `new_key`, preferring the
    /// smallest enclosing subtree.
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
        node: &mut HcNode<V>,
        old_key: &[f64],
        new_key: &[f64],
        matches: &mut dyn FnMut(&V) -> bool,
        cap: usize,
    ) -> Outcome<V> {
        let outcome = match &mut node.kind {
            HcKind::Leaf(entries) => {
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
            HcKind::Dir(_) => {
                let center = node.center.clone();
                let HcKind::Dir(children) = &mut node.kind else {
                    unreachable!("kind changed under us");
                };
                let q = quadrant(&center, old_key);
                let Some(sub) = children[q].as_mut() else {
                    return Outcome::NotFound;
                };
                let outcome = Self::update_rec(sub, old_key, new_key, matches, cap);
                if matches!(outcome, Outcome::Reinsert(_))
                    && matches!(&sub.kind, HcKind::Leaf(es) if es.is_empty())
                {
                    children[q] = None;
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

    fn find_leaf_entries(&self, key: &[f64]) -> Option<&Vec<QEntry<V>>> {
        let mut node = self.root.as_deref()?;
        if !fits_in_node(key, &node.center, node.radius) {
            return None;
        }
        loop {
            match &node.kind {
                HcKind::Leaf(entries) => return Some(entries),
                HcKind::Dir(children) => {
                    let q = quadrant(&node.center, key);
                    node = children[q].as_deref()?;
                }
            }
        }
    }

    /// Whether any entry has exactly this point key.
    pub fn contains_point(&self, key: &[f64]) -> bool {
        self.check_dims(key);
        self.find_leaf_entries(key)
            .is_some_and(|entries| entries.iter().any(|e| *e.point == *key))
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
    pub fn query(&self, min: &[f64], max: &[f64]) -> HcWindowIter<'_, V> {
        self.check_dims(min);
        self.check_dims(max);
        HcWindowIter::new(self.root.as_deref(), min, max, false)
    }

    /// All entries, in the tree's traversal order.
    pub fn iter(&self) -> HcWindowIter<'_, V> {
        HcWindowIter::new(self.root.as_deref(), &[], &[], true)
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
        if let Some(root) = &self.root {
            Self::stats_walk(root, 0, &mut stats);
        }
        stats.finish(self.dist_calls.get())
    }

    fn stats_walk(node: &HcNode<V>, level: usize, stats: &mut IndexStats) {
        match &node.kind {
            HcKind::Leaf(entries) => {
                stats.record_node(level, true);
                stats.record_entries(level, entries.len());
            }
            HcKind::Dir(children) => {
                stats.record_node(level, false);
                for sub in children.iter().flatten() {
                    Self::stats_walk(sub, level + 1, stats);
                }
            }
        }
    }

    /// Opt-in structural validation; panics on the first violation.
    pub fn check_invariants(&self) {
        if let Some(root) = &self.root {
            let counted = Self::check_node(root, None, self.max_node_capacity);
            assert_eq!(counted, self.size, "entry count diverged from size()");
        } else {
            assert_eq!(self.size, 0, "rootless tree with entries");
        }
    }

    fn check_node(node: &HcNode<V>, parent: Option<(&[f64], f64)>, cap: usize) -> usize {
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
            HcKind::Leaf(entries) => {
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
            HcKind::Dir(children) => {
                let mut count = 0;
                let mut present = 0;
                for (q, slot) in children.iter().enumerate() {
                    if let Some(sub) = slot {
                        present += 1;
                        assert_eq!(
                            quadrant(&node.center, &sub.center),
                            q,
                            "child stored under the wrong quadrant"
                        );
                        count +=
                            Self::check_node(sub, Some((&node.center, node.radius)), cap);
                    }
                }
                assert!(present > 0, "directory without subnodes");
                count
            }
        }
    }
}

enum Outcome<V> {
    NotFound,
    Done,
    Reinsert(QEntry<V>),
}

/// Resumable window iterator over a hypercube quadtree.
#[derive(Debug)]
pub struct HcWindowIter<'a, V> {
    min: Box<[f64]>,
    max: Box<[f64]>,
    all: bool,
    stack: SmallVec<[(&'a HcNode<V>, usize); 16]>,
}

impl<'a, V> HcWindowIter<'a, V> {
    fn new(root: Option<&'a HcNode<V>>, min: &[f64], max: &[f64], all: bool) -> Self {
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

impl<'a, V> Iterator for HcWindowIter<'a, V> {
    type Item = (&'a [f64], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.last_mut() {
            let (node, pos) = *frame;
            match &node.kind {
                HcKind::Leaf(entries) => {
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
                HcKind::Dir(children) => match children.get(pos) {
                    None => {
                        self.stack.pop();
                    }
                    Some(slot) => {
                        frame.1 = pos + 1;
                        if let Some(sub) = slot.as_deref()
                            && (self.all
                                || cube_intersects(
                                    &sub.center,
                                    sub.radius,
                                    &self.min,
                                    &self.max,
                                ))
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

impl<'a, V: 'a> KnnNav<'a> for QuadTreeHc<V> {
    type Node = &'a HcNode<V>;
    type Entry = &'a QEntry<V>;

    fn knn_root(&'a self, center: &[f64], dist: &dyn Distance) -> Option<(f64, Self::Node)> {
        if self.size == 0 {
            return None;
        }
        let root = self.root.as_deref()?;
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
            HcKind::Leaf(entries) => {
                for e in entries {
                    self.dist_calls.set(self.dist_calls.get() + 1);
                    push_entry(dist.to_point(center, &e.point), e);
                }
            }
            HcKind::Dir(children) => {
                let mut lo = vec![0.0; self.dims];
                let mut hi = vec![0.0; self.dims];
                for sub in children.iter().flatten() {
                    cube_bounds(&sub.center, sub.radius, &mut lo, &mut hi);
                    self.dist_calls.set(self.dist_calls.get() + 1);
                    push_node(dist.node_bound(center, &lo, &hi), sub);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QuadTreeHc;
    use bramble_core::types::{contains, dist_l2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample(rng: &mut StdRng, dims: usize) -> Vec<f64> {
        (0..dims).map(|_| rng.gen_range(-20.0..20.0)).collect()
    }

    #[test]
    fn round_trip_matches_linear_reference() {
        let mut rng = StdRng::seed_from_u64(61);
        let mut t = QuadTreeHc::new(3).expect("valid dims");
        let mut reference: Vec<(Vec<f64>, u32)> = Vec::new();
        for i in 0..700_u32 {
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
        for (p, v) in &reference {
            assert_eq!(t.remove(p, v), Some(*v));
        }
        assert!(t.is_empty());
        t.check_invariants();
    }

    #[test]
    fn rejects_too_many_dims() {
        assert!(QuadTreeHc::<u8>::new(17).is_err());
        assert!(QuadTreeHc::<u8>::new(0).is_err());
        assert!(QuadTreeHc::<u8>::new(16).is_ok());
    }

    #[test]
    fn coincident_points_overflow_one_leaf() {
        let mut t = QuadTreeHc::new(2).expect("valid dims");
        for i in 0..64_u32 {
            t.insert(&[-3.25, 8.5], i);
        }
        let stats = t.stats();
        assert_eq!(stats.n_nodes, 1);
        assert_eq!(stats.max_node_entries, 64);
        t.check_invariants();
    }

    #[test]
    fn knn_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(62);
        let mut t = QuadTreeHc::new(2).expect("valid dims");
        let mut pts = Vec::new();
        for i in 0..400_u32 {
            let p = sample(&mut rng, 2);
            t.insert(&p, i);
            pts.push(p);
        }
        for _ in 0..20 {
            let center = sample(&mut rng, 2);
            let got: Vec<f64> = t.query_knn(&center, 15).map(|e| e.dist).collect();
            let mut expected: Vec<f64> = pts.iter().map(|p| dist_l2(&center, p)).collect();
            expected.sort_by(f64::total_cmp);
            for (g, e) in got.iter().zip(&expected[..15]) {
                assert!((g - e).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn update_moves_between_quadrants() {
        let mut t = QuadTreeHc::new(2).expect("valid dims");
        for i in 0..30_u32 {
            t.insert(&[f64::from(i % 6), f64::from(i / 6)], i);
        }
        assert!(t.update(&[0.0, 0.0], &[5.5, 4.5], &0));
        assert!(t.contains_point(&[5.5, 4.5]));
        assert!(!t.update(&[0.0, 0.0], &[1.0, 1.0], &0));
        assert_eq!(t.size(), 30);
        t.check_invariants();
    }
}
