// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hypercube-indexed PR-quadtree with single-entry slots.
//!
//! Like [`QuadTreeHc`][crate::QuadTreeHc], directory nodes hold a packed
//! `2^d` child array — but a slot is a tagged union `Empty | Entry | Node`,
//! so a lone point in a quadrant is stored inline instead of paying for a
//! one-entry subnode. Slots demote back to inline entries when removal
//! leaves a child leaf with a single point.

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

#[derive(Clone, Debug, Default)]
pub(crate) enum Slot<V> {
    #[default]
    Empty,
    Entry(QEntry<V>),
    Node(Box<Hc2Node<V>>),
}

#[derive(Clone, Debug)]
pub(crate) enum Hc2Kind<V> {
    Leaf(Vec<QEntry<V>>),
    Dir(Box<[Slot<V>]>),
}

#[derive(Clone, Debug)]
pub struct Hc2Node<V> {
    pub(crate) center: Box<[f64]>,
    pub(crate) radius: f64,
    pub(crate) kind: Hc2Kind<V>,
}

fn empty_slots<V>(dims: usize) -> Box<[Slot<V>]> {
    let mut v = Vec::with_capacity(1 << dims);
    v.resize_with(1 << dims, || Slot::Empty);
    v.into_boxed_slice()
}

/// Hypercube-indexed PR-quadtree with inline single-entry slots.
#[derive(Debug)]
pub struct QuadTreeHc2<V> {
    dims: usize,
    max_node_capacity: usize,
    align: bool,
    hint: Option<(Box<[f64]>, f64)>,
    pub(crate) root: Option<Box<Hc2Node<V>>>,
    size: usize,
    pub(crate) dist_calls: Cell<u64>,
}

impl<V> QuadTreeHc2<V> {
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
            "creating hypercube quadtree with entry slots"
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
            self.root = Some(Box::new(Hc2Node {
                center,
                radius,
                kind: Hc2Kind::Leaf(Vec::new()),
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
            let mut slots = empty_slots(dims);
            slots[old_q] = Slot::Node(old);
            self.root = Some(Box::new(Hc2Node {
                center,
                radius,
                kind: Hc2Kind::Dir(slots),
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

    fn insert_rec(node: &mut Hc2Node<V>, entry: QEntry<V>, cap: usize) {
        debug_assert!(
            fits_in_node(&entry.point, &node.center, node.radius),
            "routing violated the node cube"
        );
        match &mut node.kind {
            Hc2Kind::Leaf(entries) => {
                if entries.len() < cap || entries.iter().all(|e| e.point == entry.point) {
                    entries.push(entry);
                    return;
                }
                let dims = node.center.len();
                let old = std::mem::take(entries);
                node.kind = Hc2Kind::Dir(empty_slots(dims));
                for e in old {
                    Self::insert_into_dir(node, e, cap);
                }
                Self::insert_into_dir(node, entry, cap);
            }
            Hc2Kind::Dir(_) => Self::insert_into_dir(node, entry, cap),
        }
    }

    fn insert_into_dir(node: &mut Hc2Node<V>, entry: QEntry<V>, cap: usize) {
        let center = node.center.clone();
        let radius = node.radius;
        let q = quadrant(&center, &entry.point);
        let Hc2Kind::Dir(slots) = &mut node.kind else {
            unreachable!("insert_into_dir on a leaf");
        };
        match &mut slots[q] {
            Slot::Empty => slots[q] = Slot::Entry(entry),
            Slot::Entry(_) => {
                // Second point in this quadrant: promote the slot to a
                // subnode holding both.
                let Slot::Entry(existing) = std::mem::take(&mut slots[q]) else {
                    unreachable!("slot changed type under us");
                };
                let mut sub = Box::new(Hc2Node {
                    center: child_center(&center, radius, q),
                    radius: radius * 0.5,
                    kind: Hc2Kind::Leaf(Vec::new()),
                });
                Self::insert_rec(&mut sub, existing, cap);
                Self::insert_rec(&mut sub, entry, cap);
                slots[q] = Slot::Node(sub);
            }
            Slot::Node(sub) => Self::insert_rec(sub, entry, cap),
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
        node: &mut Hc2Node<V>,
        key: &[f64],
        pred: &mut dyn FnMut(&V) -> bool,
        cap: usize,
    ) -> Option<V> {
        match &mut node.kind {
            Hc2Kind::Leaf(entries) => {
                let pos = entries
                    .iter()
                    .position(|e| *e.point == *key && pred(&e.value))?;
                Some(entries.remove(pos).value)
            }
            Hc2Kind::Dir(_) => {
                let center = node.center.clone();
                let Hc2Kind::Dir(slots) = &mut node.kind else {
                    unreachable!("kind changed under us");
                };
                let q = quadrant(&center, key);
                let removed = match &mut slots[q] {
                    Slot::Empty => return None,
                    Slot::Entry(e) => {
                        if *e.point == *key && pred(&e.value) {
                            let Slot::Entry(e) = std::mem::take(&mut slots[q]) else {
                                unreachable!("slot changed type under us");
                            };
                            e.value
                        } else {
                            return None;
                        }
                    }
                    Slot::Node(sub) => {
                        let removed = Self::remove_rec(sub, key, pred, cap)?;
                        Self::demote_slot(&mut slots[q]);
                        removed
                    }
                };
                Self::try_merge(node, cap);
                Some(removed)
            }
        }
    }

    // After a removal inside a child node: drop it when empty, pull a lone
    // entry back inline.
    fn demote_slot(slot: &mut Slot<V>) {
        let Slot::Node(sub) = slot else {
            return;
        };
        match &mut sub.kind {
            Hc2Kind::Leaf(es) if es.is_empty() => *slot = Slot::Empty,
            Hc2Kind::Leaf(es) if es.len() == 1 => {
                let entry = es.pop().expect("length was checked");
                *slot = Slot::Entry(entry);
            }
            _ => {}
        }
    }

    // Collapse a directory back into a leaf when its inline entries plus
    // its leaf children fit into one node. Directory children block the
    // merge.
    fn try_merge(node: &mut Hc2Node<V>, cap: usize) {
        let Hc2Kind::Dir(slots) = &node.kind else {
            return;
        };
        let mut total = 0;
        for slot in slots {
            match slot {
                Slot::Empty => {}
                Slot::Entry(_) => total += 1,
                Slot::Node(sub) => match &sub.kind {
                    Hc2Kind::Leaf(es) => total += es.len(),
                    Hc2Kind::Dir(_) => return,
                },
            }
        }
        if total > cap {
            return;
        }
        trace!(total, "merging quadtree leaves");
        let Hc2Kind::Dir(slots) =
            std::mem::replace(&mut node.kind, Hc2Kind::Leaf(Vec::new()))
        else {
            unreachable!("kind changed under us");
        };
        let Hc2Kind::Leaf(entries) = &mut node.kind else {
            unreachable!("kind changed under us");
        };
        for slot in slots {
            match slot {
                Slot::Empty => {}
                Slot::Entry(e) => entries.push(e),
                Slot::Node(sub) => {
                    let Hc2Kind::Leaf(es) = sub.kind else {
                        unreachable!("merge saw a directory child");
                    };
                    entries.extend(es);
                }
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
        node: &mut Hc2Node<V>,
        old_key: &[f64],
        new_key: &[f64],
        matches: &mut dyn FnMut(&V) -> bool,
        cap: usize,
    ) -> Outcome<V> {
        let outcome = match &mut node.kind {
            Hc2Kind::Leaf(entries) => {
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
            Hc2Kind::Dir(_) => {
                let center = node.center.clone();
                let Hc2Kind::Dir(slots) = &mut node.kind else {
                    unreachable!("kind changed under us");
                };
                let q = quadrant(&center, old_key);
                match &mut slots[q] {
                    Slot::Empty => return Outcome::NotFound,
                    Slot::Entry(e) => {
                        if *e.point == *old_key && matches(&e.value) {
                            let Slot::Entry(e) = std::mem::take(&mut slots[q]) else {
                                unreachable!("slot changed type under us");
                            };
                            Outcome::Reinsert(QEntry {
                                point: new_key.into(),
                                value: e.value,
                            })
                        } else {
                            return Outcome::NotFound;
                        }
                    }
                    Slot::Node(sub) => {
                        let outcome = Self::update_rec(sub, old_key, new_key, matches, cap);
                        if matches!(outcome, Outcome::Reinsert(_)) {
                            Self::demote_slot(&mut slots[q]);
                        }
                        outcome
                    }
                }
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
        let mut found = false;
        self.visit_exact_inner(key, &mut |_, _| found = true);
        found
    }

    fn visit_exact_inner<'a>(&'a self, key: &[f64], f: &mut dyn FnMut(&[f64], &'a V)) {
        let Some(mut node) = self.root.as_deref() else {
            return;
        };
        if !fits_in_node(key, &node.center, node.radius) {
            return;
        }
        loop {
            match &node.kind {
                Hc2Kind::Leaf(entries) => {
                    for e in entries {
                        if *e.point == *key {
                            f(&e.point, &e.value);
                        }
                    }
                    return;
                }
                Hc2Kind::Dir(slots) => {
                    let q = quadrant(&node.center, key);
                    match &slots[q] {
                        Slot::Empty => return,
                        Slot::Entry(e) => {
                            if *e.point == *key {
                                f(&e.point, &e.value);
                            }
                            return;
                        }
                        Slot::Node(sub) => node = sub,
                    }
                }
            }
        }
    }

    /// Visit every entry whose key equals `key`.
    pub fn visit_exact<'a>(&'a self, key: &[f64], f: &mut dyn FnMut(&[f64], &'a V)) {
        self.check_dims(key);
        self.visit_exact_inner(key, f);
    }

    /// All entries whose key lies in the closed box `[min, max]`.
    pub fn query(&self, min: &[f64], max: &[f64]) -> Hc2WindowIter<'_, V> {
        self.check_dims(min);
        self.check_dims(max);
        Hc2WindowIter::new(self.root.as_deref(), min, max, false)
    }

    /// All entries, in the tree's traversal order.
    pub fn iter(&self) -> Hc2WindowIter<'_, V> {
        Hc2WindowIter::new(self.root.as_deref(), &[], &[], true)
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

    fn stats_walk(node: &Hc2Node<V>, level: usize, stats: &mut IndexStats) {
        match &node.kind {
            Hc2Kind::Leaf(entries) => {
                stats.record_node(level, true);
                stats.record_entries(level, entries.len());
            }
            Hc2Kind::Dir(slots) => {
                stats.record_node(level, false);
                let inline = slots
                    .iter()
                    .filter(|s| matches!(s, Slot::Entry(_)))
                    .count();
                stats.record_entries(level, inline);
                for slot in slots {
                    if let Slot::Node(sub) = slot {
                        Self::stats_walk(sub, level + 1, stats);
                    }
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

    fn check_node(node: &Hc2Node<V>, parent: Option<(&[f64], f64)>, cap: usize) -> usize {
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
            Hc2Kind::Leaf(entries) => {
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
            Hc2Kind::Dir(slots) => {
                let mut count = 0;
                let mut present = 0;
                for (q, slot) in slots.iter().enumerate() {
                    match slot {
                        Slot::Empty => {}
                        Slot::Entry(e) => {
                            present += 1;
                            assert_eq!(
                                quadrant(&node.center, &e.point),
                                q,
                                "inline entry stored under the wrong quadrant"
                            );
                            assert!(
                                fits_in_node(&e.point, &node.center, node.radius),
                                "inline entry outside the node cube"
                            );
                            count += 1;
                        }
                        Slot::Node(sub) => {
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
                }
                assert!(present > 0, "directory without occupied slots");
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

/// Resumable window iterator over an entry-slot hypercube quadtree.
#[derive(Debug)]
pub struct Hc2WindowIter<'a, V> {
    min: Box<[f64]>,
    max: Box<[f64]>,
    all: bool,
    stack: SmallVec<[(&'a Hc2Node<V>, usize); 16]>,
}

impl<'a, V> Hc2WindowIter<'a, V> {
    fn new(root: Option<&'a Hc2Node<V>>, min: &[f64], max: &[f64], all: bool) -> Self {
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

impl<'a, V> Iterator for Hc2WindowIter<'a, V> {
    type Item = (&'a [f64], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&(node, pos)) = self.stack.last() {
            match &node.kind {
                Hc2Kind::Leaf(entries) => {
                    let mut i = pos;
                    let mut hit = None;
                    while let Some(e) = entries.get(i) {
                        i += 1;
                        if self.all || contains(&self.min, &self.max, &e.point) {
                            hit = Some(e);
                            break;
                        }
                    }
                    match hit {
                        Some(e) => {
                            self.stack.last_mut().expect("stack emptied under us").1 = i;
                            return Some((&e.point, &e.value));
                        }
                        None => {
                            self.stack.pop();
                        }
                    }
                }
                Hc2Kind::Dir(slots) => {
                    let mut i = pos;
                    loop {
                        let Some(slot) = slots.get(i) else {
                            self.stack.pop();
                            break;
                        };
                        i += 1;
                        match slot {
                            Slot::Empty => {}
                            Slot::Entry(e) => {
                                if self.all || contains(&self.min, &self.max, &e.point) {
                                    self.stack.last_mut().expect("stack emptied under us").1 = i;
                                    return Some((&e.point, &e.value));
                                }
                            }
                            Slot::Node(sub) => {
                                if self.all
                                    || cube_intersects(
                                        &sub.center,
                                        sub.radius,
                                        &self.min,
                                        &self.max,
                                    )
                                {
                                    self.stack.last_mut().expect("stack emptied under us").1 = i;
                                    self.stack.push((sub, 0));
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }
        None
    }
}

impl<'a, V: 'a> KnnNav<'a> for QuadTreeHc2<V> {
    type Node = &'a Hc2Node<V>;
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
            Hc2Kind::Leaf(entries) => {
                for e in entries {
                    self.dist_calls.set(self.dist_calls.get() + 1);
                    push_entry(dist.to_point(center, &e.point), e);
                }
            }
            Hc2Kind::Dir(slots) => {
                let mut lo = vec![0.0; self.dims];
                let mut hi = vec![0.0; self.dims];
                for slot in slots {
                    match slot {
                        Slot::Empty => {}
                        Slot::Entry(e) => {
                            self.dist_calls.set(self.dist_calls.get() + 1);
                            push_entry(dist.to_point(center, &e.point), e);
                        }
                        Slot::Node(sub) => {
                            cube_bounds(&sub.center, sub.radius, &mut lo, &mut hi);
                            self.dist_calls.set(self.dist_calls.get() + 1);
                            push_node(dist.node_bound(center, &lo, &hi), sub);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QuadTreeHc2;
    use bramble_core::types::{contains, dist_l2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample(rng: &mut StdRng, dims: usize) -> Vec<f64> {
        (0..dims).map(|_| rng.gen_range(-20.0..20.0)).collect()
    }

    #[test]
    fn round_trip_matches_linear_reference() {
        let mut rng = StdRng::seed_from_u64(71);
        let mut t = QuadTreeHc2::new(2).expect("valid dims");
        let mut reference: Vec<(Vec<f64>, u32)> = Vec::new();
        for i in 0..700_u32 {
            let p = sample(&mut rng, 2);
            t.insert(&p, i);
            reference.push((p, i));
        }
        t.check_invariants();
        for _ in 0..40 {
            let a = sample(&mut rng, 2);
            let b = sample(&mut rng, 2);
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
    fn lone_points_live_inline() {
        let mut t = QuadTreeHc2::new(2).expect("valid dims");
        // Spread points so each lands alone in a quadrant after the split.
        for (i, p) in [[5.0, 5.0], [-5.0, 5.0], [5.0, -5.0], [-5.0, -5.0]]
            .iter()
            .enumerate()
        {
            for j in 0..4 {
                let jf = f64::from(j);
                t.insert(&[p[0] + jf * 0.1, p[1] + jf * 0.1], i * 10 + j as usize);
            }
        }
        t.insert(&[0.25, 0.25], 99);
        t.check_invariants();
        assert_eq!(t.size(), 17);
        assert!(t.contains_point(&[0.25, 0.25]));
    }

    #[test]
    fn removal_demotes_single_entry_subnodes() {
        let mut t = QuadTreeHc2::new(2).expect("valid dims");
        for i in 0..200_u32 {
            let x = f64::from(i % 20);
            let y = f64::from(i / 20);
            t.insert(&[x, y], i);
        }
        let full = t.stats().n_nodes;
        for i in 0..190_u32 {
            let x = f64::from(i % 20);
            let y = f64::from(i / 20);
            assert_eq!(t.remove(&[x, y], &i), Some(i));
            if i % 25 == 0 {
                t.check_invariants();
            }
        }
        t.check_invariants();
        assert!(t.stats().n_nodes < full);
        assert_eq!(t.size(), 10);
    }

    #[test]
    fn coincident_points_overflow_one_leaf() {
        let mut t = QuadTreeHc2::new(3).expect("valid dims");
        for i in 0..50_u32 {
            t.insert(&[1.0, 2.0, 3.0], i);
        }
        assert_eq!(t.stats().n_nodes, 1);
        assert_eq!(t.size(), 50);
        t.check_invariants();
    }

    #[test]
    fn knn_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(72);
        let mut t = QuadTreeHc2::new(2).expect("valid dims");
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
    fn update_between_slots() {
        let mut t = QuadTreeHc2::new(2).expect("valid dims");
        for i in 0..30_u32 {
            t.insert(&[f64::from(i % 6) * 2.0, f64::from(i / 6) * 2.0], i);
        }
        assert!(t.update(&[0.0, 0.0], &[11.0, 9.0], &0));
        assert!(t.contains_point(&[11.0, 9.0]));
        assert_eq!(t.size(), 30);
        t.check_invariants();
    }
}
