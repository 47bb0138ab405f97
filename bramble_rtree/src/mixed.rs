// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mixed range + k-NN traversal.
//!
//! [`MixedIter`] walks entries in non-decreasing edge distance from a query
//! point, optionally restricted to a rectangle and an arbitrary entry
//! predicate. Unlike the plain iterators it holds no borrow of the tree:
//! every [`next_in`][MixedIter::next_in] call re-validates against the live
//! tree, which makes it legal to remove already-yielded entries between
//! calls. Restructuring caused by such removals can re-surface a node with
//! a stale (too small) priority; the iterator suppresses the duplicates
//! this can produce by tracking the distance of the last yielded entry and
//! every entry already yielded at that distance.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use bramble_core::types::{dist_edge, intersects};

use crate::node::{NodeId, RtKind};
use crate::tree::RTree;

enum MixedKind<V> {
    Node(NodeId),
    Entry {
        min: Box<[f64]>,
        max: Box<[f64]>,
        value: V,
    },
}

struct MixedItem<V> {
    dist: OrderedFloat<f64>,
    kind: MixedKind<V>,
}

impl<V> PartialEq for MixedItem<V> {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}

impl<V> Eq for MixedItem<V> {}

impl<V> PartialOrd for MixedItem<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V> Ord for MixedItem<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.cmp(&other.dist)
    }
}

type EntryFilter<V> = Box<dyn Fn(&[f64], &[f64], &V) -> bool>;

/// Resumable range + k-NN cursor over an [`RTree`].
///
/// Yields `(distance, min, max, value)` with the box and value cloned out
/// of the tree, so nothing borrowed survives between calls. Entries whose
/// box does not intersect the configured rectangle, or that the entry
/// predicate rejects, are skipped.
pub struct MixedIter<V> {
    center: Box<[f64]>,
    rect: Option<(Box<[f64]>, Box<[f64]>)>,
    filter: Option<EntryFilter<V>>,
    queue: BinaryHeap<Reverse<MixedItem<V>>>,
    last_dist: f64,
    returned_at_last: Vec<(Box<[f64]>, Box<[f64]>, V)>,
}

impl<V> std::fmt::Debug for MixedIter<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixedIter")
            .field("center", &self.center)
            .field("has_rect", &self.rect.is_some())
            .field("has_filter", &self.filter.is_some())
            .field("pending", &self.queue.len())
            .field("last_dist", &self.last_dist)
            .finish_non_exhaustive()
    }
}

impl<V: Clone + PartialEq> MixedIter<V> {
    /// Start a traversal of `tree` around `center`.
    pub fn new(tree: &RTree<V>, center: &[f64]) -> Self {
        tree.check_dims(center);
        let mut iter = Self {
            center: center.into(),
            rect: None,
            filter: None,
            queue: BinaryHeap::new(),
            last_dist: f64::NEG_INFINITY,
            returned_at_last: Vec::new(),
        };
        if tree.size() > 0 {
            iter.queue.push(Reverse(MixedItem {
                dist: OrderedFloat(0.0),
                kind: MixedKind::Node(tree.root),
            }));
        }
        iter
    }

    /// Restrict results to entries intersecting the closed rectangle.
    pub fn with_rect(mut self, min: &[f64], max: &[f64]) -> Self {
        self.rect = Some((min.into(), max.into()));
        self
    }

    /// Restrict results with an arbitrary entry predicate.
    pub fn with_filter(mut self, filter: EntryFilter<V>) -> Self {
        self.filter = Some(filter);
        self
    }

    fn accepts(&self, min: &[f64], max: &[f64], value: &V) -> bool {
        if let Some((rmin, rmax)) = &self.rect
            && !intersects(min, max, rmin, rmax)
        {
            return false;
        }
        if let Some(filter) = &self.filter
            && !filter(min, max, value)
        {
            return false;
        }
        true
    }

    /// The next entry in non-decreasing distance order, evaluated against
    /// the current state of `tree`.
    ///
    /// Between calls the caller may remove entries this cursor has already
    /// yielded; other mutations are outside the contract. Duplicates caused
    /// by node restructuring are suppressed at the current distance.
    pub fn next_in(&mut self, tree: &RTree<V>) -> Option<(f64, Box<[f64]>, Box<[f64]>, V)> {
        loop {
            let Reverse(item) = self.queue.pop()?;
            match item.kind {
                MixedKind::Node(id) => {
                    // Ids can go stale when condensation frees nodes.
                    let Some(node) = tree.arena.try_node(id) else {
                        continue;
                    };
                    match &node.kind {
                        RtKind::Dir(children) => {
                            for &c in children {
                                let Some(cn) = tree.arena.try_node(c) else {
                                    continue;
                                };
                                if let Some((rmin, rmax)) = &self.rect
                                    && !intersects(&cn.min, &cn.max, rmin, rmax)
                                {
                                    continue;
                                }
                                tree.dist_calls.set(tree.dist_calls.get() + 1);
                                let d = dist_edge(&self.center, &cn.min, &cn.max);
                                self.queue.push(Reverse(MixedItem {
                                    dist: OrderedFloat(d),
                                    kind: MixedKind::Node(c),
                                }));
                            }
                        }
                        RtKind::Leaf(entries) => {
                            for e in entries {
                                if !self.accepts(&e.min, &e.max, &e.value) {
                                    continue;
                                }
                                tree.dist_calls.set(tree.dist_calls.get() + 1);
                                let d = dist_edge(&self.center, &e.min, &e.max);
                                self.queue.push(Reverse(MixedItem {
                                    dist: OrderedFloat(d),
                                    kind: MixedKind::Entry {
                                        min: e.min.clone(),
                                        max: e.max.clone(),
                                        value: e.value.clone(),
                                    },
                                }));
                            }
                        }
                    }
                }
                MixedKind::Entry { min, max, value } => {
                    let d = item.dist.0;
                    if d < self.last_dist {
                        // Re-surfaced by a stale node priority; it was
                        // already yielded (or filtered) earlier.
                        continue;
                    }
                    if d == self.last_dist
                        && self
                            .returned_at_last
                            .iter()
                            .any(|(m, x, v)| **m == *min && **x == *max && *v == value)
                    {
                        continue;
                    }
                    if d > self.last_dist {
                        self.last_dist = d;
                        self.returned_at_last.clear();
                    }
                    self.returned_at_last
                        .push((min.clone(), max.clone(), value.clone()));
                    return Some((d, min, max, value));
                }
            }
        }
    }
}
