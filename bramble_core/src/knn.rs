// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental best-first k-nearest-neighbor search, shared by every tree.
//!
//! The engine keeps two priority queues: a min-heap of pending tree nodes
//! keyed by a lower bound on the distance of anything stored below them, and
//! a [`MinMaxHeap`] of candidate entries keyed by their actual distance,
//! bounded to the `k` best seen so far. An entry is yielded once it is at
//! least as close as every pending node, which guarantees non-decreasing
//! emission order.
//!
//! Trees plug in through [`KnnNav`]: expand one node into scored subnodes
//! and scored entries. The iterator owns all of its scratch state and can be
//! re-aimed with [`KnnIter::reset`] to reuse allocations across queries.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::heap::MinMaxHeap;
use crate::types::Distance;

/// Navigation seam between a tree and the best-first engine.
///
/// `Node` is a handle to an unexpanded subtree (an arena index, a node
/// reference, or a small descent record); `Entry` is whatever the tree
/// yields for a stored entry, typically a key/value reference pair.
///
/// Correctness requirement: the distance reported for a subnode must be a
/// lower bound on the distance of every entry stored below it.
pub trait KnnNav<'a> {
    /// Handle to an unexpanded subtree.
    type Node: Clone;
    /// Handle to a stored entry.
    type Entry: Clone;

    /// The root node with its lower-bound distance, or `None` when empty.
    fn knn_root(&'a self, center: &[f64], dist: &dyn Distance) -> Option<(f64, Self::Node)>;

    /// Expand `node`, reporting each subnode and each entry with its
    /// distance from `center`.
    fn knn_expand(
        &'a self,
        node: &Self::Node,
        center: &[f64],
        dist: &dyn Distance,
        push_node: &mut dyn FnMut(f64, Self::Node),
        push_entry: &mut dyn FnMut(f64, Self::Entry),
    );
}

/// One k-NN result: an entry handle and its distance from the query center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KnnEntry<E> {
    /// Distance from the query center under the iterator's distance function.
    pub dist: f64,
    /// The tree's entry handle.
    pub entry: E,
}

// Priority-queue element ordered by distance alone.
#[derive(Clone)]
struct Scored<X> {
    dist: OrderedFloat<f64>,
    item: X,
}

impl<X> Scored<X> {
    fn new(dist: f64, item: X) -> Self {
        // NaN distances order as +inf: such candidates lose every
        // comparison and can never block termination.
        let dist = if dist.is_nan() { f64::INFINITY } else { dist };
        Self {
            dist: OrderedFloat(dist),
            item,
        }
    }
}

impl<X> PartialEq for Scored<X> {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}

impl<X> Eq for Scored<X> {}

impl<X> PartialOrd for Scored<X> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<X> Ord for Scored<X> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.cmp(&other.dist)
    }
}

/// Resumable best-first k-NN iterator over a tree implementing [`KnnNav`].
///
/// Yields entries in non-decreasing distance order; the first `k` yielded
/// entries are a correct k-nearest set under the supplied distance function.
/// The iterator ends after `k` entries or when the tree is exhausted,
/// whichever comes first.
pub struct KnnIter<'a, T: KnnNav<'a>> {
    tree: &'a T,
    dist_fn: &'a dyn Distance,
    filter: Option<&'a dyn Fn(&T::Entry) -> bool>,
    center: Vec<f64>,
    k: usize,
    remaining: usize,
    max_node_dist: f64,
    nodes: BinaryHeap<Reverse<Scored<T::Node>>>,
    candidates: MinMaxHeap<Scored<T::Entry>>,
    node_scratch: Vec<(f64, T::Node)>,
    entry_scratch: Vec<(f64, T::Entry)>,
}

impl<'a, T: KnnNav<'a>> std::fmt::Debug for KnnIter<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnnIter")
            .field("k", &self.k)
            .field("remaining", &self.remaining)
            .field("max_node_dist", &self.max_node_dist)
            .field("pending_nodes", &self.nodes.len())
            .field("candidates", &self.candidates.len())
            .finish_non_exhaustive()
    }
}

impl<'a, T: KnnNav<'a>> KnnIter<'a, T> {
    /// Start a k-NN query on `tree` around `center`.
    pub fn new(tree: &'a T, center: &[f64], k: usize, dist_fn: &'a dyn Distance) -> Self {
        let mut iter = Self {
            tree,
            dist_fn,
            filter: None,
            center: Vec::new(),
            k,
            remaining: k,
            max_node_dist: f64::INFINITY,
            nodes: BinaryHeap::new(),
            candidates: MinMaxHeap::new(),
            node_scratch: Vec::new(),
            entry_scratch: Vec::new(),
        };
        iter.reset(center, k);
        iter
    }

    /// Re-aim the iterator at a new center and `k`, reusing all allocations.
    pub fn reset(&mut self, center: &[f64], k: usize) {
        self.center.clear();
        self.center.extend_from_slice(center);
        self.k = k;
        self.remaining = k;
        self.max_node_dist = f64::INFINITY;
        self.nodes.clear();
        self.candidates.clear();
        if k > 0
            && let Some((d, root)) = self.tree.knn_root(&self.center, self.dist_fn)
        {
            self.nodes.push(Reverse(Scored::new(d, root)));
        }
    }

    /// Like [`reset`][Self::reset], additionally swapping the distance
    /// function.
    pub fn reset_with_dist(&mut self, center: &[f64], k: usize, dist_fn: &'a dyn Distance) {
        self.dist_fn = dist_fn;
        self.reset(center, k);
    }

    /// Install an entry filter. Entries rejected by the filter are dropped
    /// before they enter the candidate queue.
    pub fn with_filter(mut self, filter: &'a dyn Fn(&T::Entry) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }

    fn expand(&mut self, node: &T::Node) {
        let mut node_buf = std::mem::take(&mut self.node_scratch);
        let mut entry_buf = std::mem::take(&mut self.entry_scratch);
        node_buf.clear();
        entry_buf.clear();
        self.tree.knn_expand(
            node,
            &self.center,
            self.dist_fn,
            &mut |d, n| node_buf.push((d, n)),
            &mut |d, e| entry_buf.push((d, e)),
        );
        for (d, n) in node_buf.drain(..) {
            let scored = Scored::new(d, n);
            if scored.dist.0 <= self.max_node_dist {
                self.nodes.push(Reverse(scored));
            }
        }
        for (d, e) in entry_buf.drain(..) {
            if let Some(filter) = self.filter
                && !filter(&e)
            {
                continue;
            }
            let scored = Scored::new(d, e);
            if scored.dist.0 > self.max_node_dist {
                continue;
            }
            self.candidates.push(scored);
            if self.candidates.len() > self.k {
                self.candidates.pop_max();
            }
            if self.candidates.len() >= self.k
                && let Some(worst) = self.candidates.peek_max()
            {
                self.max_node_dist = self.max_node_dist.min(worst.dist.0);
            }
        }
        self.node_scratch = node_buf;
        self.entry_scratch = entry_buf;
    }
}

impl<'a, T: KnnNav<'a>> Iterator for KnnIter<'a, T> {
    type Item = KnnEntry<T::Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        loop {
            let best_node = self.nodes.peek().map(|Reverse(s)| s.dist.0);
            let best_candidate = self.candidates.peek_min().map(|s| s.dist.0);
            match (best_candidate, best_node) {
                (None, None) => return None,
                (Some(c), n) if n.is_none_or(|nd| c <= nd) => {
                    let scored = self
                        .candidates
                        .pop_min()
                        .expect("candidate heap lost its peeked minimum");
                    self.remaining -= 1;
                    return Some(KnnEntry {
                        dist: scored.dist.0,
                        entry: scored.item,
                    });
                }
                _ => {
                    let Reverse(scored) = self
                        .nodes
                        .pop()
                        .expect("node heap lost its peeked minimum");
                    // A node may have been enqueued before the bound
                    // tightened; skip it instead of expanding.
                    if scored.dist.0 > self.max_node_dist {
                        continue;
                    }
                    let node = scored.item;
                    self.expand(&node);
                }
            }
        }
    }
}
