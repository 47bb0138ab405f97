// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Best-first k-NN over the R*-tree.
//!
//! Plugs the tree into the shared engine: directory children are scored by
//! the lower-bound distance to their bounding box, leaf entries by the
//! actual distance to their box key.

use bramble_core::{Distance, EdgeDistance, KnnIter, KnnNav};

use crate::node::{NodeId, RtEntry, RtKind};
use crate::tree::RTree;

static EDGE: EdgeDistance = EdgeDistance;

impl<'a, V: 'a> KnnNav<'a> for RTree<V> {
    type Node = NodeId;
    type Entry = &'a RtEntry<V>;

    fn knn_root(&'a self, center: &[f64], dist: &dyn Distance) -> Option<(f64, NodeId)> {
        if self.size == 0 {
            return None;
        }
        let root = self.arena.node(self.root);
        self.dist_calls.set(self.dist_calls.get() + 1);
        Some((dist.node_bound(center, &root.min, &root.max), self.root))
    }

    fn knn_expand(
        &'a self,
        node: &NodeId,
        center: &[f64],
        dist: &dyn Distance,
        push_node: &mut dyn FnMut(f64, NodeId),
        push_entry: &mut dyn FnMut(f64, &'a RtEntry<V>),
    ) {
        match &self.arena.node(*node).kind {
            RtKind::Dir(children) => {
                for &c in children {
                    let cn = self.arena.node(c);
                    self.dist_calls.set(self.dist_calls.get() + 1);
                    push_node(dist.node_bound(center, &cn.min, &cn.max), c);
                }
            }
            RtKind::Leaf(entries) => {
                for e in entries {
                    self.dist_calls.set(self.dist_calls.get() + 1);
                    push_entry(dist.to_box(center, &e.min, &e.max), e);
                }
            }
        }
    }
}

impl<V> RTree<V> {
    /// The `k` entries nearest to `center` under the edge distance (zero
    /// inside a box, else distance to its nearest face), in non-decreasing
    /// order.
    pub fn query_knn<'a>(&'a self, center: &[f64], k: usize) -> KnnIter<'a, Self> {
        self.query_knn_with(center, k, &EDGE)
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

    /// The single entry nearest to `center`, with its distance.
    pub fn query_1nn(&self, center: &[f64]) -> Option<(f64, &RtEntry<V>)> {
        self.query_knn(center, 1).next().map(|e| (e.dist, e.entry))
    }
}
