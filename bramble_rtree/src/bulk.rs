// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sort-Tile-Recursive bulk loading.
//!
//! Builds a near-optimally packed R-tree bottom-up: entries are sorted by
//! the center of their box along one dimension, partitioned into slabs,
//! and tiled recursively along the remaining dimensions (cycling); each
//! final tile becomes a leaf, and groups of `max_entries` nodes roll up
//! into directory levels until one root remains. The result is a valid
//! R*-tree and serves every subsequent operation, including incremental
//! inserts and removes.

use std::cell::Cell;

use tracing::debug;

use bramble_core::IndexError;
use bramble_core::types::center_into;

use crate::node::{Arena, NodeId, RtEntry, RtKind, RtNode};
use crate::tree::RTree;

/// Returns the square root of the number, rounded up.
#[inline]
fn isqrt_ceil(num: usize) -> usize {
    let s = num.isqrt();
    if s * s < num { s + 1 } else { s }
}

impl<V> RTree<V> {
    /// Bulk-load a tree from `entries` with the default node capacities.
    pub fn str_load(
        dims: usize,
        entries: Vec<(Box<[f64]>, Box<[f64]>, V)>,
    ) -> Result<Self, IndexError> {
        Self::str_load_with_capacity(
            dims,
            entries,
            Self::DEFAULT_MAX_ENTRIES,
            Self::DEFAULT_MIN_ENTRIES,
        )
    }

    /// Bulk-load a tree from `entries` with explicit node capacities.
    pub fn str_load_with_capacity(
        dims: usize,
        entries: Vec<(Box<[f64]>, Box<[f64]>, V)>,
        max_entries: usize,
        min_entries: usize,
    ) -> Result<Self, IndexError> {
        let mut tree = Self::with_node_capacity(dims, max_entries, min_entries)?;
        if entries.is_empty() {
            return Ok(tree);
        }
        debug!(dims, n = entries.len(), "STR bulk load");
        let size = entries.len();

        // Pair every entry with its center for the tiling sorts.
        let items: Vec<(Box<[f64]>, RtEntry<V>)> = entries
            .into_iter()
            .map(|(min, max, value)| {
                let mut center = vec![0.0; dims].into_boxed_slice();
                center_into(&min, &max, &mut center);
                (center, RtEntry { min, max, value })
            })
            .collect();

        let mut leaves: Vec<Vec<RtEntry<V>>> = Vec::new();
        tile(items, 0, dims, max_entries, &mut leaves);
        rebalance(&mut leaves, min_entries, max_entries);

        // Replace the fresh empty root.
        tree.arena = Arena::new();
        let mut level: Vec<NodeId> = leaves
            .into_iter()
            .map(|group| {
                let mut node = RtNode::empty_leaf(dims);
                for e in &group {
                    node.extend_mbb(&e.min, &e.max);
                }
                node.kind = RtKind::Leaf(group);
                tree.arena.alloc(node)
            })
            .collect();
        let mut depth = 1;

        while level.len() > 1 {
            let mut groups: Vec<Vec<NodeId>> = level
                .chunks(max_entries)
                .map(<[NodeId]>::to_vec)
                .collect();
            rebalance(&mut groups, min_entries, max_entries);
            let mut parents = Vec::with_capacity(groups.len());
            for group in groups {
                let mut node = RtNode::empty_dir(dims);
                for &c in &group {
                    let cn = tree.arena.node(c);
                    let (cmin, cmax) = (cn.min.clone(), cn.max.clone());
                    node.extend_mbb(&cmin, &cmax);
                }
                node.kind = RtKind::Dir(group.clone());
                let parent = tree.arena.alloc(node);
                for &c in &group {
                    tree.arena.node_mut(c).parent = Some(parent);
                }
                parents.push(parent);
            }
            level = parents;
            depth += 1;
        }

        tree.root = level[0];
        tree.size = size;
        tree.depth = depth;
        tree.dist_calls = Cell::new(0);
        Ok(tree)
    }
}

// Tiling can leave an undersized tail group. Merge it into its left
// neighbor when the pair fits into one node, otherwise shift just enough
// items over; `min_fill <= max_fill / 2` guarantees both halves end up at
// or above the minimum.
fn rebalance<T>(groups: &mut Vec<Vec<T>>, min_fill: usize, max_fill: usize) {
    let mut i = 1;
    while i < groups.len() {
        if groups[i].len() >= min_fill {
            i += 1;
            continue;
        }
        if groups[i - 1].len() + groups[i].len() <= max_fill {
            let tail = groups.remove(i);
            groups[i - 1].extend(tail);
        } else {
            let need = min_fill - groups[i].len();
            let at = groups[i - 1].len() - need;
            let mut shifted = groups[i - 1].split_off(at);
            shifted.append(&mut groups[i]);
            groups[i] = shifted;
            i += 1;
        }
    }
}

// Recursively sort by the center along `dim` and cut into slabs until a
// chunk fits into one leaf.
fn tile<V>(
    mut items: Vec<(Box<[f64]>, RtEntry<V>)>,
    dim: usize,
    dims: usize,
    fanout: usize,
    out: &mut Vec<Vec<RtEntry<V>>>,
) {
    let n = items.len();
    if n <= fanout {
        out.push(items.into_iter().map(|(_, e)| e).collect());
        return;
    }
    items.sort_by(|a, b| a.0[dim].total_cmp(&b.0[dim]));
    let leaf_count = n.div_ceil(fanout);
    let slabs = isqrt_ceil(leaf_count);
    let slab_size = n.div_ceil(slabs);
    while !items.is_empty() {
        let tail = items.split_off(items.len().min(slab_size));
        let slab = std::mem::replace(&mut items, tail);
        tile(slab, (dim + 1) % dims, dims, fanout, out);
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::RTree;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn entries(n: usize, seed: u64) -> Vec<(Box<[f64]>, Box<[f64]>, usize)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let p: Box<[f64]> = (0..2).map(|_| rng.gen_range(0.0..1.0)).collect();
                (p.clone(), p, i)
            })
            .collect()
    }

    #[test]
    fn str_load_builds_a_valid_tree() {
        let t = RTree::str_load(2, entries(5000, 17)).expect("valid config");
        assert_eq!(t.size(), 5000);
        t.check_invariants();
        let all: Vec<_> = t.query_intersect(&[0.0, 0.0], &[1.0, 1.0]).collect();
        assert_eq!(all.len(), 5000);
    }

    #[test]
    fn str_load_empty_and_tiny() {
        let t: RTree<usize> = RTree::str_load(2, Vec::new()).expect("valid config");
        assert_eq!(t.size(), 0);
        t.check_invariants();

        let t = RTree::str_load(2, entries(3, 1)).expect("valid config");
        assert_eq!(t.size(), 3);
        assert_eq!(t.depth(), 1);
        t.check_invariants();
    }

    #[test]
    fn awkward_sizes_respect_fill_bounds() {
        for n in [1, 2, 3, 7, 11, 13, 21, 65, 101, 1001] {
            let t = RTree::str_load_with_capacity(2, entries(n, n as u64), 4, 2)
                .expect("valid config");
            assert_eq!(t.size(), n);
            t.check_invariants();
        }
    }

    #[test]
    fn str_loaded_tree_accepts_mutation() {
        let mut t = RTree::str_load(2, entries(1000, 9)).expect("valid config");
        for i in 0..200_u32 {
            let x = 2.0 + f64::from(i) * 0.001;
            t.insert(&[x, x], &[x, x], 1_000_000 + i as usize);
        }
        assert_eq!(t.size(), 1200);
        t.check_invariants();
    }
}
