// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! R*-tree core: structure, insertion with forced reinsertion, topological
//! split, deletion with condensation.
//!
//! The tree follows the classic R*-tree protocol. Inserts descend by least
//! overlap enlargement at the leaf level and least area enlargement above
//! it. The first overflow on a level during one top-level insert removes
//! the entries farthest from the node center and re-inserts them from the
//! root; any further overflow on that level splits along the axis with the
//! smallest margin sum, picking the distribution with the least overlap.
//! Deletion condenses under-full nodes by re-inserting their remaining
//! contents at their original level and collapses single-child roots.

use std::cell::Cell;

use tracing::{debug, trace};

use bramble_core::types::{center_into, contains, dist_l2, encloses, extend};
use bramble_core::{IndexError, IndexStats};

use crate::node::{Arena, NodeId, RtEntry, RtKind, RtNode};

/// R*-tree multimap from axis-aligned boxes to values.
///
/// ```rust
/// use bramble_rtree::RTree;
///
/// let mut t = RTree::new(2).unwrap();
/// t.insert(&[0.0, 0.0], &[1.0, 1.0], "a");
/// t.insert(&[5.0, 5.0], &[6.0, 6.0], "b");
/// let hits: Vec<_> = t.query_intersect(&[0.5, 0.5], &[5.5, 5.5]).collect();
/// assert_eq!(hits.len(), 2);
/// ```
#[derive(Debug)]
pub struct RTree<V> {
    pub(crate) dims: usize,
    pub(crate) max_entries: usize,
    pub(crate) min_entries: usize,
    pub(crate) arena: Arena<V>,
    pub(crate) root: NodeId,
    pub(crate) size: usize,
    // Number of levels; leaves are level 0, the root is level `depth - 1`.
    pub(crate) depth: usize,
    pub(crate) dist_calls: Cell<u64>,
}

pub(crate) enum Item<V> {
    Entry(RtEntry<V>),
    Node(NodeId),
}

impl<V> RTree<V> {
    /// Default maximum number of entries or children per node.
    pub const DEFAULT_MAX_ENTRIES: usize = 10;
    /// Default minimum fill of a non-root node.
    pub const DEFAULT_MIN_ENTRIES: usize = 2;

    /// Create an empty tree with the default node capacities.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        Self::with_node_capacity(dims, Self::DEFAULT_MAX_ENTRIES, Self::DEFAULT_MIN_ENTRIES)
    }

    /// Create an empty tree with explicit node capacities.
    ///
    /// `max_entries` bounds both directory fanout and leaf size;
    /// `min_entries` is the fill every non-root node keeps, and must not
    /// exceed `max_entries / 2` so a split can always satisfy both halves.
    pub fn with_node_capacity(
        dims: usize,
        max_entries: usize,
        min_entries: usize,
    ) -> Result<Self, IndexError> {
        if dims < 1 {
            return Err(IndexError::InvalidDimensions {
                dims,
                min: 1,
                max: usize::MAX,
            });
        }
        if max_entries < 2 {
            return Err(IndexError::InvalidCapacity {
                capacity: max_entries,
            });
        }
        if min_entries < 1 || min_entries > max_entries / 2 {
            return Err(IndexError::InvalidCapacity {
                capacity: min_entries,
            });
        }
        debug!(dims, max_entries, min_entries, "creating R*-tree");
        let mut arena = Arena::new();
        let root = arena.alloc(RtNode::empty_leaf(dims));
        Ok(Self {
            dims,
            max_entries,
            min_entries,
            arena,
            root,
            size: 0,
            depth: 1,
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

    /// Number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.arena.alive()
    }

    /// Number of levels (a tree holding only a root leaf has depth 1).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = self.arena.alloc(RtNode::empty_leaf(self.dims));
        self.size = 0;
        self.depth = 1;
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

    /// Insert an entry. Duplicate `(box, value)` pairs are stored again.
    pub fn insert(&mut self, min: &[f64], max: &[f64], value: V) {
        self.check_dims(min);
        self.check_dims(max);
        let mut reinserted = vec![false; self.depth];
        self.insert_at_level(Item::Entry(RtEntry::new(min, max, value)), 0, &mut reinserted);
        self.size += 1;
    }

    // Insert an entry (container level 0) or a subtree (container level =
    // subtree level + 1) below the appropriate directory node.
    pub(crate) fn insert_at_level(
        &mut self,
        item: Item<V>,
        container_level: usize,
        reinserted: &mut Vec<bool>,
    ) {
        let (imin, imax) = match &item {
            Item::Entry(e) => (e.min.clone(), e.max.clone()),
            Item::Node(id) => {
                let n = self.arena.node(*id);
                (n.min.clone(), n.max.clone())
            }
        };
        let mut node = self.root;
        let mut level = self.depth - 1;
        while level > container_level {
            node = self.choose_subtree(node, &imin, &imax, level == 1);
            level -= 1;
        }
        match item {
            Item::Entry(e) => {
                let n = self.arena.node_mut(node);
                let RtKind::Leaf(entries) = &mut n.kind else {
                    unreachable!("level-0 node is not a leaf");
                };
                entries.push(e);
            }
            Item::Node(id) => {
                self.arena.node_mut(id).parent = Some(node);
                let n = self.arena.node_mut(node);
                let RtKind::Dir(children) = &mut n.kind else {
                    unreachable!("directory level holds a leaf");
                };
                children.push(id);
            }
        }
        self.extend_upward(node, &imin, &imax);

        // Overflow treatment, possibly cascading towards the root.
        let mut id = node;
        let mut lvl = level;
        loop {
            if self.arena.node(id).len() <= self.max_entries {
                break;
            }
            if reinserted.len() < self.depth {
                reinserted.resize(self.depth, false);
            }
            let is_root = self.arena.node(id).parent.is_none();
            if !is_root && !reinserted[lvl] {
                reinserted[lvl] = true;
                self.forced_reinsert(id, lvl, reinserted);
                break;
            }
            match self.split(id, lvl) {
                Some(parent) => {
                    id = parent;
                    lvl += 1;
                }
                None => break,
            }
        }
    }

    // R* subtree choice: least overlap enlargement among leaf children,
    // least area enlargement above; ties by area enlargement, then area.
    fn choose_subtree(
        &self,
        parent: NodeId,
        imin: &[f64],
        imax: &[f64],
        children_are_leaves: bool,
    ) -> NodeId {
        let pn = self.arena.node(parent);
        let RtKind::Dir(children) = &pn.kind else {
            unreachable!("choose_subtree on a leaf");
        };
        debug_assert!(!children.is_empty(), "directory node without children");
        let mut best: Option<(f64, f64, f64, NodeId)> = None;
        for &c in children {
            let cn = self.arena.node(c);
            let mut emin = cn.min.clone();
            let mut emax = cn.max.clone();
            extend(&mut emin, &mut emax, imin, imax);
            let area_before = area(&cn.min, &cn.max);
            let d_area = area(&emin, &emax) - area_before;
            let d_overlap = if children_are_leaves {
                let mut before = 0.0;
                let mut after = 0.0;
                for &s in children {
                    if s == c {
                        continue;
                    }
                    let sn = self.arena.node(s);
                    before += overlap_area(&cn.min, &cn.max, &sn.min, &sn.max);
                    after += overlap_area(&emin, &emax, &sn.min, &sn.max);
                }
                after - before
            } else {
                0.0
            };
            let key = (d_overlap, d_area, area_before, c);
            let better = match &best {
                None => true,
                Some((bo, ba, bar, _)) => {
                    (d_overlap, d_area, area_before) < (*bo, *ba, *bar)
                }
            };
            if better {
                best = Some(key);
            }
        }
        best.expect("directory node without children").3
    }

    fn extend_upward(&mut self, start: NodeId, min: &[f64], max: &[f64]) {
        let mut cur = Some(start);
        while let Some(id) = cur {
            let n = self.arena.node_mut(id);
            n.extend_mbb(min, max);
            cur = n.parent;
        }
    }

    pub(crate) fn recompute_mbb(&mut self, id: NodeId) {
        let dims = self.dims;
        let mut bmin = vec![f64::INFINITY; dims].into_boxed_slice();
        let mut bmax = vec![f64::NEG_INFINITY; dims].into_boxed_slice();
        {
            let node = self.arena.node(id);
            match &node.kind {
                RtKind::Leaf(entries) => {
                    for e in entries {
                        extend(&mut bmin, &mut bmax, &e.min, &e.max);
                    }
                }
                RtKind::Dir(children) => {
                    for &c in children {
                        let cn = self.arena.node(c);
                        extend(&mut bmin, &mut bmax, &cn.min, &cn.max);
                    }
                }
            }
        }
        let node = self.arena.node_mut(id);
        node.min = bmin;
        node.max = bmax;
    }

    fn recompute_upward(&mut self, start: NodeId) {
        let mut cur = Some(start);
        while let Some(id) = cur {
            self.recompute_mbb(id);
            cur = self.arena.node(id).parent;
        }
    }

    // Forced reinsertion: pull the ~30% of items whose centers sit farthest
    // from the node center and insert them again from the root, closest
    // first.
    fn forced_reinsert(&mut self, id: NodeId, level: usize, reinserted: &mut Vec<bool>) {
        let dims = self.dims;
        let p = ((0.3 * self.max_entries as f64).ceil() as usize).max(1);
        let mut center = vec![0.0; dims];
        {
            let node = self.arena.node(id);
            center_into(&node.min, &node.max, &mut center);
        }
        let mut item_center = vec![0.0; dims];
        let mut scored: Vec<(f64, usize)> = {
            let node = self.arena.node(id);
            match &node.kind {
                RtKind::Leaf(entries) => entries
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        center_into(&e.min, &e.max, &mut item_center);
                        (dist_l2(&center, &item_center), i)
                    })
                    .collect(),
                RtKind::Dir(children) => children
                    .iter()
                    .enumerate()
                    .map(|(i, &c)| {
                        let cn = self.arena.node(c);
                        center_into(&cn.min, &cn.max, &mut item_center);
                        (dist_l2(&center, &item_center), i)
                    })
                    .collect(),
            }
        };
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        let keep = scored.len() - p;
        let mut pull = vec![false; scored.len()];
        let mut order = vec![0_usize; scored.len()];
        for (rank, &(_, i)) in scored.iter().enumerate() {
            order[i] = rank;
            if rank >= keep {
                pull[i] = true;
            }
        }
        trace!(node = id, level, count = p, "forced reinsertion");

        // (distance rank, item), so removal can go closest-first.
        let mut removed: Vec<(usize, Item<V>)> = Vec::with_capacity(p);
        {
            let node = self.arena.node_mut(id);
            match &mut node.kind {
                RtKind::Leaf(entries) => {
                    let mut kept = Vec::with_capacity(keep);
                    for (i, e) in entries.drain(..).enumerate() {
                        if pull[i] {
                            removed.push((order[i], Item::Entry(e)));
                        } else {
                            kept.push(e);
                        }
                    }
                    *entries = kept;
                }
                RtKind::Dir(children) => {
                    let mut kept = Vec::with_capacity(keep);
                    for (i, c) in children.drain(..).enumerate() {
                        if pull[i] {
                            removed.push((order[i], Item::Node(c)));
                        } else {
                            kept.push(c);
                        }
                    }
                    *children = kept;
                }
            }
        }
        for (_, item) in &removed {
            if let Item::Node(c) = item {
                self.arena.node_mut(*c).parent = None;
            }
        }
        self.recompute_upward(id);
        removed.sort_by_key(|(rank, _)| *rank);
        for (_, item) in removed {
            let container_level = match &item {
                Item::Entry(_) => 0,
                Item::Node(_) => level,
            };
            self.insert_at_level(item, container_level, reinserted);
        }
    }

    // Topological R* split. Returns the parent for cascade checks, or
    // `None` when the root was split (a new root has been installed).
    fn split(&mut self, id: NodeId, level: usize) -> Option<NodeId> {
        let dims = self.dims;
        let boxes: Vec<(Box<[f64]>, Box<[f64]>)> = {
            let node = self.arena.node(id);
            match &node.kind {
                RtKind::Leaf(entries) => entries
                    .iter()
                    .map(|e| (e.min.clone(), e.max.clone()))
                    .collect(),
                RtKind::Dir(children) => children
                    .iter()
                    .map(|&c| {
                        let cn = self.arena.node(c);
                        (cn.min.clone(), cn.max.clone())
                    })
                    .collect(),
            }
        };
        let move_out = rstar_partition(&boxes, self.min_entries, dims);
        let mut pull = vec![false; boxes.len()];
        for &i in &move_out {
            pull[i] = true;
        }

        let parent = self.arena.node(id).parent;
        let sibling_kind = {
            let node = self.arena.node_mut(id);
            match &mut node.kind {
                RtKind::Leaf(entries) => {
                    let mut kept = Vec::new();
                    let mut moved = Vec::new();
                    for (i, e) in entries.drain(..).enumerate() {
                        if pull[i] {
                            moved.push(e);
                        } else {
                            kept.push(e);
                        }
                    }
                    *entries = kept;
                    RtKind::Leaf(moved)
                }
                RtKind::Dir(children) => {
                    let mut kept = Vec::new();
                    let mut moved = Vec::new();
                    for (i, c) in children.drain(..).enumerate() {
                        if pull[i] {
                            moved.push(c);
                        } else {
                            kept.push(c);
                        }
                    }
                    *children = kept;
                    RtKind::Dir(moved)
                }
            }
        };
        let sibling = self.arena.alloc(RtNode {
            parent,
            min: vec![f64::INFINITY; dims].into(),
            max: vec![f64::NEG_INFINITY; dims].into(),
            kind: sibling_kind,
        });
        if let RtKind::Dir(children) = &self.arena.node(sibling).kind {
            for c in children.clone() {
                self.arena.node_mut(c).parent = Some(sibling);
            }
        }
        self.recompute_mbb(id);
        self.recompute_mbb(sibling);
        trace!(node = id, sibling, level, "split");

        match parent {
            Some(p) => {
                let pn = self.arena.node_mut(p);
                let RtKind::Dir(children) = &mut pn.kind else {
                    unreachable!("parent of a split node is not a directory");
                };
                children.push(sibling);
                Some(p)
            }
            None => {
                let new_root = self.arena.alloc(RtNode::empty_dir(dims));
                {
                    let (rmin, rmax) = {
                        let a = self.arena.node(id);
                        let b = self.arena.node(sibling);
                        let mut rmin = a.min.clone();
                        let mut rmax = a.max.clone();
                        extend(&mut rmin, &mut rmax, &b.min, &b.max);
                        (rmin, rmax)
                    };
                    let rn = self.arena.node_mut(new_root);
                    rn.min = rmin;
                    rn.max = rmax;
                    let RtKind::Dir(children) = &mut rn.kind else {
                        unreachable!("fresh root is not a directory");
                    };
                    children.push(id);
                    children.push(sibling);
                }
                self.arena.node_mut(id).parent = Some(new_root);
                self.arena.node_mut(sibling).parent = Some(new_root);
                self.root = new_root;
                self.depth += 1;
                trace!(depth = self.depth, "root split");
                None
            }
        }
    }

    /// Remove one entry with exactly this box whose value satisfies `pred`.
    ///
    /// The first match in traversal order is removed; absent matches leave
    /// the tree untouched and return `None`.
    pub fn remove_if(
        &mut self,
        min: &[f64],
        max: &[f64],
        pred: &mut dyn FnMut(&V) -> bool,
    ) -> Option<V> {
        self.check_dims(min);
        self.check_dims(max);
        let (leaf, idx) = self.find_first(min, max, pred)?;
        let value = {
            let node = self.arena.node_mut(leaf);
            let RtKind::Leaf(entries) = &mut node.kind else {
                unreachable!("matched node is not a leaf");
            };
            entries.remove(idx).value
        };
        self.size -= 1;
        self.condense(leaf);
        Some(value)
    }

    /// Remove one entry matching `(box, value)`.
    pub fn remove(&mut self, min: &[f64], max: &[f64], value: &V) -> Option<V>
    where
        V: PartialEq,
    {
        self.remove_if(min, max, &mut |v| v == value)
    }

    /// Relocate one entry matching `(old box, value)` to the new box.
    pub fn update(
        &mut self,
        old_min: &[f64],
        old_max: &[f64],
        new_min: &[f64],
        new_max: &[f64],
        value: &V,
    ) -> bool
    where
        V: PartialEq,
    {
        match self.remove_if(old_min, old_max, &mut |v| v == value) {
            Some(v) => {
                self.insert(new_min, new_max, v);
                true
            }
            None => false,
        }
    }

    pub(crate) fn find_first(
        &self,
        min: &[f64],
        max: &[f64],
        pred: &mut dyn FnMut(&V) -> bool,
    ) -> Option<(NodeId, usize)> {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.arena.node(id);
            if !encloses(&node.min, &node.max, min, max) {
                continue;
            }
            match &node.kind {
                RtKind::Dir(children) => stack.extend_from_slice(children),
                RtKind::Leaf(entries) => {
                    for (i, e) in entries.iter().enumerate() {
                        if &*e.min == min && &*e.max == max && pred(&e.value) {
                            return Some((id, i));
                        }
                    }
                }
            }
        }
        None
    }

    // Condensation: walk from a shrunken leaf to the root, orphan
    // under-full nodes, re-insert their contents at the original level, and
    // collapse a single-child directory root.
    fn condense(&mut self, start: NodeId) {
        let mut orphans: Vec<(NodeId, usize)> = Vec::new();
        let mut id = start;
        let mut level = 0;
        loop {
            match self.arena.node(id).parent {
                None => {
                    self.recompute_mbb(id);
                    break;
                }
                Some(p) => {
                    if self.arena.node(id).len() < self.min_entries {
                        let pn = self.arena.node_mut(p);
                        let RtKind::Dir(children) = &mut pn.kind else {
                            unreachable!("parent is not a directory");
                        };
                        children.retain(|&c| c != id);
                        orphans.push((id, level));
                    } else {
                        self.recompute_mbb(id);
                    }
                    id = p;
                    level += 1;
                }
            }
        }
        for (orphan, olevel) in orphans {
            trace!(node = orphan, level = olevel, "condensing under-full node");
            let node = self.arena.release(orphan);
            match node.kind {
                RtKind::Leaf(entries) => {
                    for e in entries {
                        let mut reinserted = vec![false; self.depth];
                        self.insert_at_level(Item::Entry(e), 0, &mut reinserted);
                    }
                }
                RtKind::Dir(children) => {
                    for c in children {
                        self.arena.node_mut(c).parent = None;
                        let mut reinserted = vec![false; self.depth];
                        self.insert_at_level(Item::Node(c), olevel, &mut reinserted);
                    }
                }
            }
        }
        // Collapse directory roots that have shrunk to one child.
        loop {
            let root = self.root;
            let collapse = match &self.arena.node(root).kind {
                RtKind::Dir(children) if children.len() == 1 => Some(children[0]),
                _ => None,
            };
            match collapse {
                Some(child) => {
                    self.arena.release(root);
                    self.arena.node_mut(child).parent = None;
                    self.root = child;
                    self.depth -= 1;
                    trace!(depth = self.depth, "root collapse");
                }
                None => break,
            }
        }
    }

    /// Whether any entry has exactly this box key.
    pub fn contains_box(&self, min: &[f64], max: &[f64]) -> bool {
        self.check_dims(min);
        self.check_dims(max);
        self.find_first(min, max, &mut |_| true).is_some()
    }

    /// Look up the first entry with exactly this box key.
    pub fn get_first(&self, min: &[f64], max: &[f64]) -> Option<&V> {
        self.check_dims(min);
        self.check_dims(max);
        let (leaf, idx) = self.find_first(min, max, &mut |_| true)?;
        let RtKind::Leaf(entries) = &self.arena.node(leaf).kind else {
            unreachable!("matched node is not a leaf");
        };
        Some(&entries[idx].value)
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::new(self.dims);
        if self.size > 0 || !self.arena.node(self.root).is_leaf() {
            self.stats_walk(self.root, 0, &mut stats);
        } else {
            stats.record_node(0, true);
        }
        stats.finish(self.dist_calls.get())
    }

    fn stats_walk(&self, id: NodeId, level: usize, stats: &mut IndexStats) {
        let node = self.arena.node(id);
        stats.record_node(level, node.is_leaf());
        match &node.kind {
            RtKind::Leaf(entries) => stats.record_entries(level, entries.len()),
            RtKind::Dir(children) => {
                for &c in children {
                    self.stats_walk(c, level + 1, stats);
                }
            }
        }
    }

    /// Opt-in structural validation.
    ///
    /// Verifies that every directory's bounding box is the exact union of
    /// its children, that occupancy bounds hold, that parent links are
    /// consistent, and that all leaves sit on level 0. Panics with a
    /// description of the first violation; intended for tests and debug
    /// builds, never for hot paths.
    pub fn check_invariants(&self) {
        let counted = self.check_node(self.root, None, self.depth - 1);
        assert_eq!(counted, self.size, "entry count diverged from size()");
    }

    fn check_node(&self, id: NodeId, parent: Option<NodeId>, level_above_leaves: usize) -> usize {
        let node = self.arena.node(id);
        assert_eq!(node.parent, parent, "broken parent link");
        let is_root = parent.is_none();
        if !is_root {
            assert!(
                node.len() >= self.min_entries,
                "non-root node below minimum fill"
            );
        }
        assert!(node.len() <= self.max_entries, "node above maximum fill");
        match &node.kind {
            RtKind::Leaf(entries) => {
                assert_eq!(level_above_leaves, 0, "leaf off the bottom level");
                let mut bmin = vec![f64::INFINITY; self.dims].into_boxed_slice();
                let mut bmax = vec![f64::NEG_INFINITY; self.dims].into_boxed_slice();
                for e in entries {
                    extend(&mut bmin, &mut bmax, &e.min, &e.max);
                }
                if !entries.is_empty() {
                    assert_eq!((&node.min, &node.max), (&bmin, &bmax), "loose leaf MBB");
                }
                entries.len()
            }
            RtKind::Dir(children) => {
                assert!(level_above_leaves > 0, "directory on the leaf level");
                let mut bmin = vec![f64::INFINITY; self.dims].into_boxed_slice();
                let mut bmax = vec![f64::NEG_INFINITY; self.dims].into_boxed_slice();
                let mut count = 0;
                for &c in children {
                    let cn = self.arena.node(c);
                    extend(&mut bmin, &mut bmax, &cn.min, &cn.max);
                    count += self.check_node(c, Some(id), level_above_leaves - 1);
                }
                assert_eq!((&node.min, &node.max), (&bmin, &bmax), "loose directory MBB");
                count
            }
        }
    }

    /// Visit every entry.
    pub fn visit_all<'a>(&'a self, f: &mut dyn FnMut(&[f64], &[f64], &'a V)) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match &self.arena.node(id).kind {
                RtKind::Dir(children) => stack.extend_from_slice(children),
                RtKind::Leaf(entries) => {
                    for e in entries {
                        f(&e.min, &e.max, &e.value);
                    }
                }
            }
        }
    }

    /// Visit every entry whose box contains `point`.
    pub fn visit_point(&self, point: &[f64], f: &mut dyn FnMut(&[f64], &[f64], &V)) {
        self.check_dims(point);
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.arena.node(id);
            if !contains(&node.min, &node.max, point) {
                continue;
            }
            match &node.kind {
                RtKind::Dir(children) => stack.extend_from_slice(children),
                RtKind::Leaf(entries) => {
                    for e in entries {
                        if contains(&e.min, &e.max, point) {
                            f(&e.min, &e.max, &e.value);
                        }
                    }
                }
            }
        }
    }
}

pub(crate) fn area(min: &[f64], max: &[f64]) -> f64 {
    min.iter()
        .zip(max)
        .map(|(&lo, &hi)| (hi - lo).max(0.0))
        .product()
}

pub(crate) fn margin(min: &[f64], max: &[f64]) -> f64 {
    min.iter().zip(max).map(|(&lo, &hi)| (hi - lo).max(0.0)).sum()
}

pub(crate) fn overlap_area(
    a_min: &[f64],
    a_max: &[f64],
    b_min: &[f64],
    b_max: &[f64],
) -> f64 {
    a_min
        .iter()
        .zip(a_max)
        .zip(b_min.iter().zip(b_max))
        .map(|((&alo, &ahi), (&blo, &bhi))| (ahi.min(bhi) - alo.max(blo)).max(0.0))
        .product()
}

// R* split: choose the axis with the smallest margin sum over all legal
// distributions (items sorted by lower then by upper box edge), then the
// distribution on that axis with the least inter-group overlap, ties by
// total area. Returns the indices of the second group.
pub(crate) fn rstar_partition(
    boxes: &[(Box<[f64]>, Box<[f64]>)],
    min_entries: usize,
    dims: usize,
) -> Vec<usize> {
    let m = boxes.len();
    debug_assert!(m >= 2 * min_entries, "too few items to split");
    let k_lo = min_entries;
    let k_hi = m - min_entries;

    let mut best_axis = 0;
    let mut best_axis_margin = f64::INFINITY;
    let mut best_choice: Option<(bool, usize, f64, f64)> = None; // (by_upper, k, overlap, area)

    let mut order: Vec<usize> = (0..m).collect();
    let mut prefix: Vec<(Box<[f64]>, Box<[f64]>)> = Vec::with_capacity(m);
    let mut suffix: Vec<(Box<[f64]>, Box<[f64]>)> = Vec::with_capacity(m);

    for axis in 0..dims {
        let mut axis_margin = 0.0;
        let mut axis_choice: Option<(bool, usize, f64, f64)> = None;
        for by_upper in [false, true] {
            sort_along_axis(&mut order, boxes, axis, by_upper);
            // Running bounding boxes from both ends.
            prefix.clear();
            suffix.clear();
            let mut run_min = boxes[order[0]].0.clone();
            let mut run_max = boxes[order[0]].1.clone();
            for &i in &order {
                extend(&mut run_min, &mut run_max, &boxes[i].0, &boxes[i].1);
                prefix.push((run_min.clone(), run_max.clone()));
            }
            let mut run_min = boxes[order[m - 1]].0.clone();
            let mut run_max = boxes[order[m - 1]].1.clone();
            for &i in order.iter().rev() {
                extend(&mut run_min, &mut run_max, &boxes[i].0, &boxes[i].1);
                suffix.push((run_min.clone(), run_max.clone()));
            }
            suffix.reverse();
            for k in k_lo..=k_hi {
                let (gmin1, gmax1) = &prefix[k - 1];
                let (gmin2, gmax2) = &suffix[k];
                axis_margin += margin(gmin1, gmax1) + margin(gmin2, gmax2);
                let ovl = overlap_area(gmin1, gmax1, gmin2, gmax2);
                let total_area = area(gmin1, gmax1) + area(gmin2, gmax2);
                let better = match &axis_choice {
                    None => true,
                    Some((_, _, bo, ba)) => (ovl, total_area) < (*bo, *ba),
                };
                if better {
                    axis_choice = Some((by_upper, k, ovl, total_area));
                }
            }
        }
        if axis_margin < best_axis_margin {
            best_axis_margin = axis_margin;
            best_axis = axis;
            best_choice = axis_choice;
        }
    }

    let (by_upper, k, _, _) = best_choice.expect("split found no distribution");
    sort_along_axis(&mut order, boxes, best_axis, by_upper);
    order[k..].to_vec()
}

// Sort item indices along one axis by (lower, upper) edge, or by
// (upper, lower) when `by_upper` is set.
fn sort_along_axis(
    order: &mut [usize],
    boxes: &[(Box<[f64]>, Box<[f64]>)],
    axis: usize,
    by_upper: bool,
) {
    order.sort_by(|&a, &b| {
        let (a_box, b_box) = (&boxes[a], &boxes[b]);
        let (key_a, key_b) = if by_upper {
            (
                (a_box.1[axis], a_box.0[axis]),
                (b_box.1[axis], b_box.0[axis]),
            )
        } else {
            (
                (a_box.0[axis], a_box.1[axis]),
                (b_box.0[axis], b_box.1[axis]),
            )
        };
        key_a.0.total_cmp(&key_b.0).then(key_a.1.total_cmp(&key_b.1))
    });
}

#[cfg(test)]
mod tests {
    use super::RTree;
    use bramble_core::types::intersects;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn point_box(rng: &mut StdRng, dims: usize) -> (Vec<f64>, Vec<f64>) {
        let p: Vec<f64> = (0..dims).map(|_| rng.gen_range(0.0..1.0)).collect();
        (p.clone(), p)
    }

    #[test]
    fn insert_grows_and_remove_shrinks() {
        let mut t = RTree::new(2).expect("valid dims");
        for i in 0..100_u32 {
            let x = f64::from(i % 10);
            let y = f64::from(i / 10);
            t.insert(&[x, y], &[x + 0.5, y + 0.5], i);
        }
        assert_eq!(t.size(), 100);
        assert!(t.depth() > 1);
        t.check_invariants();

        for i in 0..100_u32 {
            let x = f64::from(i % 10);
            let y = f64::from(i / 10);
            assert_eq!(t.remove(&[x, y], &[x + 0.5, y + 0.5], &i), Some(i));
            t.check_invariants();
        }
        assert_eq!(t.size(), 0);
        assert_eq!(t.depth(), 1);
    }

    #[test]
    fn remove_missing_is_silent() {
        let mut t = RTree::new(2).expect("valid dims");
        t.insert(&[0.0, 0.0], &[1.0, 1.0], 1);
        assert_eq!(t.remove(&[0.0, 0.0], &[1.0, 1.0], &2), None);
        assert_eq!(t.remove(&[9.0, 9.0], &[9.5, 9.5], &1), None);
        assert_eq!(t.size(), 1);
    }

    #[test]
    fn duplicate_entries_coexist_and_remove_one_at_a_time() {
        let mut t = RTree::new(2).expect("valid dims");
        t.insert(&[1.0, 1.0], &[2.0, 2.0], "x");
        t.insert(&[1.0, 1.0], &[2.0, 2.0], "y");
        t.insert(&[1.0, 1.0], &[2.0, 2.0], "x");
        assert_eq!(t.size(), 3);
        assert_eq!(t.remove(&[1.0, 1.0], &[2.0, 2.0], &"x"), Some("x"));
        assert_eq!(t.size(), 2);
        assert!(t.contains_box(&[1.0, 1.0], &[2.0, 2.0]));
        assert_eq!(t.remove(&[1.0, 1.0], &[2.0, 2.0], &"x"), Some("x"));
        assert_eq!(t.remove(&[1.0, 1.0], &[2.0, 2.0], &"x"), None);
        assert_eq!(t.remove(&[1.0, 1.0], &[2.0, 2.0], &"y"), Some("y"));
        assert_eq!(t.size(), 0);
    }

    #[test]
    fn update_relocates_entries() {
        let mut t = RTree::new(2).expect("valid dims");
        t.insert(&[0.0, 0.0], &[1.0, 1.0], 7);
        assert!(t.update(&[0.0, 0.0], &[1.0, 1.0], &[5.0, 5.0], &[6.0, 6.0], &7));
        assert!(!t.contains_box(&[0.0, 0.0], &[1.0, 1.0]));
        assert!(t.contains_box(&[5.0, 5.0], &[6.0, 6.0]));
        assert!(!t.update(&[0.0, 0.0], &[1.0, 1.0], &[2.0, 2.0], &[3.0, 3.0], &7));
    }

    #[test]
    fn randomized_inserts_and_removes_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut t = RTree::new(3).expect("valid dims");
        let mut live: Vec<(Vec<f64>, Vec<f64>, u32)> = Vec::new();
        for i in 0..600_u32 {
            if !live.is_empty() && rng.gen_bool(0.3) {
                let at = rng.gen_range(0..live.len());
                let (min, max, v) = live.swap_remove(at);
                assert_eq!(t.remove(&min, &max, &v), Some(v));
            } else {
                let (p, _) = point_box(&mut rng, 3);
                let max: Vec<f64> = p.iter().map(|c| c + rng.gen_range(0.0..0.1)).collect();
                t.insert(&p, &max, i);
                live.push((p, max, i));
            }
            if i % 50 == 0 {
                t.check_invariants();
            }
        }
        t.check_invariants();
        assert_eq!(t.size(), live.len());
    }

    #[test]
    fn visit_point_matches_containment() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut t = RTree::new(2).expect("valid dims");
        let mut boxes = Vec::new();
        for i in 0..300_u32 {
            let min: Vec<f64> = (0..2).map(|_| rng.gen_range(0.0..0.9)).collect();
            let max: Vec<f64> = min.iter().map(|c| c + rng.gen_range(0.0..0.1)).collect();
            t.insert(&min, &max, i);
            boxes.push((min, max, i));
        }
        for _ in 0..50 {
            let p = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
            let mut got = Vec::new();
            t.visit_point(&p, &mut |_, _, &v| got.push(v));
            got.sort_unstable();
            let mut expected: Vec<u32> = boxes
                .iter()
                .filter(|(min, max, _)| {
                    intersects(min, max, &p, &p)
                })
                .map(|&(_, _, v)| v)
                .collect();
            expected.sort_unstable();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn small_capacity_trees_stay_valid() {
        let mut t = RTree::with_node_capacity(2, 4, 2).expect("valid capacities");
        for i in 0..200_u32 {
            let x = f64::from(i) * 0.01;
            t.insert(&[x, -x], &[x + 0.001, -x + 0.001], i);
        }
        t.check_invariants();
        for i in (0..200_u32).rev() {
            let x = f64::from(i) * 0.01;
            assert_eq!(t.remove(&[x, -x], &[x + 0.001, -x + 0.001], &i), Some(i));
        }
        assert!(t.is_empty());
        t.check_invariants();
    }

    #[test]
    fn rejects_bad_construction() {
        assert!(RTree::<u8>::new(0).is_err());
        assert!(RTree::<u8>::with_node_capacity(2, 1, 1).is_err());
        assert!(RTree::<u8>::with_node_capacity(2, 10, 6).is_err());
        assert!(RTree::<u8>::with_node_capacity(2, 10, 0).is_err());
    }
}
