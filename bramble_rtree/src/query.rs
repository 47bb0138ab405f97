// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resumable window queries.

use smallvec::SmallVec;

use bramble_core::types::{box_equals, intersects};

use crate::node::{NodeId, RtKind};
use crate::tree::RTree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Match {
    Intersect,
    ExactBox,
}

/// Depth-stack iterator over entries matching a window query.
///
/// Yields `(min, max, &value)` with the box borrowed from the tree. The
/// stack of `(node, position)` frames is explicit, so the iterator resumes
/// cheaply across `next()` calls.
#[derive(Debug)]
pub struct WindowIter<'a, V> {
    tree: &'a RTree<V>,
    min: Box<[f64]>,
    max: Box<[f64]>,
    mode: Match,
    // (node, index of the next child or entry to look at)
    stack: SmallVec<[(NodeId, usize); 16]>,
}

impl<'a, V> WindowIter<'a, V> {
    fn new(tree: &'a RTree<V>, min: &[f64], max: &[f64], mode: Match) -> Self {
        tree.check_dims(min);
        tree.check_dims(max);
        let mut stack = SmallVec::new();
        let root = tree.arena.node(tree.root);
        if intersects(&root.min, &root.max, min, max) {
            stack.push((tree.root, 0));
        }
        Self {
            tree,
            min: min.into(),
            max: max.into(),
            mode,
            stack,
        }
    }

    fn matches(&self, emin: &[f64], emax: &[f64]) -> bool {
        match self.mode {
            Match::Intersect => intersects(emin, emax, &self.min, &self.max),
            Match::ExactBox => box_equals(emin, emax, &self.min, &self.max),
        }
    }
}

impl<'a, V> Iterator for WindowIter<'a, V> {
    type Item = (&'a [f64], &'a [f64], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        while let Some(&(id, pos)) = self.stack.last() {
            let node = tree.arena.node(id);
            match &node.kind {
                RtKind::Dir(children) => match children.get(pos) {
                    None => {
                        self.stack.pop();
                    }
                    Some(&child) => {
                        self.stack.last_mut().expect("stack emptied under us").1 = pos + 1;
                        let cn = tree.arena.node(child);
                        if intersects(&cn.min, &cn.max, &self.min, &self.max) {
                            self.stack.push((child, 0));
                        }
                    }
                },
                RtKind::Leaf(entries) => {
                    let mut i = pos;
                    let mut hit = None;
                    while let Some(e) = entries.get(i) {
                        i += 1;
                        if self.matches(&e.min, &e.max) {
                            hit = Some(e);
                            break;
                        }
                    }
                    match hit {
                        Some(e) => {
                            self.stack.last_mut().expect("stack emptied under us").1 = i;
                            return Some((&e.min, &e.max, &e.value));
                        }
                        None => {
                            self.stack.pop();
                        }
                    }
                }
            }
        }
        None
    }
}

impl<V> RTree<V> {
    /// All entries whose box intersects the closed query box.
    pub fn query_intersect(&self, min: &[f64], max: &[f64]) -> WindowIter<'_, V> {
        WindowIter::new(self, min, max, Match::Intersect)
    }

    /// All entries whose box equals the query box exactly.
    pub fn query_exact_box(&self, min: &[f64], max: &[f64]) -> WindowIter<'_, V> {
        WindowIter::new(self, min, max, Match::ExactBox)
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::RTree;
    use bramble_core::types::intersects;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn window_matches_linear_scan() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut t = RTree::new(2).expect("valid dims");
        let mut reference = Vec::new();
        for i in 0..2000_u32 {
            let p = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
            t.insert(&p, &p, i);
            reference.push((p, i));
        }
        for _ in 0..100 {
            let a = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
            let b = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
            let min = [a[0].min(b[0]), a[1].min(b[1])];
            let max = [a[0].max(b[0]), a[1].max(b[1])];
            let mut got: Vec<u32> = t.query_intersect(&min, &max).map(|(_, _, &v)| v).collect();
            got.sort_unstable();
            let mut expected: Vec<u32> = reference
                .iter()
                .filter(|(p, _)| intersects(p, p, &min, &max))
                .map(|&(_, v)| v)
                .collect();
            expected.sort_unstable();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn exact_box_query_distinguishes_duplicates() {
        let mut t = RTree::new(2).expect("valid dims");
        t.insert(&[0.0, 0.0], &[1.0, 1.0], "a");
        t.insert(&[0.0, 0.0], &[1.0, 1.0], "b");
        t.insert(&[0.0, 0.0], &[1.5, 1.0], "c");
        let mut got: Vec<&str> = t
            .query_exact_box(&[0.0, 0.0], &[1.0, 1.0])
            .map(|(_, _, &v)| v)
            .collect();
        got.sort_unstable();
        assert_eq!(got, ["a", "b"]);
    }

    #[test]
    fn empty_tree_window_is_empty() {
        let t: RTree<u8> = RTree::new(3).expect("valid dims");
        assert_eq!(t.query_intersect(&[0.0; 3], &[1.0; 3]).count(), 0);
    }
}
