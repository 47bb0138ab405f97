// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Point view over the box-keyed R*-tree.
//!
//! Points are stored as degenerate boxes (`min == max`), which is all it
//! takes to serve the point multimap contract from a box index.

use bramble_core::{IndexError, IndexStats, PointMultimap, PointVisitor, SpatialIndex};
use bramble_rtree::RTree;

/// Point multimap backed by an [`RTree`] of degenerate boxes.
#[derive(Debug)]
pub struct RTreePointMultimap<V> {
    tree: RTree<V>,
}

impl<V> RTreePointMultimap<V> {
    /// Create an empty index with the default node capacities.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        Ok(Self {
            tree: RTree::new(dims)?,
        })
    }

    /// Wrap an existing tree (for example one built by the STR loader).
    pub fn from_tree(tree: RTree<V>) -> Self {
        Self { tree }
    }

    /// The underlying box index.
    pub fn tree(&self) -> &RTree<V> {
        &self.tree
    }
}

impl<V> SpatialIndex<V> for RTreePointMultimap<V> {
    fn dims(&self) -> usize {
        self.tree.dims()
    }

    fn size(&self) -> usize {
        self.tree.size()
    }

    fn clear(&mut self) {
        self.tree.clear();
    }

    fn stats(&self) -> IndexStats {
        self.tree.stats()
    }
}

impl<V> PointMultimap<V> for RTreePointMultimap<V> {
    fn insert(&mut self, key: &[f64], value: V) {
        self.tree.insert(key, key, value);
    }

    fn contains_point(&self, key: &[f64]) -> bool {
        self.tree.contains_box(key, key)
    }

    fn contains_entry(&self, key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        let mut found = false;
        for (_, _, v) in self.tree.query_exact_box(key, key) {
            if v == value {
                found = true;
                break;
            }
        }
        found
    }

    fn remove_entry(&mut self, key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        self.tree.remove(key, key, value).is_some()
    }

    fn remove_if(&mut self, key: &[f64], pred: &mut dyn FnMut(&V) -> bool) -> bool {
        self.tree.remove_if(key, key, pred).is_some()
    }

    fn update_entry(&mut self, old_key: &[f64], new_key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        self.tree.update(old_key, old_key, new_key, new_key, value)
    }

    fn visit_all(&self, f: &mut PointVisitor<'_, '_, V>) {
        self.tree.visit_all(&mut |min, _, v| f(min, v));
    }

    fn visit_query(&self, min: &[f64], max: &[f64], f: &mut PointVisitor<'_, '_, V>) {
        for (emin, _, v) in self.tree.query_intersect(min, max) {
            f(emin, v);
        }
    }

    fn visit_exact(&self, key: &[f64], f: &mut PointVisitor<'_, '_, V>) {
        for (emin, _, v) in self.tree.query_exact_box(key, key) {
            f(emin, v);
        }
    }

    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, &'_ V)> + '_> {
        Box::new(
            self.tree
                .query_knn(center, k)
                .map(|e| (e.dist, e.entry.min().into(), e.entry.value())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::RTreePointMultimap;
    use bramble_core::{PointMultimap, SpatialIndex};

    #[test]
    fn points_round_trip_through_the_box_tree() {
        let mut idx = RTreePointMultimap::new(3).expect("valid dims");
        idx.insert(&[1.0, 2.0, 3.0], "a");
        idx.insert(&[1.0, 2.0, 3.0], "b");
        idx.insert(&[-4.0, 0.0, 9.0], "c");
        assert_eq!(idx.size(), 3);
        assert!(idx.contains_point(&[1.0, 2.0, 3.0]));
        assert!(idx.contains_entry(&[1.0, 2.0, 3.0], &"b"));
        assert!(idx.remove_entry(&[1.0, 2.0, 3.0], &"a"));
        assert_eq!(idx.size(), 2);
        assert!(idx.update_entry(&[-4.0, 0.0, 9.0], &[4.0, 0.0, 9.0], &"c"));

        let hits: Vec<_> = idx.query(&[0.0, 0.0, 0.0], &[5.0, 5.0, 9.0]).collect();
        assert_eq!(hits.len(), 2);
        let nearest = idx.query_1nn(&[4.1, 0.0, 9.0]).expect("index is not empty");
        assert_eq!(*nearest.2, "c");
    }
}
