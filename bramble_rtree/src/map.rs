// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Map and multimap trait implementations for the R*-tree.
//!
//! The tree itself is a multimap; the [`BoxMap`] facet adds single-value
//! semantics on top by overwriting the first entry with an equal box key.

use bramble_core::{BoxMap, BoxMultimap, BoxVisitor, IndexStats, SpatialIndex};

use crate::node::RtKind;
use crate::tree::RTree;

impl<V> RTree<V> {
    // Overwrite the value of the first entry with exactly this box.
    fn replace_first(&mut self, min: &[f64], max: &[f64], value: V) -> Result<V, V> {
        match self.find_first(min, max, &mut |_| true) {
            Some((leaf, idx)) => {
                let node = self.arena.node_mut(leaf);
                let RtKind::Leaf(entries) = &mut node.kind else {
                    unreachable!("matched node is not a leaf");
                };
                Ok(std::mem::replace(&mut entries[idx].value, value))
            }
            None => Err(value),
        }
    }
}

impl<V> SpatialIndex<V> for RTree<V> {
    fn dims(&self) -> usize {
        self.dims
    }

    fn size(&self) -> usize {
        self.size
    }

    fn clear(&mut self) {
        Self::clear(self);
    }

    fn stats(&self) -> IndexStats {
        Self::stats(self)
    }
}

impl<V> BoxMap<V> for RTree<V> {
    fn insert(&mut self, min: &[f64], max: &[f64], value: V) -> Option<V> {
        match self.replace_first(min, max, value) {
            Ok(old) => Some(old),
            Err(value) => {
                Self::insert(self, min, max, value);
                None
            }
        }
    }

    fn get(&self, min: &[f64], max: &[f64]) -> Option<&V> {
        self.get_first(min, max)
    }

    fn remove(&mut self, min: &[f64], max: &[f64]) -> Option<V> {
        self.remove_if(min, max, &mut |_| true)
    }

    fn update(
        &mut self,
        old_min: &[f64],
        old_max: &[f64],
        new_min: &[f64],
        new_max: &[f64],
    ) -> bool {
        match self.remove_if(old_min, old_max, &mut |_| true) {
            Some(value) => {
                Self::insert(self, new_min, new_max, value);
                true
            }
            None => false,
        }
    }

    fn visit_all<'a>(&'a self, f: &mut BoxVisitor<'a, '_, V>) {
        Self::visit_all(self, f);
    }

    fn visit_query<'a>(&'a self, min: &[f64], max: &[f64], f: &mut BoxVisitor<'a, '_, V>) {
        for (emin, emax, value) in self.query_intersect(min, max) {
            f(emin, emax, value);
        }
    }

    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, Box<[f64]>, &'_ V)> + '_> {
        Box::new(Self::query_knn(self, center, k).map(|e| {
            (
                e.dist,
                e.entry.min().into(),
                e.entry.max().into(),
                e.entry.value(),
            )
        }))
    }
}

impl<V> BoxMultimap<V> for RTree<V> {
    fn insert(&mut self, min: &[f64], max: &[f64], value: V) {
        Self::insert(self, min, max, value);
    }

    fn contains_box(&self, min: &[f64], max: &[f64]) -> bool {
        Self::contains_box(self, min, max)
    }

    fn contains_entry(&self, min: &[f64], max: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        self.check_dims(min);
        self.check_dims(max);
        self.find_first(min, max, &mut |v| v == value).is_some()
    }

    fn remove_entry(&mut self, min: &[f64], max: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        Self::remove(self, min, max, value).is_some()
    }

    fn remove_if(
        &mut self,
        min: &[f64],
        max: &[f64],
        pred: &mut dyn FnMut(&V) -> bool,
    ) -> bool {
        Self::remove_if(self, min, max, pred).is_some()
    }

    fn update_entry(
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
        self.update(old_min, old_max, new_min, new_max, value)
    }

    fn visit_all<'a>(&'a self, f: &mut BoxVisitor<'a, '_, V>) {
        Self::visit_all(self, f);
    }

    fn visit_query<'a>(&'a self, min: &[f64], max: &[f64], f: &mut BoxVisitor<'a, '_, V>) {
        for (emin, emax, value) in self.query_intersect(min, max) {
            f(emin, emax, value);
        }
    }

    fn visit_exact<'a>(&'a self, min: &[f64], max: &[f64], f: &mut BoxVisitor<'a, '_, V>) {
        for (emin, emax, value) in self.query_exact_box(min, max) {
            f(emin, emax, value);
        }
    }

    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, Box<[f64]>, &'_ V)> + '_> {
        Box::new(Self::query_knn(self, center, k).map(|e| {
            (
                e.dist,
                e.entry.min().into(),
                e.entry.max().into(),
                e.entry.value(),
            )
        }))
    }
}
