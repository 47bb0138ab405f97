// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multimap trait implementations for the quadtree variants.

use bramble_core::{IndexStats, PointMultimap, PointVisitor, SpatialIndex};

use crate::hc::QuadTreeHc;
use crate::hc2::QuadTreeHc2;
use crate::plain::QuadTree;

macro_rules! impl_point_multimap {
    ($ty:ident) => {
        impl<V> SpatialIndex<V> for $ty<V> {
            fn dims(&self) -> usize {
                Self::dims(self)
            }

            fn size(&self) -> usize {
                Self::size(self)
            }

            fn clear(&mut self) {
                Self::clear(self);
            }

            fn stats(&self) -> IndexStats {
                Self::stats(self)
            }
        }

        impl<V> PointMultimap<V> for $ty<V> {
            fn insert(&mut self, key: &[f64], value: V) {
                Self::insert(self, key, value);
            }

            fn contains_point(&self, key: &[f64]) -> bool {
                Self::contains_point(self, key)
            }

            fn contains_entry(&self, key: &[f64], value: &V) -> bool
            where
                V: PartialEq,
            {
                let mut found = false;
                Self::visit_exact(self, key, &mut |_, v| found |= v == value);
                found
            }

            fn remove_entry(&mut self, key: &[f64], value: &V) -> bool
            where
                V: PartialEq,
            {
                Self::remove(self, key, value).is_some()
            }

            fn remove_if(&mut self, key: &[f64], pred: &mut dyn FnMut(&V) -> bool) -> bool {
                Self::remove_if(self, key, pred).is_some()
            }

            fn update_entry(&mut self, old_key: &[f64], new_key: &[f64], value: &V) -> bool
            where
                V: PartialEq,
            {
                Self::update(self, old_key, new_key, value)
            }

            fn visit_all<'a>(&'a self, f: &mut PointVisitor<'a, '_, V>) {
                for (point, value) in Self::iter(self) {
                    f(point, value);
                }
            }

            fn visit_query<'a>(&'a self, min: &[f64], max: &[f64], f: &mut PointVisitor<'a, '_, V>) {
                for (point, value) in Self::query(self, min, max) {
                    f(point, value);
                }
            }

            fn visit_exact<'a>(&'a self, key: &[f64], f: &mut PointVisitor<'a, '_, V>) {
                Self::visit_exact(self, key, f);
            }

            fn query_knn(
                &self,
                center: &[f64],
                k: usize,
            ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, &'_ V)> + '_> {
                Box::new(
                    Self::query_knn(self, center, k)
                        .map(|e| (e.dist, e.entry.point().into(), e.entry.value())),
                )
            }
        }
    };
}

impl_point_multimap!(QuadTree);
impl_point_multimap!(QuadTreeHc);
impl_point_multimap!(QuadTreeHc2);

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(t: &mut dyn PointMultimap<u32>) {
        t.insert(&[1.0, 2.0], 1);
        t.insert(&[1.0, 2.0], 2);
        t.insert(&[-3.0, 4.0], 3);
        assert_eq!(t.size(), 3);
        assert!(t.contains_entry(&[1.0, 2.0], &2));
        assert!(t.remove_entry(&[1.0, 2.0], &2));
        assert!(!t.contains_entry(&[1.0, 2.0], &2));
        assert!(t.update_entry(&[-3.0, 4.0], &[5.0, 5.0], &3));

        let hits: Vec<_> = t.query(&[0.0, 0.0], &[6.0, 6.0]).collect();
        assert_eq!(hits.len(), 2);
        let nearest = t.query_1nn(&[5.1, 5.1]).expect("tree is not empty");
        assert_eq!(*nearest.2, 3);
        t.clear();
        assert_eq!(t.size(), 0);
    }

    #[test]
    fn all_variants_share_the_multimap_contract() {
        let mut plain = QuadTree::new(2).expect("valid dims");
        exercise(&mut plain);
        let mut hc = QuadTreeHc::new(2).expect("valid dims");
        exercise(&mut hc);
        let mut hc2 = QuadTreeHc2::new(2).expect("valid dims");
        exercise(&mut hc2);
    }
}
