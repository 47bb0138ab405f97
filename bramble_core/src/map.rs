// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! User-facing map and multimap traits.
//!
//! Every Bramble index implements one (or more) of the four traits here,
//! which makes them interchangeable behind `dyn` — that is what the factory
//! in `bramble_index` hands out. The query surface follows a visitor-first
//! design: implementations provide `visit_*` methods, and the collecting
//! `query_*` methods are provided on top of them. Concrete tree types
//! additionally expose their own resumable iterator types for zero-copy
//! traversal; the boxed iterators here buffer one result set and are the
//! convenient, object-safe path.
//!
//! Multimap semantics are the default for spatial keys: identical keys with
//! different values coexist, and removal disambiguates by value or
//! predicate. The map variants (single value per key, insert overwrites)
//! exist for the crit-bit based indexes and for box keys on the R-tree.

use crate::stats::IndexStats;

/// Visitor for point-keyed entries.
///
/// `'v` is the lifetime of the value reference passed to the visitor (tied
/// to the index being visited); `'f` is the lifetime of the visitor closure
/// itself. The key slice is passed with its own unconstrained lifetime,
/// since some implementations decode it into a transient buffer per call.
pub type PointVisitor<'v, 'f, V> = dyn FnMut(&[f64], &'v V) + 'f;

/// Visitor for box-keyed entries. See [`PointVisitor`] for the lifetimes.
pub type BoxVisitor<'v, 'f, V> = dyn FnMut(&[f64], &[f64], &'v V) + 'f;

/// Operations common to every index.
pub trait SpatialIndex<V> {
    /// Dimensionality of the indexed keys.
    fn dims(&self) -> usize;

    /// Number of entries.
    fn size(&self) -> usize;

    /// Remove all entries.
    fn clear(&mut self);

    /// Walk the tree and return a statistics snapshot.
    fn stats(&self) -> IndexStats;
}

/// A point-keyed map holding a single value per key.
///
/// Inserting an existing key overwrites and returns the previous value.
pub trait PointMap<V>: SpatialIndex<V> {
    /// Insert or overwrite; returns the previous value on overwrite.
    fn insert(&mut self, key: &[f64], value: V) -> Option<V>;

    /// Look up the exact key.
    fn get(&self, key: &[f64]) -> Option<&V>;

    /// Whether the exact key is present.
    fn contains(&self, key: &[f64]) -> bool {
        self.get(key).is_some()
    }

    /// Remove the exact key, returning its value.
    fn remove(&mut self, key: &[f64]) -> Option<V>;

    /// Relocate the entry at `old_key` to `new_key`.
    ///
    /// Returns `false` (and changes nothing) if `old_key` is absent.
    fn update(&mut self, old_key: &[f64], new_key: &[f64]) -> bool;

    /// Visit every entry, in the index's own traversal order.
    fn visit_all<'a>(&'a self, f: &mut PointVisitor<'a, '_, V>);

    /// Visit every entry whose key lies in the closed box `[min, max]`.
    fn visit_query<'a>(&'a self, min: &[f64], max: &[f64], f: &mut PointVisitor<'a, '_, V>);

    /// All entries, buffered. See [`visit_all`][Self::visit_all].
    fn entries(&self) -> Box<dyn Iterator<Item = (Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_all(&mut |k, v| out.push((k.into(), v)));
        Box::new(out.into_iter())
    }

    /// Window query, buffered. See [`visit_query`][Self::visit_query].
    fn query(&self, min: &[f64], max: &[f64]) -> Box<dyn Iterator<Item = (Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_query(min, max, &mut |k, v| out.push((k.into(), v)));
        Box::new(out.into_iter())
    }

    /// The `k` entries nearest to `center`, in non-decreasing distance
    /// order, as `(distance, key, value)`.
    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, &'_ V)> + '_>;

    /// The single nearest entry to `center`.
    fn query_1nn(&self, center: &[f64]) -> Option<(f64, Box<[f64]>, &'_ V)> {
        self.query_knn(center, 1).next()
    }
}

/// A point-keyed multimap: identical keys with different values coexist.
pub trait PointMultimap<V>: SpatialIndex<V> {
    /// Insert an entry. Duplicate `(key, value)` pairs are stored again.
    fn insert(&mut self, key: &[f64], value: V);

    /// Whether any entry has exactly this key.
    fn contains_point(&self, key: &[f64]) -> bool;

    /// Whether the exact `(key, value)` entry is present.
    fn contains_entry(&self, key: &[f64], value: &V) -> bool
    where
        V: PartialEq;

    /// Remove one entry matching `(key, value)`. Returns whether an entry
    /// was removed.
    fn remove_entry(&mut self, key: &[f64], value: &V) -> bool
    where
        V: PartialEq;

    /// Remove one entry at `key` whose value satisfies `pred`. Returns
    /// whether an entry was removed.
    fn remove_if(&mut self, key: &[f64], pred: &mut dyn FnMut(&V) -> bool) -> bool;

    /// Relocate the entry `(old_key, value)` to `new_key`.
    ///
    /// Returns `false` (and changes nothing) if no such entry exists.
    fn update_entry(&mut self, old_key: &[f64], new_key: &[f64], value: &V) -> bool
    where
        V: PartialEq;

    /// Visit every entry, in the index's own traversal order.
    fn visit_all<'a>(&'a self, f: &mut PointVisitor<'a, '_, V>);

    /// Visit every entry whose key lies in the closed box `[min, max]`.
    fn visit_query<'a>(&'a self, min: &[f64], max: &[f64], f: &mut PointVisitor<'a, '_, V>);

    /// Visit every entry whose key equals `key`.
    fn visit_exact<'a>(&'a self, key: &[f64], f: &mut PointVisitor<'a, '_, V>);

    /// All entries, buffered. See [`visit_all`][Self::visit_all].
    fn entries(&self) -> Box<dyn Iterator<Item = (Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_all(&mut |k, v| out.push((k.into(), v)));
        Box::new(out.into_iter())
    }

    /// Window query, buffered. See [`visit_query`][Self::visit_query].
    fn query(&self, min: &[f64], max: &[f64]) -> Box<dyn Iterator<Item = (Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_query(min, max, &mut |k, v| out.push((k.into(), v)));
        Box::new(out.into_iter())
    }

    /// Exact-point query, buffered. See [`visit_exact`][Self::visit_exact].
    fn query_exact(&self, key: &[f64]) -> Box<dyn Iterator<Item = (Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_exact(key, &mut |k, v| out.push((k.into(), v)));
        Box::new(out.into_iter())
    }

    /// The `k` entries nearest to `center`, in non-decreasing distance
    /// order, as `(distance, key, value)`.
    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, &'_ V)> + '_>;

    /// The single nearest entry to `center`.
    fn query_1nn(&self, center: &[f64]) -> Option<(f64, Box<[f64]>, &'_ V)> {
        self.query_knn(center, 1).next()
    }
}

/// A box-keyed map holding a single value per key.
pub trait BoxMap<V>: SpatialIndex<V> {
    /// Insert or overwrite; returns the previous value on overwrite.
    fn insert(&mut self, min: &[f64], max: &[f64], value: V) -> Option<V>;

    /// Look up the exact box key.
    fn get(&self, min: &[f64], max: &[f64]) -> Option<&V>;

    /// Whether the exact box key is present.
    fn contains(&self, min: &[f64], max: &[f64]) -> bool {
        self.get(min, max).is_some()
    }

    /// Remove the exact box key, returning its value.
    fn remove(&mut self, min: &[f64], max: &[f64]) -> Option<V>;

    /// Relocate the entry at the old box to the new box.
    ///
    /// Returns `false` (and changes nothing) if the old box is absent.
    fn update(
        &mut self,
        old_min: &[f64],
        old_max: &[f64],
        new_min: &[f64],
        new_max: &[f64],
    ) -> bool;

    /// Visit every entry, in the index's own traversal order.
    fn visit_all<'a>(&'a self, f: &mut BoxVisitor<'a, '_, V>);

    /// Visit every entry whose box intersects the closed box `[min, max]`.
    fn visit_query<'a>(&'a self, min: &[f64], max: &[f64], f: &mut BoxVisitor<'a, '_, V>);

    /// All entries, buffered.
    #[allow(clippy::type_complexity, reason = "boxed object-safe query surface")]
    fn entries(&self) -> Box<dyn Iterator<Item = (Box<[f64]>, Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_all(&mut |lo, hi, v| out.push((lo.into(), hi.into(), v)));
        Box::new(out.into_iter())
    }

    /// Intersection window query, buffered.
    #[allow(clippy::type_complexity, reason = "boxed object-safe query surface")]
    fn query(
        &self,
        min: &[f64],
        max: &[f64],
    ) -> Box<dyn Iterator<Item = (Box<[f64]>, Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_query(min, max, &mut |lo, hi, v| out.push((lo.into(), hi.into(), v)));
        Box::new(out.into_iter())
    }

    /// The `k` entries nearest to `center`, in non-decreasing distance
    /// order, as `(distance, min, max, value)`.
    #[allow(clippy::type_complexity, reason = "boxed object-safe query surface")]
    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, Box<[f64]>, &'_ V)> + '_>;

    /// The single nearest entry to `center`.
    #[allow(clippy::type_complexity, reason = "boxed object-safe query surface")]
    fn query_1nn(&self, center: &[f64]) -> Option<(f64, Box<[f64]>, Box<[f64]>, &'_ V)> {
        self.query_knn(center, 1).next()
    }
}

/// A box-keyed multimap: identical boxes with different values coexist.
pub trait BoxMultimap<V>: SpatialIndex<V> {
    /// Insert an entry. Duplicate `(box, value)` pairs are stored again.
    fn insert(&mut self, min: &[f64], max: &[f64], value: V);

    /// Whether any entry has exactly this box key.
    fn contains_box(&self, min: &[f64], max: &[f64]) -> bool;

    /// Whether the exact `(box, value)` entry is present.
    fn contains_entry(&self, min: &[f64], max: &[f64], value: &V) -> bool
    where
        V: PartialEq;

    /// Remove one entry matching `(box, value)`. Returns whether an entry
    /// was removed.
    fn remove_entry(&mut self, min: &[f64], max: &[f64], value: &V) -> bool
    where
        V: PartialEq;

    /// Remove one entry at the box whose value satisfies `pred`. Returns
    /// whether an entry was removed.
    fn remove_if(
        &mut self,
        min: &[f64],
        max: &[f64],
        pred: &mut dyn FnMut(&V) -> bool,
    ) -> bool;

    /// Relocate the entry `(old box, value)` to the new box.
    fn update_entry(
        &mut self,
        old_min: &[f64],
        old_max: &[f64],
        new_min: &[f64],
        new_max: &[f64],
        value: &V,
    ) -> bool
    where
        V: PartialEq;

    /// Visit every entry, in the index's own traversal order.
    fn visit_all<'a>(&'a self, f: &mut BoxVisitor<'a, '_, V>);

    /// Visit every entry whose box intersects the closed box `[min, max]`.
    fn visit_query<'a>(&'a self, min: &[f64], max: &[f64], f: &mut BoxVisitor<'a, '_, V>);

    /// Visit every entry whose box equals the query box.
    fn visit_exact<'a>(&'a self, min: &[f64], max: &[f64], f: &mut BoxVisitor<'a, '_, V>);

    /// All entries, buffered.
    #[allow(clippy::type_complexity, reason = "boxed object-safe query surface")]
    fn entries(&self) -> Box<dyn Iterator<Item = (Box<[f64]>, Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_all(&mut |lo, hi, v| out.push((lo.into(), hi.into(), v)));
        Box::new(out.into_iter())
    }

    /// Intersection window query, buffered.
    #[allow(clippy::type_complexity, reason = "boxed object-safe query surface")]
    fn query(
        &self,
        min: &[f64],
        max: &[f64],
    ) -> Box<dyn Iterator<Item = (Box<[f64]>, Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_query(min, max, &mut |lo, hi, v| out.push((lo.into(), hi.into(), v)));
        Box::new(out.into_iter())
    }

    /// Exact-box query, buffered.
    #[allow(clippy::type_complexity, reason = "boxed object-safe query surface")]
    fn query_exact(
        &self,
        min: &[f64],
        max: &[f64],
    ) -> Box<dyn Iterator<Item = (Box<[f64]>, Box<[f64]>, &'_ V)> + '_> {
        let mut out = Vec::new();
        self.visit_exact(min, max, &mut |lo, hi, v| out.push((lo.into(), hi.into(), v)));
        Box::new(out.into_iter())
    }

    /// The `k` entries nearest to `center`, in non-decreasing distance
    /// order, as `(distance, min, max, value)`.
    #[allow(clippy::type_complexity, reason = "boxed object-safe query surface")]
    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, Box<[f64]>, &'_ V)> + '_>;

    /// The single nearest entry to `center`.
    #[allow(clippy::type_complexity, reason = "boxed object-safe query surface")]
    fn query_1nn(&self, center: &[f64]) -> Option<(f64, Box<[f64]>, Box<[f64]>, &'_ V)> {
        self.query_knn(center, 1).next()
    }
}

#[cfg(test)]
mod tests {
    use super::{PointMultimap, PointVisitor, SpatialIndex};
    use crate::stats::IndexStats;
    use crate::types::dist_l2;

    // Minimal linear-scan multimap exercising the provided defaults.
    struct Flat {
        entries: Vec<(Box<[f64]>, u32)>,
    }

    impl SpatialIndex<u32> for Flat {
        fn dims(&self) -> usize {
            2
        }
        fn size(&self) -> usize {
            self.entries.len()
        }
        fn clear(&mut self) {
            self.entries.clear();
        }
        fn stats(&self) -> IndexStats {
            IndexStats::new(2).finish(0)
        }
    }

    impl PointMultimap<u32> for Flat {
        fn insert(&mut self, key: &[f64], value: u32) {
            self.entries.push((key.into(), value));
        }
        fn contains_point(&self, key: &[f64]) -> bool {
            self.entries.iter().any(|(k, _)| &**k == key)
        }
        fn contains_entry(&self, key: &[f64], value: &u32) -> bool {
            self.entries.iter().any(|(k, v)| &**k == key && v == value)
        }
        fn remove_entry(&mut self, key: &[f64], value: &u32) -> bool {
            self.remove_if(key, &mut |v| v == value)
        }
        fn remove_if(&mut self, key: &[f64], pred: &mut dyn FnMut(&u32) -> bool) -> bool {
            if let Some(i) = self
                .entries
                .iter()
                .position(|(k, v)| &**k == key && pred(v))
            {
                self.entries.remove(i);
                true
            } else {
                false
            }
        }
        fn update_entry(&mut self, old_key: &[f64], new_key: &[f64], value: &u32) -> bool {
            if self.remove_entry(old_key, value) {
                self.insert(new_key, *value);
                true
            } else {
                false
            }
        }
        fn visit_all(&self, f: &mut PointVisitor<'_, '_, u32>) {
            for (k, v) in &self.entries {
                f(k, v);
            }
        }
        fn visit_query(&self, min: &[f64], max: &[f64], f: &mut PointVisitor<'_, '_, u32>) {
            for (k, v) in &self.entries {
                if crate::types::contains(min, max, k) {
                    f(k, v);
                }
            }
        }
        fn visit_exact(&self, key: &[f64], f: &mut PointVisitor<'_, '_, u32>) {
            for (k, v) in &self.entries {
                if &**k == key {
                    f(k, v);
                }
            }
        }
        fn query_knn(
            &self,
            center: &[f64],
            k: usize,
        ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, &'_ u32)> + '_> {
            let mut out: Vec<_> = self
                .entries
                .iter()
                .map(|(key, v)| (dist_l2(center, key), key.clone(), v))
                .collect();
            out.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("no NaNs here"));
            out.truncate(k);
            Box::new(out.into_iter())
        }
    }

    #[test]
    fn provided_queries_buffer_the_visitors() {
        let mut idx = Flat {
            entries: Vec::new(),
        };
        idx.insert(&[1.0, 1.0], 1);
        idx.insert(&[2.0, 2.0], 2);
        idx.insert(&[8.0, 8.0], 3);

        let hits: Vec<_> = idx.query(&[0.0, 0.0], &[3.0, 3.0]).collect();
        assert_eq!(hits.len(), 2);

        let nearest = idx.query_1nn(&[7.5, 8.0]).expect("index is not empty");
        assert_eq!(*nearest.2, 3);

        let exact: Vec<_> = idx.query_exact(&[2.0, 2.0]).collect();
        assert_eq!(exact.len(), 1);
        assert_eq!(*exact[0].1, 2);
    }
}
