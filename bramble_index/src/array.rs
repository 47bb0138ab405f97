// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linear-scan reference index.
//!
//! The simplest possible point multimap: a flat vector scanned on every
//! query. It backs the `array` factory name and serves as the oracle the
//! randomized tests compare the real trees against.

use bramble_core::types::{contains, dist_l2};
use bramble_core::{IndexError, IndexStats, PointMultimap, PointVisitor, SpatialIndex};

/// Flat-vector point multimap with linear scans.
#[derive(Clone, Debug)]
pub struct ArrayIndex<V> {
    dims: usize,
    entries: Vec<(Box<[f64]>, V)>,
}

impl<V> ArrayIndex<V> {
    /// Create an empty index.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        if dims < 1 {
            return Err(IndexError::InvalidDimensions {
                dims,
                min: 1,
                max: usize::MAX,
            });
        }
        Ok(Self {
            dims,
            entries: Vec::new(),
        })
    }

    #[track_caller]
    fn check_dims(&self, key: &[f64]) {
        assert_eq!(
            key.len(),
            self.dims,
            "key has {} dimensions, index expects {}",
            key.len(),
            self.dims
        );
    }
}

impl<V> SpatialIndex<V> for ArrayIndex<V> {
    fn dims(&self) -> usize {
        self.dims
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::new(self.dims);
        stats.record_node(0, true);
        stats.record_entries(0, self.entries.len());
        stats.finish(0)
    }
}

impl<V> PointMultimap<V> for ArrayIndex<V> {
    fn insert(&mut self, key: &[f64], value: V) {
        self.check_dims(key);
        self.entries.push((key.into(), value));
    }

    fn contains_point(&self, key: &[f64]) -> bool {
        self.check_dims(key);
        self.entries.iter().any(|(k, _)| **k == *key)
    }

    fn contains_entry(&self, key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        self.entries.iter().any(|(k, v)| **k == *key && v == value)
    }

    fn remove_entry(&mut self, key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        self.remove_if(key, &mut |v| v == value)
    }

    fn remove_if(&mut self, key: &[f64], pred: &mut dyn FnMut(&V) -> bool) -> bool {
        self.check_dims(key);
        match self
            .entries
            .iter()
            .position(|(k, v)| **k == *key && pred(v))
        {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    fn update_entry(&mut self, old_key: &[f64], new_key: &[f64], value: &V) -> bool
    where
        V: PartialEq,
    {
        self.check_dims(new_key);
        match self
            .entries
            .iter_mut()
            .find(|(k, v)| **k == *old_key && v == value)
        {
            Some(slot) => {
                slot.0 = new_key.into();
                true
            }
            None => false,
        }
    }

    fn visit_all(&self, f: &mut PointVisitor<'_, '_, V>) {
        for (k, v) in &self.entries {
            f(k, v);
        }
    }

    fn visit_query(&self, min: &[f64], max: &[f64], f: &mut PointVisitor<'_, '_, V>) {
        self.check_dims(min);
        self.check_dims(max);
        for (k, v) in &self.entries {
            if contains(min, max, k) {
                f(k, v);
            }
        }
    }

    fn visit_exact(&self, key: &[f64], f: &mut PointVisitor<'_, '_, V>) {
        self.check_dims(key);
        for (k, v) in &self.entries {
            if **k == *key {
                f(k, v);
            }
        }
    }

    fn query_knn(
        &self,
        center: &[f64],
        k: usize,
    ) -> Box<dyn Iterator<Item = (f64, Box<[f64]>, &'_ V)> + '_> {
        self.check_dims(center);
        let mut scored: Vec<(f64, Box<[f64]>, &V)> = self
            .entries
            .iter()
            .map(|(key, v)| (dist_l2(center, key), key.clone(), v))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);
        Box::new(scored.into_iter())
    }
}
