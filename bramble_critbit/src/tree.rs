// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Crit-bit trie over arbitrary-width keys, and its bit-interleaved k-D
//! view.
//!
//! [`CritBit`] stores keys of any bit width as big-endian `u64` word
//! arrays. Inner nodes record the absolute position of the first bit at
//! which their two subtrees differ plus the shared bits above it, which
//! keeps sibling promotion on removal adjustment-free. [`CritBitKd`] layers
//! a k-dimensional surface on top by interleaving point coordinates into a
//! single key (dimension 0 contributes the most significant bit at every
//! depth), turning hyperbox queries into prefix-pruned trie walks.

use smallvec::SmallVec;
use tracing::debug;

use bramble_core::{IndexError, IndexStats};

use crate::bits::{
    bit, cmp_words, copy_prefix, first_diff, kd_dim_bounds, known_in_word, prefix_mismatch,
    set_range,
};
use crate::{deinterleave, interleave};

/// A slot of a crit-bit node: empty, a complete entry, or a subtree.
#[derive(Clone, Debug)]
pub(crate) enum CbSlot<V> {
    Free,
    Entry { key: Box<[u64]>, value: V },
    Node(Box<CbNode<V>>),
}

#[derive(Clone, Debug)]
pub(crate) struct CbNode<V> {
    // Absolute bit position of the first difference between the subtrees.
    pub(crate) pos_diff: usize,
    // Key bits shared by every key below this node; zero at and below
    // `pos_diff`.
    pub(crate) prefix: Box<[u64]>,
    pub(crate) lo: CbSlot<V>,
    pub(crate) hi: CbSlot<V>,
}

/// Crit-bit trie over keys of a fixed, arbitrary bit width.
///
/// Keys are passed as big-endian `u64` word slices of exactly
/// `width.div_ceil(64)` words; bits beyond `width` must be zero. Map
/// semantics: inserting an existing key overwrites and returns the previous
/// value.
#[derive(Clone, Debug)]
pub struct CritBit<V> {
    width: usize,
    words: usize,
    root: CbSlot<V>,
    size: usize,
}

impl<V> CritBit<V> {
    /// Create an empty trie for keys of `width` bits.
    pub fn new(width: usize) -> Result<Self, IndexError> {
        if width < 1 {
            return Err(IndexError::InvalidWidth { width });
        }
        debug!(width, "creating crit-bit trie");
        Ok(Self {
            width,
            words: width.div_ceil(64),
            root: CbSlot::Free,
            size: 0,
        })
    }

    /// Key width in bits.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of `u64` words per key.
    pub fn words(&self) -> usize {
        self.words
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the trie is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.root = CbSlot::Free;
        self.size = 0;
    }

    #[track_caller]
    fn check_key(&self, key: &[u64]) {
        assert_eq!(
            key.len(),
            self.words,
            "key has {} words, trie expects {}",
            key.len(),
            self.words
        );
    }

    /// Insert or overwrite; returns the previous value on overwrite.
    pub fn insert(&mut self, key: &[u64], value: V) -> Option<V> {
        self.check_key(key);
        if matches!(self.root, CbSlot::Free) {
            self.root = CbSlot::Entry {
                key: key.into(),
                value,
            };
            self.size = 1;
            return None;
        }
        let width = self.width;
        let old = Self::insert_slot(&mut self.root, key, value, width);
        if old.is_none() {
            self.size += 1;
        }
        old
    }

    fn insert_slot(slot: &mut CbSlot<V>, key: &[u64], value: V, width: usize) -> Option<V> {
        match slot {
            CbSlot::Free => unreachable!("insert descended into a free slot"),
            CbSlot::Entry { key: k2, value: v2 } => {
                let Some(diff) = first_diff(key, k2, width) else {
                    return Some(std::mem::replace(v2, value));
                };
                let existing = std::mem::replace(slot, CbSlot::Free);
                *slot = Self::branch(diff, key, existing, value);
                None
            }
            CbSlot::Node(node) => {
                if let Some(diff) = prefix_mismatch(key, &node.prefix, node.pos_diff) {
                    // The key leaves the shared prefix above this node's
                    // discriminating bit: split here.
                    let existing = std::mem::replace(slot, CbSlot::Free);
                    *slot = Self::branch(diff, key, existing, value);
                    return None;
                }
                let target = if bit(key, node.pos_diff) {
                    &mut node.hi
                } else {
                    &mut node.lo
                };
                Self::insert_slot(target, key, value, width)
            }
        }
    }

    // A new node discriminating at `diff` between `existing` (whatever was
    // in the slot) and a fresh entry for `key`.
    fn branch(diff: usize, key: &[u64], existing: CbSlot<V>, value: V) -> CbSlot<V> {
        let fresh = CbSlot::Entry {
            key: key.into(),
            value,
        };
        let (lo, hi) = if bit(key, diff) {
            (existing, fresh)
        } else {
            (fresh, existing)
        };
        CbSlot::Node(Box::new(CbNode {
            pos_diff: diff,
            prefix: copy_prefix(key, diff),
            lo,
            hi,
        }))
    }

    /// Look up the exact key.
    pub fn get(&self, key: &[u64]) -> Option<&V> {
        self.check_key(key);
        let mut slot = &self.root;
        loop {
            match slot {
                CbSlot::Free => return None,
                CbSlot::Entry { key: k2, value } => {
                    return if first_diff(key, k2, self.width).is_none() {
                        Some(value)
                    } else {
                        None
                    };
                }
                CbSlot::Node(node) => {
                    if prefix_mismatch(key, &node.prefix, node.pos_diff).is_some() {
                        return None;
                    }
                    slot = if bit(key, node.pos_diff) {
                        &node.hi
                    } else {
                        &node.lo
                    };
                }
            }
        }
    }

    /// Whether the exact key is present.
    pub fn contains(&self, key: &[u64]) -> bool {
        self.get(key).is_some()
    }

    /// Remove the exact key, returning its value.
    pub fn remove(&mut self, key: &[u64]) -> Option<V> {
        self.check_key(key);
        let width = self.width;
        let removed = Self::remove_slot(&mut self.root, key, width);
        if removed.is_some() {
            self.size -= 1;
        }
        removed
    }

    fn remove_slot(slot: &mut CbSlot<V>, key: &[u64], width: usize) -> Option<V> {
        match slot {
            CbSlot::Free => None,
            CbSlot::Entry { key: k2, .. } => {
                if first_diff(key, k2, width).is_some() {
                    return None;
                }
                let CbSlot::Entry { value, .. } = std::mem::replace(slot, CbSlot::Free) else {
                    unreachable!("slot changed type under us");
                };
                Some(value)
            }
            CbSlot::Node(node) => {
                if prefix_mismatch(key, &node.prefix, node.pos_diff).is_some() {
                    return None;
                }
                let high = bit(key, node.pos_diff);
                let target = if high { &mut node.hi } else { &mut node.lo };
                let target_matches = matches!(
                    target,
                    CbSlot::Entry { key: k2, .. } if first_diff(key, k2, width).is_none()
                );
                if target_matches {
                    // Remove the entry and promote its sibling into this
                    // node's place. Prefixes are absolute, so the sibling
                    // needs no adjustment.
                    let CbSlot::Node(node) = std::mem::replace(slot, CbSlot::Free) else {
                        unreachable!("slot changed type under us");
                    };
                    let CbNode { lo, hi, .. } = *node;
                    let (removed, sibling) = if high { (hi, lo) } else { (lo, hi) };
                    *slot = sibling;
                    let CbSlot::Entry { value, .. } = removed else {
                        unreachable!("matched entry changed type under us");
                    };
                    Some(value)
                } else {
                    Self::remove_slot(target, key, width)
                }
            }
        }
    }

    /// All entries in the trie's left-first traversal order (increasing
    /// unsigned key order).
    pub fn iter(&self) -> WalkIter<'_, V> {
        WalkIter::new(self, WordPred::All)
    }

    /// All entries whose key lies in the closed range `[min, max]`
    /// (unsigned big-endian order).
    pub fn query(&self, min: &[u64], max: &[u64]) -> WalkIter<'_, V> {
        self.check_key(min);
        self.check_key(max);
        WalkIter::new(
            self,
            WordPred::Range {
                min: min.into(),
                max: max.into(),
            },
        )
    }

    /// All entries `k` with every bit of `min_mask` set in `k` and no bit of
    /// `k` outside `max_mask`.
    pub fn query_with_mask(&self, min_mask: &[u64], max_mask: &[u64]) -> WalkIter<'_, V> {
        self.check_key(min_mask);
        self.check_key(max_mask);
        WalkIter::new(
            self,
            WordPred::Mask {
                min_mask: min_mask.into(),
                max_mask: max_mask.into(),
            },
        )
    }

    /// Statistics snapshot. The `dims` field reports 1; the k-D view
    /// overrides it.
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::new(1);
        Self::stats_walk(&self.root, 0, &mut stats);
        stats.finish(0)
    }

    fn stats_walk(slot: &CbSlot<V>, level: usize, stats: &mut IndexStats) {
        match slot {
            CbSlot::Free => {}
            CbSlot::Entry { .. } => stats.record_entries(level, 1),
            CbSlot::Node(node) => {
                let is_leaf = !matches!(node.lo, CbSlot::Node(_))
                    && !matches!(node.hi, CbSlot::Node(_));
                stats.record_node(level, is_leaf);
                Self::stats_walk(&node.lo, level + 1, stats);
                Self::stats_walk(&node.hi, level + 1, stats);
            }
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum WordPred {
    All,
    Range {
        min: Box<[u64]>,
        max: Box<[u64]>,
    },
    Mask {
        min_mask: Box<[u64]>,
        max_mask: Box<[u64]>,
    },
    KdRange {
        min: Box<[u64]>,
        max: Box<[u64]>,
        dims: usize,
        dim_width: usize,
    },
}

#[derive(Clone, Copy, Debug)]
enum Visit {
    Lo,
    Hi,
    Up,
}

/// Resumable traversal over a [`CritBit`], optionally restricted by a
/// range, mask, or k-D hyperbox predicate.
///
/// Yields `(key, &value)` pairs with the key borrowed from the trie.
#[derive(Debug)]
pub struct WalkIter<'a, V> {
    pred: WordPred,
    width: usize,
    stack: SmallVec<[(&'a CbNode<V>, Visit); 16]>,
    pending: Option<(&'a [u64], &'a V)>,
    // Scratch for subtree upper bounds and k-D point extraction.
    hi_scratch: Vec<u64>,
    point_scratch: Vec<u64>,
}

impl<'a, V> WalkIter<'a, V> {
    pub(crate) fn new(tree: &'a CritBit<V>, pred: WordPred) -> Self {
        let dims = match &pred {
            WordPred::KdRange { dims, .. } => *dims,
            _ => 0,
        };
        let mut iter = Self {
            pred,
            width: tree.width,
            stack: SmallVec::new(),
            pending: None,
            hi_scratch: vec![0; tree.words],
            point_scratch: vec![0; dims],
        };
        match &tree.root {
            CbSlot::Free => {}
            CbSlot::Entry { key, value } => {
                if iter.accepts_key(key) {
                    iter.pending = Some((key, value));
                }
            }
            CbSlot::Node(node) => {
                if iter.accepts_subtree(node) {
                    iter.stack.push((node, Visit::Lo));
                }
            }
        }
        iter
    }

    fn accepts_subtree(&mut self, node: &CbNode<V>) -> bool {
        match &self.pred {
            WordPred::All => true,
            WordPred::Range { min, max } => {
                if cmp_words(&node.prefix, max) == std::cmp::Ordering::Greater {
                    return false;
                }
                // Largest key below the node: the prefix with every free
                // bit set.
                self.hi_scratch.copy_from_slice(&node.prefix);
                set_range(&mut self.hi_scratch, node.pos_diff, self.width);
                cmp_words(&self.hi_scratch, min) != std::cmp::Ordering::Less
            }
            WordPred::Mask { min_mask, max_mask } => {
                for (i, &p) in node.prefix.iter().enumerate() {
                    let known = known_in_word(i, node.pos_diff);
                    if (min_mask[i] & known) & !p != 0 || p & known & !max_mask[i] != 0 {
                        return false;
                    }
                }
                true
            }
            WordPred::KdRange {
                min,
                max,
                dims,
                dim_width,
            } => {
                for d in 0..*dims {
                    let (lo, hi) =
                        kd_dim_bounds(&node.prefix, node.pos_diff, *dims, *dim_width, d);
                    if hi < min[d] || lo > max[d] {
                        return false;
                    }
                }
                true
            }
        }
    }

    fn accepts_key(&mut self, key: &[u64]) -> bool {
        match &self.pred {
            WordPred::All => true,
            WordPred::Range { min, max } => {
                cmp_words(key, min) != std::cmp::Ordering::Less
                    && cmp_words(key, max) != std::cmp::Ordering::Greater
            }
            WordPred::Mask { min_mask, max_mask } => key
                .iter()
                .zip(min_mask.iter().zip(max_mask.iter()))
                .all(|(&k, (&lo, &hi))| (k | lo) == k && (k & hi) == k),
            WordPred::KdRange {
                min,
                max,
                dims,
                dim_width,
            } => {
                deinterleave(key, *dims, *dim_width, &mut self.point_scratch);
                self.point_scratch
                    .iter()
                    .zip(min.iter().zip(max.iter()))
                    .all(|(&c, (&lo, &hi))| lo <= c && c <= hi)
            }
        }
    }
}

impl<'a, V> Iterator for WalkIter<'a, V> {
    type Item = (&'a [u64], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entry) = self.pending.take() {
            return Some(entry);
        }
        while let Some(frame) = self.stack.last_mut() {
            let node = frame.0;
            let slot = match frame.1 {
                Visit::Lo => {
                    frame.1 = Visit::Hi;
                    &node.lo
                }
                Visit::Hi => {
                    frame.1 = Visit::Up;
                    &node.hi
                }
                Visit::Up => {
                    self.stack.pop();
                    continue;
                }
            };
            match slot {
                CbSlot::Free => {}
                CbSlot::Entry { key, value } => {
                    if self.accepts_key(key) {
                        return Some((key, value));
                    }
                }
                CbSlot::Node(child) => {
                    if self.accepts_subtree(child) {
                        self.stack.push((child, Visit::Lo));
                    }
                }
            }
        }
        None
    }
}

/// k-dimensional view over a [`CritBit`]: point coordinates are interleaved
/// bitwise into one key, preserving a Z-order traversal.
///
/// Coordinates are unsigned `width`-bit integers. Map semantics, like the
/// underlying trie.
#[derive(Clone, Debug)]
pub struct CritBitKd<V> {
    dims: usize,
    dim_width: usize,
    tree: CritBit<V>,
}

impl<V> CritBitKd<V> {
    /// Largest supported dimensionality.
    ///
    /// Bounded so the divmod shortcut in the query walk stays exact over
    /// every interleaved bit position.
    pub const MAX_DIMS: usize = 64;

    /// Create a trie for `dims`-dimensional points of `width`-bit
    /// coordinates.
    pub fn new(dims: usize, width: usize) -> Result<Self, IndexError> {
        if dims < 1 || dims > Self::MAX_DIMS {
            return Err(IndexError::InvalidDimensions {
                dims,
                min: 1,
                max: Self::MAX_DIMS,
            });
        }
        if width < 1 || width > 64 {
            return Err(IndexError::InvalidWidth { width });
        }
        debug!(dims, width, "creating k-D crit-bit trie");
        Ok(Self {
            dims,
            dim_width: width,
            tree: CritBit::new(dims * width)?,
        })
    }

    /// Number of dimensions.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Per-dimension coordinate width in bits.
    pub fn dim_width(&self) -> usize {
        self.dim_width
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Whether the trie is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    pub(crate) fn raw(&self) -> &CritBit<V> {
        &self.tree
    }

    pub(crate) fn root_slot(&self) -> &CbSlot<V> {
        &self.tree.root
    }

    #[track_caller]
    fn check_point(&self, point: &[u64]) {
        assert_eq!(
            point.len(),
            self.dims,
            "point has {} dimensions, trie expects {}",
            point.len(),
            self.dims
        );
        debug_assert!(
            self.dim_width == 64
                || point.iter().all(|&c| c < (1 << self.dim_width)),
            "coordinate exceeds the configured {}-bit width",
            self.dim_width
        );
    }

    fn encode(&self, point: &[u64]) -> Vec<u64> {
        let mut key = vec![0; self.tree.words()];
        interleave(point, self.dim_width, &mut key);
        key
    }

    /// Insert or overwrite; returns the previous value on overwrite.
    pub fn insert(&mut self, point: &[u64], value: V) -> Option<V> {
        self.check_point(point);
        let key = self.encode(point);
        self.tree.insert(&key, value)
    }

    /// Look up the exact point.
    pub fn get(&self, point: &[u64]) -> Option<&V> {
        self.check_point(point);
        let key = self.encode(point);
        self.tree.get(&key)
    }

    /// Whether the exact point is present.
    pub fn contains(&self, point: &[u64]) -> bool {
        self.get(point).is_some()
    }

    /// Remove the exact point, returning its value.
    pub fn remove(&mut self, point: &[u64]) -> Option<V> {
        self.check_point(point);
        let key = self.encode(point);
        self.tree.remove(&key)
    }

    /// All entries whose point lies in the closed hyperbox `[min, max]`.
    ///
    /// An inverted hyperbox (`min[d] > max[d]` for some `d`) yields nothing.
    pub fn query(&self, min: &[u64], max: &[u64]) -> KdIter<'_, V> {
        self.check_point(min);
        self.check_point(max);
        KdIter {
            inner: WalkIter::new(
                &self.tree,
                WordPred::KdRange {
                    min: min.into(),
                    max: max.into(),
                    dims: self.dims,
                    dim_width: self.dim_width,
                },
            ),
            dims: self.dims,
            dim_width: self.dim_width,
        }
    }

    /// All entries in Z-order.
    pub fn iter(&self) -> KdIter<'_, V> {
        KdIter {
            inner: self.tree.iter(),
            dims: self.dims,
            dim_width: self.dim_width,
        }
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> IndexStats {
        let mut stats = self.tree.stats();
        stats.dims = self.dims;
        stats
    }
}

/// Iterator over a [`CritBitKd`], yielding de-interleaved points.
#[derive(Debug)]
pub struct KdIter<'a, V> {
    inner: WalkIter<'a, V>,
    dims: usize,
    dim_width: usize,
}

impl<'a, V> Iterator for KdIter<'a, V> {
    type Item = (Box<[u64]>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self.inner.next()?;
        let mut point = vec![0; self.dims].into_boxed_slice();
        deinterleave(key, self.dims, self.dim_width, &mut point);
        Some((point, value))
    }
}

#[cfg(test)]
mod tests {
    use super::{CritBit, CritBitKd};
    use bramble_core::{IndexError, f64_to_sortable};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn width_32_round_trip() {
        let raw: [i64; 4] = [-723955400, -1690734402, -1728529858, -1661998771];
        let keys: Vec<[u64; 1]> = raw.iter().map(|&v| [(v << 32) as u64]).collect();

        let mut t = CritBit::new(32).expect("valid width");
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(t.insert(k, i), None);
        }
        for (i, k) in keys.iter().enumerate() {
            assert!(t.contains(k));
            assert_eq!(t.get(k), Some(&i));
            assert_eq!(t.insert(k, i), Some(i));
        }
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(t.remove(k), Some(i));
            assert_eq!(t.size(), keys.len() - i - 1);
            assert_eq!(t.remove(k), None);
        }
        assert_eq!(t.size(), 0);
    }

    #[test]
    fn rejects_zero_width_and_bad_dims() {
        assert!(matches!(
            CritBit::<u8>::new(0),
            Err(IndexError::InvalidWidth { width: 0 })
        ));
        assert!(matches!(
            CritBitKd::<u8>::new(0, 32),
            Err(IndexError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            CritBitKd::<u8>::new(2, 65),
            Err(IndexError::InvalidWidth { width: 65 })
        ));
    }

    #[test]
    fn multi_word_keys_round_trip() {
        let mut t = CritBit::new(192).expect("valid width");
        let keys = [
            [0_u64, 0, 1],
            [0, 0, 2],
            [0, 1 << 63, 0],
            [u64::MAX, 0, 7],
            [u64::MAX, 0, 8],
        ];
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(t.insert(k, i), None);
        }
        assert_eq!(t.size(), keys.len());
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(t.get(k), Some(&i));
        }
        // Sorted iteration across word boundaries.
        let got: Vec<Vec<u64>> = t.iter().map(|(k, _)| k.to_vec()).collect();
        let mut expected: Vec<Vec<u64>> = keys.iter().map(|k| k.to_vec()).collect();
        expected.sort();
        assert_eq!(got, expected);
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(t.remove(k), Some(i));
        }
        assert!(t.is_empty());
    }

    #[test]
    fn range_query_matches_reference_across_words() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut t = CritBit::new(128).expect("valid width");
        let mut reference = BTreeMap::new();
        for _ in 0..400 {
            let k = [rng.gen_range(0..8_u64), rng.r#gen::<u64>()];
            t.insert(&k, k[1]);
            reference.insert(k, k[1]);
        }
        for _ in 0..100 {
            let a = [rng.gen_range(0..8_u64), rng.r#gen::<u64>()];
            let b = [rng.gen_range(0..8_u64), rng.r#gen::<u64>()];
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            let got: Vec<[u64; 2]> = t
                .query(&min, &max)
                .map(|(k, _)| [k[0], k[1]])
                .collect();
            let expected: Vec<[u64; 2]> =
                reference.range(min..=max).map(|(&k, _)| k).collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn kd_exact_point_query_4d() {
        let mut t = CritBitKd::new(4, 64).expect("valid config");
        let point = [
            123456789012_u64,
            3456,
            f64_to_sortable(1234.5678),
            12345678901234,
        ];
        assert_eq!(t.insert(&point, "hello 4D"), None);
        assert_eq!(t.get(&point), Some(&"hello 4D"));

        // A hyperbox strictly enclosing the point yields exactly it.
        let min = [123456789000, 3000, f64_to_sortable(1000.0), 12345678900000];
        let max = [
            123456789100,
            4000,
            f64_to_sortable(2000.0),
            12345678999999,
        ];
        let hits: Vec<_> = t.query(&min, &max).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(&*hits[0].0, &point[..]);
        assert_eq!(hits[0].1, &"hello 4D");

        // Inverted box yields nothing.
        assert_eq!(t.query(&max, &min).count(), 0);
    }

    #[test]
    fn kd_window_query_matches_linear_scan() {
        let mut rng = StdRng::seed_from_u64(0xbeef);
        let mut t = CritBitKd::new(3, 16).expect("valid config");
        let mut entries: Vec<[u64; 3]> = Vec::new();
        for i in 0..500_u32 {
            let p = [
                rng.gen_range(0..1 << 16),
                rng.gen_range(0..1 << 16),
                rng.gen_range(0..1 << 16),
            ];
            if t.insert(&p, i).is_none() {
                entries.push(p);
            }
        }
        for _ in 0..100 {
            let mut min = [0_u64; 3];
            let mut max = [0_u64; 3];
            for d in 0..3 {
                let a = rng.gen_range(0..1 << 16);
                let b = rng.gen_range(0..1 << 16);
                (min[d], max[d]) = if a <= b { (a, b) } else { (b, a) };
            }
            let mut got: Vec<[u64; 3]> = t
                .query(&min, &max)
                .map(|(p, _)| [p[0], p[1], p[2]])
                .collect();
            let mut expected: Vec<[u64; 3]> = entries
                .iter()
                .copied()
                .filter(|p| (0..3).all(|d| min[d] <= p[d] && p[d] <= max[d]))
                .collect();
            got.sort_unstable();
            expected.sort_unstable();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn mask_query_on_words() {
        let mut t = CritBit::new(64).expect("valid width");
        for k in 0..256_u64 {
            t.insert(&[k], k);
        }
        let min_mask = [0b1000_u64];
        let max_mask = [0b1110_1011_u64];
        let got: Vec<u64> = t
            .query_with_mask(&min_mask, &max_mask)
            .map(|(k, _)| k[0])
            .collect();
        let expected: Vec<u64> = (0..256)
            .filter(|&k| (k | 0b1000) == k && (k & 0b1110_1011) == k)
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn stats_counts_nodes_and_entries() {
        let mut t = CritBit::new(64).expect("valid width");
        for k in 0..32_u64 {
            t.insert(&[k * 17], ());
        }
        let stats = t.stats();
        assert_eq!(stats.size, 32);
        // A crit-bit trie over n >= 2 keys has exactly n - 1 inner nodes.
        assert_eq!(stats.n_nodes, 31);
    }
}
