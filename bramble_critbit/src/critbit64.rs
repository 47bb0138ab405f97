// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Crit-bit trie over plain `u64` keys.
//!
//! [`CritBit64`] is the fixed-width specialization: keys are single machine
//! words compared as unsigned integers, most significant bit first. Inner
//! nodes record the first bit position at which their two subtrees differ
//! (`pos_diff`) together with the key bits shared above it, so lookups
//! inspect one word per visited node and the tree never stores more nodes
//! than entries minus one.
//!
//! Map semantics: inserting an existing key overwrites and returns the
//! previous value.

use smallvec::SmallVec;

use crate::bits::{bit64, mask_above64};

// A slot holds either nothing (empty tree / transient during restructuring),
// a complete entry, or a subtree.
#[derive(Clone, Debug)]
pub(crate) enum Slot64<V> {
    Free,
    Entry { key: u64, value: V },
    Node(Box<Node64<V>>),
}

#[derive(Clone, Debug)]
pub(crate) struct Node64<V> {
    // First bit position (0 = MSB) where the two subtrees differ.
    pub(crate) pos_diff: u32,
    // Key bits shared by every key below this node; zero at and below
    // `pos_diff`.
    pub(crate) prefix: u64,
    pub(crate) lo: Slot64<V>,
    pub(crate) hi: Slot64<V>,
}

/// Crit-bit trie mapping `u64` keys to values.
///
/// ```rust
/// use bramble_critbit::CritBit64;
///
/// let mut t = CritBit64::new();
/// assert_eq!(t.insert(0xC0FFEE, "dark"), None);
/// assert_eq!(t.insert(0xC0FFEE, "light"), Some("dark"));
/// assert_eq!(t.get(0xC0FFEE), Some(&"light"));
/// assert_eq!(t.remove(0xC0FFEE), Some("light"));
/// assert!(t.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct CritBit64<V> {
    root: Slot64<V>,
    size: usize,
}

impl<V> Default for CritBit64<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CritBit64<V> {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self {
            root: Slot64::Free,
            size: 0,
        }
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
        self.root = Slot64::Free;
        self.size = 0;
    }

    /// Insert or overwrite; returns the previous value on overwrite.
    pub fn insert(&mut self, key: u64, value: V) -> Option<V> {
        if matches!(self.root, Slot64::Free) {
            self.root = Slot64::Entry { key, value };
            self.size = 1;
            return None;
        }
        let old = Self::insert_slot(&mut self.root, key, value);
        if old.is_none() {
            self.size += 1;
        }
        old
    }

    fn insert_slot(slot: &mut Slot64<V>, key: u64, value: V) -> Option<V> {
        match slot {
            Slot64::Free => unreachable!("insert descended into a free slot"),
            Slot64::Entry { key: k2, value: v2 } => {
                if *k2 == key {
                    return Some(std::mem::replace(v2, value));
                }
                let diff = (key ^ *k2).leading_zeros();
                let existing = std::mem::replace(slot, Slot64::Free);
                let fresh = Slot64::Entry { key, value };
                let (lo, hi) = if bit64(key, diff) {
                    (existing, fresh)
                } else {
                    (fresh, existing)
                };
                *slot = Slot64::Node(Box::new(Node64 {
                    pos_diff: diff,
                    prefix: key & mask_above64(diff),
                    lo,
                    hi,
                }));
                None
            }
            Slot64::Node(node) => {
                let mismatch = (key ^ node.prefix) & mask_above64(node.pos_diff);
                if mismatch != 0 {
                    // The key leaves the shared prefix above this node's
                    // discriminating bit: split here.
                    let diff = mismatch.leading_zeros();
                    let existing = std::mem::replace(slot, Slot64::Free);
                    let fresh = Slot64::Entry { key, value };
                    let (lo, hi) = if bit64(key, diff) {
                        (existing, fresh)
                    } else {
                        (fresh, existing)
                    };
                    *slot = Slot64::Node(Box::new(Node64 {
                        pos_diff: diff,
                        prefix: key & mask_above64(diff),
                        lo,
                        hi,
                    }));
                    return None;
                }
                let target = if bit64(key, node.pos_diff) {
                    &mut node.hi
                } else {
                    &mut node.lo
                };
                Self::insert_slot(target, key, value)
            }
        }
    }

    /// Look up the exact key.
    pub fn get(&self, key: u64) -> Option<&V> {
        let mut slot = &self.root;
        loop {
            match slot {
                Slot64::Free => return None,
                Slot64::Entry { key: k2, value } => {
                    return if *k2 == key { Some(value) } else { None };
                }
                Slot64::Node(node) => {
                    if (key ^ node.prefix) & mask_above64(node.pos_diff) != 0 {
                        return None;
                    }
                    slot = if bit64(key, node.pos_diff) {
                        &node.hi
                    } else {
                        &node.lo
                    };
                }
            }
        }
    }

    /// Whether the exact key is present.
    pub fn contains(&self, key: u64) -> bool {
        self.get(key).is_some()
    }

    /// Remove the exact key, returning its value.
    pub fn remove(&mut self, key: u64) -> Option<V> {
        let removed = Self::remove_slot(&mut self.root, key);
        if removed.is_some() {
            self.size -= 1;
        }
        removed
    }

    fn remove_slot(slot: &mut Slot64<V>, key: u64) -> Option<V> {
        match slot {
            Slot64::Free => None,
            Slot64::Entry { key: k2, .. } => {
                if *k2 != key {
                    return None;
                }
                let Slot64::Entry { value, .. } = std::mem::replace(slot, Slot64::Free) else {
                    unreachable!("slot changed type under us");
                };
                Some(value)
            }
            Slot64::Node(node) => {
                if (key ^ node.prefix) & mask_above64(node.pos_diff) != 0 {
                    return None;
                }
                let high = bit64(key, node.pos_diff);
                let target = if high { &mut node.hi } else { &mut node.lo };
                let target_matches =
                    matches!(target, Slot64::Entry { key: k2, .. } if *k2 == key);
                if target_matches {
                    // Remove the entry and promote its sibling into this
                    // node's place. Prefixes are absolute, so the sibling
                    // needs no adjustment.
                    let Slot64::Node(node) = std::mem::replace(slot, Slot64::Free) else {
                        unreachable!("slot changed type under us");
                    };
                    let Node64 { lo, hi, .. } = *node;
                    let (removed, sibling) = if high { (hi, lo) } else { (lo, hi) };
                    *slot = sibling;
                    let Slot64::Entry { value, .. } = removed else {
                        unreachable!("matched entry changed type under us");
                    };
                    Some(value)
                } else {
                    Self::remove_slot(target, key)
                }
            }
        }
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> bramble_core::IndexStats {
        let mut stats = bramble_core::IndexStats::new(1);
        Self::stats_walk(&self.root, 0, &mut stats);
        stats.finish(0)
    }

    fn stats_walk(slot: &Slot64<V>, level: usize, stats: &mut bramble_core::IndexStats) {
        match slot {
            Slot64::Free => {}
            Slot64::Entry { .. } => stats.record_entries(level, 1),
            Slot64::Node(node) => {
                let is_leaf = !matches!(node.lo, Slot64::Node(_))
                    && !matches!(node.hi, Slot64::Node(_));
                stats.record_node(level, is_leaf);
                Self::stats_walk(&node.lo, level + 1, stats);
                Self::stats_walk(&node.hi, level + 1, stats);
            }
        }
    }

    /// All entries in the trie's left-first traversal order.
    pub fn iter(&self) -> Iter64<'_, V> {
        Iter64::new(self, Pred::All)
    }

    /// All entries whose key lies in the closed range `[min, max]`
    /// (unsigned order).
    pub fn query(&self, min: u64, max: u64) -> Iter64<'_, V> {
        Iter64::new(self, Pred::Range { min, max })
    }

    /// All entries `k` with `(k | min_mask) == k` and `(k & max_mask) == k`,
    /// i.e. every bit of `min_mask` set and no bit outside `max_mask` set.
    pub fn query_with_mask(&self, min_mask: u64, max_mask: u64) -> Iter64<'_, V> {
        Iter64::new(self, Pred::Mask { min_mask, max_mask })
    }
}

#[derive(Clone, Copy, Debug)]
enum Pred {
    All,
    Range { min: u64, max: u64 },
    Mask { min_mask: u64, max_mask: u64 },
}

impl Pred {
    // Can any key below a node with this prefix satisfy the predicate? The
    // node fixes the bits above `pos_diff`; everything at and below it is
    // free.
    fn accepts_subtree(self, prefix: u64, pos_diff: u32) -> bool {
        match self {
            Self::All => true,
            Self::Range { min, max } => {
                let lowest = prefix;
                let highest = prefix | (u64::MAX >> pos_diff);
                lowest <= max && highest >= min
            }
            Self::Mask { min_mask, max_mask } => {
                let known = mask_above64(pos_diff);
                (min_mask & known) & !prefix == 0 && prefix & known & !max_mask == 0
            }
        }
    }

    fn accepts_key(self, key: u64) -> bool {
        match self {
            Self::All => true,
            Self::Range { min, max } => min <= key && key <= max,
            Self::Mask { min_mask, max_mask } => {
                (key | min_mask) == key && (key & max_mask) == key
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Visit {
    Lo,
    Hi,
    Up,
}

/// Resumable traversal over a [`CritBit64`], optionally restricted by a
/// range or mask predicate.
///
/// Yields `(key, &value)` pairs; keys come out in increasing unsigned order
/// because the trie branches on the most significant differing bit.
#[derive(Debug)]
pub struct Iter64<'a, V> {
    pred: Pred,
    stack: SmallVec<[(&'a Node64<V>, Visit); 16]>,
    pending: Option<(u64, &'a V)>,
}

impl<'a, V> Iter64<'a, V> {
    fn new(tree: &'a CritBit64<V>, pred: Pred) -> Self {
        let mut iter = Self {
            pred,
            stack: SmallVec::new(),
            pending: None,
        };
        match &tree.root {
            Slot64::Free => {}
            Slot64::Entry { key, value } => {
                if pred.accepts_key(*key) {
                    iter.pending = Some((*key, value));
                }
            }
            Slot64::Node(node) => {
                if pred.accepts_subtree(node.prefix, node.pos_diff) {
                    iter.stack.push((node, Visit::Lo));
                }
            }
        }
        iter
    }
}

impl<'a, V> Iterator for Iter64<'a, V> {
    type Item = (u64, &'a V);

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
                Slot64::Free => {}
                Slot64::Entry { key, value } => {
                    if self.pred.accepts_key(*key) {
                        return Some((*key, value));
                    }
                }
                Slot64::Node(child) => {
                    if self.pred.accepts_subtree(child.prefix, child.pos_diff) {
                        self.stack.push((child, Visit::Lo));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::CritBit64;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn insert_get_remove_round_trip() {
        let raw: [i64; 4] = [-723955400, -1690734402, -1728529858, -1661998771];
        let keys: Vec<u64> = raw.iter().map(|&v| (v << 32) as u64).collect();

        let mut t = CritBit64::new();
        for (i, &k) in keys.iter().enumerate() {
            assert_eq!(t.insert(k, i), None);
        }
        assert_eq!(t.size(), keys.len());
        for (i, &k) in keys.iter().enumerate() {
            assert!(t.contains(k));
            assert_eq!(t.get(k), Some(&i));
            // A second put overwrites and reports the previous value.
            assert_eq!(t.insert(k, i), Some(i));
        }
        assert_eq!(t.size(), keys.len());
        for (i, &k) in keys.iter().enumerate() {
            assert_eq!(t.remove(k), Some(i));
            assert_eq!(t.size(), keys.len() - i - 1);
            assert_eq!(t.remove(k), None);
        }
        assert_eq!(t.size(), 0);
    }

    #[test]
    fn iteration_is_sorted_and_complete() {
        let mut t = CritBit64::new();
        let keys = [5_u64, 1, u64::MAX, 0, 77, 1 << 63, 42];
        for &k in &keys {
            t.insert(k, k as u32);
        }
        let got: Vec<u64> = t.iter().map(|(k, _)| k).collect();
        let mut expected = keys.to_vec();
        expected.sort_unstable();
        assert_eq!(got, expected);
    }

    #[test]
    fn range_query_matches_btreemap() {
        let mut rng = StdRng::seed_from_u64(64);
        let mut t = CritBit64::new();
        let mut reference = BTreeMap::new();
        for _ in 0..500 {
            let k: u64 = rng.r#gen();
            t.insert(k, k);
            reference.insert(k, k);
        }
        assert_eq!(t.size(), reference.len());
        for _ in 0..100 {
            let a: u64 = rng.r#gen();
            let b: u64 = rng.r#gen();
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            let got: Vec<u64> = t.query(min, max).map(|(k, _)| k).collect();
            let expected: Vec<u64> = reference.range(min..=max).map(|(&k, _)| k).collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn inverted_range_is_empty() {
        let mut t = CritBit64::new();
        t.insert(10, ());
        t.insert(20, ());
        assert_eq!(t.query(21, 9).count(), 0);
    }

    #[test]
    fn mask_query_filters_bit_patterns() {
        let mut t = CritBit64::new();
        for k in 0..64_u64 {
            t.insert(k, ());
        }
        // Keys that contain bit 0b100 and fit inside 0b110111.
        let got: Vec<u64> = t.query_with_mask(0b100, 0b110111).map(|(k, _)| k).collect();
        let expected: Vec<u64> = (0..64)
            .filter(|&k| (k | 0b100) == k && (k & 0b110111) == k)
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn random_removal_keeps_the_rest_reachable() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut t = CritBit64::new();
        let mut reference = BTreeMap::new();
        for _ in 0..300 {
            let k: u64 = rng.gen_range(0..10_000);
            t.insert(k, k * 3);
            reference.insert(k, k * 3);
        }
        let keys: Vec<u64> = reference.keys().copied().collect();
        for (i, &k) in keys.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(t.remove(k), reference.remove(&k));
            }
        }
        assert_eq!(t.size(), reference.len());
        for (&k, &v) in &reference {
            assert_eq!(t.get(k), Some(&v));
        }
        let got: Vec<u64> = t.iter().map(|(k, _)| k).collect();
        let expected: Vec<u64> = reference.keys().copied().collect();
        assert_eq!(got, expected);
    }
}
