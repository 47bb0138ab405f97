// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A binary min-max heap.
//!
//! Supports O(log n) insertion and O(log n) removal at *both* ends, with
//! O(1) peeks. The k-NN engine uses it as the bounded candidate queue: new
//! candidates push in, the worst candidate pops out once the queue holds
//! more than `k` elements, and the best candidate pops out when it is due to
//! be yielded.
//!
//! Levels alternate between min and max ordering (the root level is a min
//! level): every element on a min level is `<=` all of its descendants, and
//! every element on a max level is `>=` all of its descendants.

/// A min-max heap over `T`.
///
/// ```rust
/// use bramble_core::MinMaxHeap;
///
/// let mut heap = MinMaxHeap::new();
/// for v in [5, 1, 9, 3, 7] {
///     heap.push(v);
/// }
/// assert_eq!(heap.peek_min(), Some(&1));
/// assert_eq!(heap.peek_max(), Some(&9));
/// assert_eq!(heap.pop_max(), Some(9));
/// assert_eq!(heap.pop_min(), Some(1));
/// assert_eq!(heap.len(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct MinMaxHeap<T> {
    data: Vec<T>,
}

impl<T> Default for MinMaxHeap<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[inline]
fn is_min_level(i: usize) -> bool {
    ((i + 1).ilog2() & 1) == 0
}

#[inline]
fn parent(i: usize) -> usize {
    (i - 1) / 2
}

#[inline]
fn grandparent(i: usize) -> usize {
    parent(parent(i))
}

impl<T: Ord> MinMaxHeap<T> {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty heap with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of elements in the heap.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove all elements, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The smallest element, if any.
    pub fn peek_min(&self) -> Option<&T> {
        self.data.first()
    }

    /// The largest element, if any.
    pub fn peek_max(&self) -> Option<&T> {
        match self.data.len() {
            0 => None,
            1 => Some(&self.data[0]),
            2 => Some(&self.data[1]),
            _ => {
                if self.data[1] >= self.data[2] {
                    Some(&self.data[1])
                } else {
                    Some(&self.data[2])
                }
            }
        }
    }

    /// Insert an element.
    pub fn push(&mut self, value: T) {
        self.data.push(value);
        let i = self.data.len() - 1;
        if i == 0 {
            return;
        }
        let p = parent(i);
        if is_min_level(i) {
            if self.data[i] > self.data[p] {
                self.data.swap(i, p);
                self.bubble_up_max(p);
            } else {
                self.bubble_up_min(i);
            }
        } else if self.data[i] < self.data[p] {
            self.data.swap(i, p);
            self.bubble_up_min(p);
        } else {
            self.bubble_up_max(i);
        }
    }

    /// Remove and return the smallest element.
    pub fn pop_min(&mut self) -> Option<T> {
        match self.data.len() {
            0 => None,
            1 => self.data.pop(),
            n => {
                self.data.swap(0, n - 1);
                let out = self.data.pop();
                self.trickle_down_min(0);
                out
            }
        }
    }

    /// Remove and return the largest element.
    pub fn pop_max(&mut self) -> Option<T> {
        match self.data.len() {
            0 => None,
            1 | 2 => self.data.pop(),
            n => {
                let mi = if self.data[1] >= self.data[2] { 1 } else { 2 };
                if mi == n - 1 {
                    return self.data.pop();
                }
                self.data.swap(mi, n - 1);
                let out = self.data.pop();
                self.trickle_down_max(mi);
                out
            }
        }
    }

    fn bubble_up_min(&mut self, mut i: usize) {
        while i >= 3 {
            let g = grandparent(i);
            if self.data[i] < self.data[g] {
                self.data.swap(i, g);
                i = g;
            } else {
                break;
            }
        }
    }

    fn bubble_up_max(&mut self, mut i: usize) {
        while i >= 3 {
            let g = grandparent(i);
            if self.data[i] > self.data[g] {
                self.data.swap(i, g);
                i = g;
            } else {
                break;
            }
        }
    }

    // Index of the smallest element among the children and grandchildren of
    // `i`, together with whether it is a grandchild.
    fn smallest_descendant(&self, i: usize) -> Option<(usize, bool)> {
        let n = self.data.len();
        let c0 = 2 * i + 1;
        if c0 >= n {
            return None;
        }
        let mut m = c0;
        let mut is_grandchild = false;
        let c1 = c0 + 1;
        if c1 < n && self.data[c1] < self.data[m] {
            m = c1;
        }
        for g in (4 * i + 3)..=(4 * i + 6) {
            if g >= n {
                break;
            }
            if self.data[g] < self.data[m] {
                m = g;
                is_grandchild = true;
            }
        }
        Some((m, is_grandchild))
    }

    fn largest_descendant(&self, i: usize) -> Option<(usize, bool)> {
        let n = self.data.len();
        let c0 = 2 * i + 1;
        if c0 >= n {
            return None;
        }
        let mut m = c0;
        let mut is_grandchild = false;
        let c1 = c0 + 1;
        if c1 < n && self.data[c1] > self.data[m] {
            m = c1;
        }
        for g in (4 * i + 3)..=(4 * i + 6) {
            if g >= n {
                break;
            }
            if self.data[g] > self.data[m] {
                m = g;
                is_grandchild = true;
            }
        }
        Some((m, is_grandchild))
    }

    fn trickle_down_min(&mut self, mut i: usize) {
        while let Some((m, is_grandchild)) = self.smallest_descendant(i) {
            if self.data[m] >= self.data[i] {
                break;
            }
            self.data.swap(i, m);
            if !is_grandchild {
                break;
            }
            let p = parent(m);
            if self.data[m] > self.data[p] {
                self.data.swap(m, p);
            }
            i = m;
        }
    }

    fn trickle_down_max(&mut self, mut i: usize) {
        while let Some((m, is_grandchild)) = self.largest_descendant(i) {
            if self.data[m] <= self.data[i] {
                break;
            }
            self.data.swap(i, m);
            if !is_grandchild {
                break;
            }
            let p = parent(m);
            if self.data[m] < self.data[p] {
                self.data.swap(m, p);
            }
            i = m;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MinMaxHeap;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn ascending_drain_is_sorted() {
        let mut heap = MinMaxHeap::new();
        for v in [4, 1, 7, 0, 9, 9, 2, 5] {
            heap.push(v);
        }
        let mut out = Vec::new();
        while let Some(v) = heap.pop_min() {
            out.push(v);
        }
        assert_eq!(out, vec![0, 1, 2, 4, 5, 7, 9, 9]);
    }

    #[test]
    fn descending_drain_is_reverse_sorted() {
        let mut heap = MinMaxHeap::new();
        for v in [4, 1, 7, 0, 9, 9, 2, 5] {
            heap.push(v);
        }
        let mut out = Vec::new();
        while let Some(v) = heap.pop_max() {
            out.push(v);
        }
        assert_eq!(out, vec![9, 9, 7, 5, 4, 2, 1, 0]);
    }

    #[test]
    fn peeks_track_both_ends() {
        let mut heap = MinMaxHeap::new();
        assert_eq!(heap.peek_min(), None);
        assert_eq!(heap.peek_max(), None);
        heap.push(3);
        assert_eq!((heap.peek_min(), heap.peek_max()), (Some(&3), Some(&3)));
        heap.push(8);
        assert_eq!((heap.peek_min(), heap.peek_max()), (Some(&3), Some(&8)));
        heap.push(1);
        assert_eq!((heap.peek_min(), heap.peek_max()), (Some(&1), Some(&8)));
    }

    #[test]
    fn randomized_against_sorted_reference() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for round in 0..50 {
            let n = 1 + (round * 7) % 200;
            let mut values: Vec<i64> = (0..n).map(|_| rng.gen_range(-1000..1000)).collect();
            let mut heap = MinMaxHeap::new();
            for &v in &values {
                heap.push(v);
            }
            values.sort_unstable();
            // Alternate popping from both ends and check against the sorted
            // reference shrinking from both sides.
            let (mut lo, mut hi) = (0, values.len());
            while lo < hi {
                if rng.gen_bool(0.5) {
                    assert_eq!(heap.pop_min(), Some(values[lo]));
                    lo += 1;
                } else {
                    hi -= 1;
                    assert_eq!(heap.pop_max(), Some(values[hi]));
                }
            }
            assert!(heap.is_empty());
        }
    }

    #[test]
    fn clear_keeps_the_heap_usable() {
        let mut heap = MinMaxHeap::with_capacity(8);
        for v in 0..8 {
            heap.push(v);
        }
        heap.clear();
        assert!(heap.is_empty());
        heap.push(42);
        assert_eq!(heap.pop_max(), Some(42));
    }
}
