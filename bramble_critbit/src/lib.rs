// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bramble CritBit: bitwise prefix-sharing tries for integer keys.
//!
//! A crit-bit trie routes keys by the most significant bit at which they
//! differ, so the tree shape depends only on the key set, never on the
//! insertion order. Three surfaces are provided:
//!
//! - [`CritBit64`] — 1-D keys as plain `u64` words,
//! - [`CritBit`] — 1-D keys of arbitrary bit width (`u64` word arrays),
//! - [`CritBitKd`] — k-D integer points reduced to 1-D by bit interleaving
//!   ([`interleave`]/[`deinterleave`]), preserving Z-order,
//! - [`CritBitKdMap`] — an `f64` point map over [`CritBitKd`] via the
//!   sortable-integer codec, including best-first k-NN.
//!
//! All tries have map semantics (one value per key) and support range
//! queries; the 1-D variants additionally answer mask queries used to
//! accelerate interleaved traversals.
//!
//! # Example
//!
//! ```rust
//! use bramble_critbit::CritBitKd;
//!
//! let mut t = CritBitKd::new(2, 16).unwrap();
//! t.insert(&[3, 7], "a");
//! t.insert(&[200, 5], "b");
//! let hits: Vec<_> = t.query(&[0, 0], &[100, 100]).collect();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].1, &"a");
//! ```

mod bits;
mod critbit64;
mod kdmap;
mod tree;

pub use bits::{deinterleave, interleave};
pub use critbit64::{CritBit64, Iter64};
pub use kdmap::CritBitKdMap;
pub use tree::{CritBit, CritBitKd, KdIter, WalkIter};
