// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bramble Quadtree: PR-quadtrees over d-dimensional points.
//!
//! Every node covers a hypercube `[center - radius, center + radius]`;
//! child cubes halve the radius and shift the center by a quarter of the
//! parent extent per dimension. Three engines share that geometry and the
//! multimap contract but differ in how directories store children:
//!
//! - [`QuadTree`] — a dense list of the subnodes that exist. No bound on
//!   dimensionality.
//! - [`QuadTreeHc`] — a packed `2^d` array addressed by the quadrant index
//!   (bit `i` selects the upper half of dimension `i`).
//! - [`QuadTreeHc2`] — the packed array with tagged slots
//!   (`Empty | Entry | Node`), so lone points skip the subnode allocation.
//!
//! All engines grow their root towards out-of-domain inserts, let leaves of
//! coincident points overflow the node capacity, merge sparse directories
//! back into leaves on removal, and answer window and best-first k-NN
//! queries.
//!
//! # Example
//!
//! ```rust
//! use bramble_quadtree::QuadTreeHc2;
//!
//! let mut t = QuadTreeHc2::new(2).unwrap();
//! t.insert(&[1.0, 1.0], "a");
//! t.insert(&[8.0, -3.0], "b");
//! let nearest = t.query_knn(&[7.0, -2.0], 1).next().unwrap();
//! assert_eq!(*nearest.entry.value(), "b");
//! ```

mod common;
mod hc;
mod hc2;
mod map;
mod plain;

pub use common::QEntry;
pub use hc::{HcWindowIter, QuadTreeHc};
pub use hc2::{Hc2WindowIter, QuadTreeHc2};
pub use plain::{PlainWindowIter, QuadTree};
