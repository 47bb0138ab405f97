// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bramble RTree: an R*-tree over axis-aligned boxes.
//!
//! The tree keeps entries in a balanced hierarchy of minimum bounding
//! boxes. Inserts use the R* protocol (least-overlap subtree choice,
//! forced reinsertion before the first split on a level, margin-driven
//! topological splits); deletes condense under-full nodes by re-inserting
//! their contents. Nodes live in a slot arena with index handles, so
//! parent links are plain fields and node moves never touch ownership.
//!
//! Queries:
//!
//! - [`RTree::query_intersect`] / [`RTree::query_exact_box`] — resumable
//!   window iterators,
//! - [`RTree::query_knn`] — best-first nearest neighbors via the shared
//!   engine in `bramble_core`, with pluggable distance functions,
//! - [`MixedIter`] — combined range + k-NN cursor that tolerates removal
//!   of already-yielded entries,
//! - [`RTree::str_load`] — Sort-Tile-Recursive bulk construction.
//!
//! # Example
//!
//! ```rust
//! use bramble_rtree::RTree;
//!
//! let mut t = RTree::new(2).unwrap();
//! t.insert(&[0.0, 0.0], &[2.0, 2.0], "low");
//! t.insert(&[8.0, 8.0], &[9.0, 9.0], "high");
//!
//! let (dist, nearest) = t.query_1nn(&[7.0, 7.0]).unwrap();
//! assert_eq!(*nearest.value(), "high");
//! assert!((dist - 2.0_f64.sqrt()).abs() < 1e-12);
//! ```

mod bulk;
mod knn;
mod map;
mod mixed;
mod node;
mod query;
mod tree;

pub use mixed::MixedIter;
pub use node::RtEntry;
pub use query::WindowIter;
pub use tree::RTree;
