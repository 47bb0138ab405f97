// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bramble Core: shared building blocks for the Bramble spatial indexes.
//!
//! The tree crates (`bramble_critbit`, `bramble_rtree`, `bramble_quadtree`,
//! `bramble_kdtree`) all sit on top of this crate. It provides:
//!
//! - d-dimensional point and box math over `&[f64]` slices ([`types`]),
//! - pluggable distance functions ([`Distance`], [`EdgeDistance`],
//!   [`CenterDistance`], [`FarNeighborDistance`]),
//! - a sortable-integer codec for floats ([`f64_to_sortable`]),
//! - a min-max heap ([`MinMaxHeap`]) used as the bounded k-NN candidate queue,
//! - the shared incremental best-first k-NN engine ([`KnnIter`]) and the
//!   [`KnnNav`] seam trees implement to plug into it,
//! - the user-facing map and multimap traits ([`PointMap`], [`PointMultimap`],
//!   [`BoxMap`], [`BoxMultimap`]),
//! - configuration, statistics, and error types shared by every index.
//!
//! # Example
//!
//! ```rust
//! use bramble_core::{Distance, EdgeDistance};
//!
//! // Distance from a point to a box: zero inside, else distance to the
//! // nearest face.
//! let d = EdgeDistance.to_box(&[0.0, 5.0], &[1.0, 1.0], &[4.0, 8.0]);
//! assert_eq!(d, 1.0);
//! ```

mod bits;
mod config;
mod error;
mod heap;
mod knn;
mod map;
mod stats;
pub mod types;

pub use bits::{f64_to_sortable, sortable_to_f64};
pub use config::{IndexConfig, RootHint};
pub use error::IndexError;
pub use heap::MinMaxHeap;
pub use knn::{KnnEntry, KnnIter, KnnNav};
pub use map::{BoxMap, BoxMultimap, BoxVisitor, PointMap, PointMultimap, PointVisitor, SpatialIndex};
pub use stats::IndexStats;
pub use types::{CenterDistance, Distance, EdgeDistance, FarNeighborDistance, L2Distance};
