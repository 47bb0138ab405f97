// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Implementation discovery by name.
//!
//! Callers pick an engine with a string (configuration files, benchmark
//! harnesses) and get a boxed trait object back. The `array` engine is the
//! linear-scan reference, `ph-tree` is the bit-interleaved prefix trie and
//! the only map-semantics point index; everything else is a multimap.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use bramble_core::{IndexConfig, IndexError, PointMap, PointMultimap};
use bramble_critbit::CritBitKdMap;
use bramble_kdtree::KdTree;
use bramble_quadtree::{QuadTree, QuadTreeHc, QuadTreeHc2};
use bramble_rtree::RTree;

use crate::adapter::RTreePointMultimap;
use crate::array::ArrayIndex;

/// The index implementations known to the factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    /// Linear-scan reference index.
    Array,
    /// Axis-cycling kd-tree.
    KdTree,
    /// Bit-interleaved prefix trie over the sortable float codec.
    PhTree,
    /// Plain PR-quadtree.
    Quadtree,
    /// Hypercube-indexed PR-quadtree.
    QuadtreeHc,
    /// Hypercube-indexed PR-quadtree with inline entry slots.
    QuadtreeHc2,
    /// R*-tree behind a point adapter.
    RStarTree,
    /// R*-tree built by the Sort-Tile-Recursive bulk loader.
    StrPackedRStarTree,
}

impl IndexKind {
    /// Every kind, in factory-name order.
    pub const ALL: [Self; 8] = [
        Self::Array,
        Self::KdTree,
        Self::PhTree,
        Self::Quadtree,
        Self::QuadtreeHc,
        Self::QuadtreeHc2,
        Self::RStarTree,
        Self::StrPackedRStarTree,
    ];

    /// The factory name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::KdTree => "kd-tree",
            Self::PhTree => "ph-tree",
            Self::Quadtree => "quadtree",
            Self::QuadtreeHc => "quadtree-hc",
            Self::QuadtreeHc2 => "quadtree-hc2",
            Self::RStarTree => "rstar-tree",
            Self::StrPackedRStarTree => "str-packed-rstar-tree",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| IndexError::UnknownIndex(s.to_owned()))
    }
}

/// Create an empty point multimap of the given kind.
///
/// `ph-tree` has map semantics and is served by
/// [`create_point_map`] instead.
pub fn create_point_multimap<V: 'static>(
    kind: IndexKind,
    config: &IndexConfig,
) -> Result<Box<dyn PointMultimap<V>>, IndexError> {
    debug!(kind = %kind, dims = config.dims, "creating point multimap");
    Ok(match kind {
        IndexKind::Array => {
            config.validate(1, usize::MAX)?;
            Box::new(ArrayIndex::new(config.dims)?)
        }
        IndexKind::KdTree => Box::new(KdTree::from_config(config)?),
        IndexKind::PhTree => {
            return Err(IndexError::Unsupported(
                "ph-tree is a single-value map; use create_point_map",
            ));
        }
        IndexKind::Quadtree => Box::new(QuadTree::from_config(config)?),
        IndexKind::QuadtreeHc => Box::new(QuadTreeHc::from_config(config)?),
        IndexKind::QuadtreeHc2 => Box::new(QuadTreeHc2::from_config(config)?),
        IndexKind::RStarTree | IndexKind::StrPackedRStarTree => {
            config.validate(1, usize::MAX)?;
            Box::new(RTreePointMultimap::new(config.dims)?)
        }
    })
}

/// Create an empty single-value point map of the given kind.
pub fn create_point_map<V: 'static>(
    kind: IndexKind,
    config: &IndexConfig,
) -> Result<Box<dyn PointMap<V>>, IndexError> {
    debug!(kind = %kind, dims = config.dims, "creating point map");
    match kind {
        IndexKind::PhTree => Ok(Box::new(CritBitKdMap::new(config.dims)?)),
        _ => Err(IndexError::Unsupported(
            "only ph-tree offers single-value map semantics",
        )),
    }
}

/// Build a point multimap of the given kind from a batch of entries.
///
/// `str-packed-rstar-tree` runs the Sort-Tile-Recursive loader; every other
/// kind inserts the entries one by one.
pub fn bulk_load_point_multimap<V: 'static>(
    kind: IndexKind,
    config: &IndexConfig,
    entries: Vec<(Box<[f64]>, V)>,
) -> Result<Box<dyn PointMultimap<V>>, IndexError> {
    if kind == IndexKind::StrPackedRStarTree {
        config.validate(1, usize::MAX)?;
        debug!(n = entries.len(), "STR bulk load through the factory");
        let boxes = entries
            .into_iter()
            .map(|(p, v)| (p.clone(), p, v))
            .collect();
        let tree = RTree::str_load_with_capacity(
            config.dims,
            boxes,
            config.max_node_capacity,
            bramble_rtree::RTree::<V>::DEFAULT_MIN_ENTRIES.min(config.max_node_capacity / 2),
        )?;
        return Ok(Box::new(RTreePointMultimap::from_tree(tree)));
    }
    let mut index = create_point_multimap(kind, config)?;
    for (point, value) in entries {
        index.insert(&point, value);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::{IndexKind, create_point_map, create_point_multimap};
    use bramble_core::IndexConfig;

    #[test]
    fn names_round_trip() {
        for kind in IndexKind::ALL {
            assert_eq!(kind.name().parse::<IndexKind>().expect("known name"), kind);
        }
        assert!("voronoi".parse::<IndexKind>().is_err());
    }

    #[test]
    fn every_multimap_kind_constructs_and_works() {
        let cfg = IndexConfig::new(2);
        for kind in IndexKind::ALL {
            if kind == IndexKind::PhTree {
                continue;
            }
            let mut idx = create_point_multimap::<u32>(kind, &cfg).expect("constructible");
            idx.insert(&[1.0, 2.0], 1);
            idx.insert(&[3.0, 4.0], 2);
            assert_eq!(idx.size(), 2, "{kind}");
            assert!(idx.contains_point(&[3.0, 4.0]), "{kind}");
            let hits: Vec<_> = idx.query(&[0.0, 0.0], &[2.0, 3.0]).collect();
            assert_eq!(hits.len(), 1, "{kind}");
            let nearest = idx.query_1nn(&[3.1, 4.1]).expect("index is not empty");
            assert_eq!(*nearest.2, 2, "{kind}");
            assert!(idx.remove_entry(&[1.0, 2.0], &1), "{kind}");
            assert_eq!(idx.size(), 1, "{kind}");
        }
    }

    #[test]
    fn ph_tree_is_the_map_kind() {
        let cfg = IndexConfig::new(3);
        assert!(create_point_multimap::<u32>(IndexKind::PhTree, &cfg).is_err());
        let mut map = create_point_map::<u32>(IndexKind::PhTree, &cfg).expect("constructible");
        assert_eq!(map.insert(&[1.0, 2.0, 3.0], 9), None);
        assert_eq!(map.insert(&[1.0, 2.0, 3.0], 10), Some(9));
        assert_eq!(map.get(&[1.0, 2.0, 3.0]), Some(&10));
        assert!(create_point_map::<u32>(IndexKind::Array, &cfg).is_err());
    }
}
