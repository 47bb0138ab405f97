// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Index configuration.

use crate::error::IndexError;

/// Estimated data domain passed to quadtree constructors.
///
/// The hint is optional; without it, a quadtree derives its root cube from
/// the first inserted key.
#[derive(Clone, Debug, PartialEq)]
pub struct RootHint {
    /// Estimated center of the data domain.
    pub center: Box<[f64]>,
    /// Estimated half-extent of the data domain in every dimension.
    pub radius: f64,
}

/// Configuration record accepted by every index constructor and by the
/// factory.
///
/// Only [`dims`][Self::dims] is required; the remaining options have
/// defaults and are ignored by implementations they do not apply to.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexConfig {
    /// Number of dimensions of the indexed keys. Must be at least 1.
    pub dims: usize,
    /// Whether keys are copied on insert.
    ///
    /// Kept for API parity with the configuration surface; in this library
    /// keys are always moved or copied into the tree, so the flag has no
    /// behavioral effect.
    pub defensive_key_copy: bool,
    /// Maximum number of entries per node (quadtree leaf capacity, R-tree
    /// node fanout). Must be at least 2.
    pub max_node_capacity: usize,
    /// Estimated data domain (quadtree only).
    pub root_hint: Option<RootHint>,
    /// Snap the quadtree root center and radius to powers of two.
    pub align: bool,
}

impl IndexConfig {
    /// Default node capacity used by the quadtrees and the R*-tree.
    pub const DEFAULT_NODE_CAPACITY: usize = 10;

    /// Create a configuration for `dims`-dimensional keys with defaults for
    /// everything else.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            defensive_key_copy: true,
            max_node_capacity: Self::DEFAULT_NODE_CAPACITY,
            root_hint: None,
            align: false,
        }
    }

    /// Set the per-node entry capacity.
    pub fn with_max_node_capacity(mut self, capacity: usize) -> Self {
        self.max_node_capacity = capacity;
        self
    }

    /// Supply an estimated data domain for quadtree roots.
    pub fn with_root_hint(mut self, center: &[f64], radius: f64) -> Self {
        self.root_hint = Some(RootHint {
            center: center.into(),
            radius,
        });
        self
    }

    /// Snap quadtree root geometry to powers of two.
    pub fn with_align(mut self, align: bool) -> Self {
        self.align = align;
        self
    }

    /// Disable the (nominal) defensive key copy.
    pub fn with_defensive_key_copy(mut self, copy: bool) -> Self {
        self.defensive_key_copy = copy;
        self
    }

    /// Validate the configuration against an implementation's supported
    /// dimension range.
    pub fn validate(&self, min_dims: usize, max_dims: usize) -> Result<(), IndexError> {
        if self.dims < min_dims || self.dims > max_dims {
            return Err(IndexError::InvalidDimensions {
                dims: self.dims,
                min: min_dims,
                max: max_dims,
            });
        }
        if self.max_node_capacity < 2 {
            return Err(IndexError::InvalidCapacity {
                capacity: self.max_node_capacity,
            });
        }
        if let Some(hint) = &self.root_hint
            && hint.center.len() != self.dims
        {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: hint.center.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::IndexConfig;
    use crate::error::IndexError;

    #[test]
    fn defaults() {
        let cfg = IndexConfig::new(3);
        assert_eq!(cfg.dims, 3);
        assert!(cfg.defensive_key_copy);
        assert_eq!(cfg.max_node_capacity, 10);
        assert!(cfg.root_hint.is_none());
        assert!(!cfg.align);
        assert_eq!(cfg.validate(1, usize::MAX), Ok(()));
    }

    #[test]
    fn rejects_zero_dims_and_tiny_capacity() {
        assert!(matches!(
            IndexConfig::new(0).validate(1, usize::MAX),
            Err(IndexError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            IndexConfig::new(2)
                .with_max_node_capacity(1)
                .validate(1, usize::MAX),
            Err(IndexError::InvalidCapacity { capacity: 1 })
        ));
    }

    #[test]
    fn rejects_mismatched_hint() {
        let cfg = IndexConfig::new(3).with_root_hint(&[0.0, 0.0], 1.0);
        assert!(matches!(
            cfg.validate(1, usize::MAX),
            Err(IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }
}
