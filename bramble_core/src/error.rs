// Copyright 2025 the Bramble Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type shared by every Bramble index.

/// Errors reported by index constructors and entry points.
///
/// Construction-time validation covers dimensionality, key width, and node
/// capacity; once a tree is built, its operations are total except for
/// dimension mismatches, which are caught at the entry point of the
/// offending call. A failed precondition never leaves a tree partially
/// mutated.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// The requested dimensionality cannot be served by this index.
    #[error("invalid dimensionality {dims} (supported: {min}..={max})")]
    InvalidDimensions {
        /// Requested dimensionality.
        dims: usize,
        /// Smallest supported dimensionality.
        min: usize,
        /// Largest supported dimensionality.
        max: usize,
    },

    /// The per-dimension key width is outside `1..=64` bits.
    #[error("invalid key width {width} (supported: 1..=64 bits)")]
    InvalidWidth {
        /// Requested width in bits.
        width: usize,
    },

    /// The node capacity is too small to keep the tree well formed.
    #[error("invalid node capacity {capacity} (minimum: 2)")]
    InvalidCapacity {
        /// Requested capacity.
        capacity: usize,
    },

    /// A key passed to an operation has the wrong number of dimensions.
    #[error("dimension mismatch: index holds {expected}-dimensional keys, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the index was created with.
        expected: usize,
        /// Dimensionality of the offending key.
        actual: usize,
    },

    /// No index implementation is registered under the given name.
    #[error("unknown index implementation {0:?}")]
    UnknownIndex(String),

    /// The operation is not supported by this index or iterator.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

#[cfg(test)]
mod tests {
    use super::IndexError;

    #[test]
    fn messages_name_the_offending_value() {
        let e = IndexError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert!(e.to_string().contains("3-dimensional"));
        let e = IndexError::UnknownIndex("voronoi".into());
        assert!(e.to_string().contains("voronoi"));
    }
}
