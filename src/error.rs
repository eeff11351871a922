//! Error types for k-nearest-neighbor computations.
//!
//! Every configuration problem is reported at construction time. The only
//! error that can surface while a strategy runs is [`KnnError::Invariant`],
//! which means the partition scheduler's locking protocol itself is broken.

use thiserror::Error;

/// Errors produced while building point sets, indexes, or schedules.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum KnnError {
    /// A parameter is out of its legal range (k >= n, zero partitions, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A coordinate vector does not have the point set's dimension.
    #[error("dimension mismatch: expected {expected} coordinates, got {actual}")]
    DimensionMismatch {
        /// Dimension of the point set
        expected: usize,
        /// Length of the offending coordinate vector
        actual: usize,
    },

    /// A point id outside `0..len`.
    #[error("point {id} out of range for a set of {len} points")]
    PointOutOfRange {
        /// Requested id
        id: usize,
        /// Number of points in the set
        len: usize,
    },

    /// Internal consistency fault in the task scheduler. Not recoverable.
    #[error("scheduler invariant violated: {0}")]
    Invariant(String),
}

/// Result alias for fallible operations of this crate
pub type Result<T> = std::result::Result<T, KnnError>;
