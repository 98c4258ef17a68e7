//! Error types for HODLR tree operations.
//!
//! Every failure is a deterministic numerical or usage condition: retrying the
//! same call with the same parameters reproduces it. Callers recover by
//! building a fresh tree with adjusted tolerance, depth or reordering.

use crate::tree::TreeState;
use thiserror::Error;

/// Errors raised while building, factorizing or using a HODLR tree.
#[derive(Debug, Error)]
pub enum HodlrError {
    /// Invalid size / depth / tolerance combination.
    #[error("invalid tree construction: {reason}")]
    Construction {
        /// What was wrong with the requested configuration
        reason: String,
    },

    /// An off-diagonal block could not be compressed within tolerance.
    #[error(
        "{rows}x{cols} block not compressible to tolerance {tolerance:e} within rank {max_rank}"
    )]
    ToleranceUnattainable {
        /// Rows of the offending block
        rows: usize,
        /// Columns of the offending block
        cols: usize,
        /// Rank ceiling that was reached
        max_rank: usize,
        /// Requested relative tolerance
        tolerance: f64,
    },

    /// A Cholesky pivot was not strictly positive.
    #[error("matrix is not positive definite: pivot {pivot:e} at tree level {level}")]
    NonPositiveDefinite {
        /// Tree level of the leaf or reduced system that failed
        level: usize,
        /// The offending pivot
        pivot: f64,
    },

    /// An operation was invoked in a lifecycle state that does not support it.
    #[error("`{operation}` is not available on a tree in the {state} state")]
    Sequencing {
        /// Name of the rejected operation
        operation: &'static str,
        /// Lifecycle state of the tree at the time of the call
        state: TreeState,
    },

    /// An LU pivot vanished in a leaf block or reduced system.
    #[error("singular block encountered at tree level {level}")]
    Singular {
        /// Tree level of the singular block
        level: usize,
    },

    /// A dense operand has the wrong number of rows.
    #[error("dimension mismatch: expected {expected} rows, got {got}")]
    DimensionMismatch {
        /// Rows required by the tree
        expected: usize,
        /// Rows supplied by the caller
        got: usize,
    },
}

/// A specialized `Result` type for HODLR operations.
pub type Result<T> = std::result::Result<T, HodlrError>;

impl HodlrError {
    pub(crate) fn construction(reason: impl Into<String>) -> Self {
        HodlrError::Construction {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the tree configuration was rejected.
    pub fn is_construction_error(&self) -> bool {
        matches!(self, HodlrError::Construction { .. })
    }

    /// Returns `true` if compression failed to reach the tolerance.
    pub fn is_tolerance_error(&self) -> bool {
        matches!(self, HodlrError::ToleranceUnattainable { .. })
    }

    /// Returns `true` if a Cholesky factorization broke down.
    pub fn is_non_positive_definite(&self) -> bool {
        matches!(self, HodlrError::NonPositiveDefinite { .. })
    }

    /// Returns `true` if an operation was called out of lifecycle order.
    pub fn is_sequencing_error(&self) -> bool {
        matches!(self, HodlrError::Sequencing { .. })
    }
}
