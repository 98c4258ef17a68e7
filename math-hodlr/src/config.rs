//! Tree configuration
//!
//! A [`HodlrConfig`] fixes the recursion depth, the relative compression
//! tolerance and an optional rank ceiling. Together with the [`TreeMode`]
//! chosen at assembly it is threaded, read-only, through every recursive
//! build / factorize / solve call.

use crate::error::{HodlrError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// HODLR tree configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HodlrConfig {
    /// Number of bisection levels below the root (0 = a single dense leaf)
    pub levels: usize,
    /// Relative tolerance for every off-diagonal low-rank block
    pub tolerance: f64,
    /// Optional rank ceiling for compressed blocks
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_rank: Option<usize>,
}

impl Default for HodlrConfig {
    fn default() -> Self {
        Self {
            levels: 4,
            tolerance: 1e-12,
            max_rank: None,
        }
    }
}

impl HodlrConfig {
    /// Create a config with an explicit depth and tolerance
    pub fn new(levels: usize, tolerance: f64) -> Self {
        Self {
            levels,
            tolerance,
            max_rank: None,
        }
    }

    /// Pick the depth so that leaves hold roughly `leaf_size` indices
    ///
    /// Uses `floor(log2(n / leaf_size))` levels, so leaf blocks end up between
    /// `leaf_size` and `2 * leaf_size` (plus one for uneven splits).
    pub fn for_leaf_size(n: usize, leaf_size: usize, tolerance: f64) -> Self {
        Self::new(levels_for_leaf_size(n, leaf_size), tolerance)
    }

    /// Set the tolerance to `10^-exponent`
    pub fn with_tolerance_exponent(self, exponent: i32) -> Self {
        Self {
            tolerance: 10f64.powi(-exponent),
            ..self
        }
    }

    /// Cap the rank of every compressed block
    pub fn with_max_rank(self, max_rank: usize) -> Self {
        Self {
            max_rank: Some(max_rank),
            ..self
        }
    }

    /// Check the configuration against a matrix of size `n`
    pub fn validate(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(HodlrError::construction("matrix size must be positive"));
        }
        if self.levels >= usize::BITS as usize || (n >> self.levels) == 0 {
            return Err(HodlrError::construction(format!(
                "{} levels leave empty leaves for n = {}",
                self.levels, n
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 || self.tolerance >= 1.0 {
            return Err(HodlrError::construction(format!(
                "tolerance must lie in (0, 1), got {}",
                self.tolerance
            )));
        }
        if self.max_rank == Some(0) {
            return Err(HodlrError::construction("max_rank must be at least 1"));
        }
        Ok(())
    }
}

/// Number of levels giving leaves of about `leaf_size` indices
pub fn levels_for_leaf_size(n: usize, leaf_size: usize) -> usize {
    if leaf_size == 0 {
        return 0;
    }
    let mut levels = 0;
    while levels + 1 < usize::BITS as usize && (n >> (levels + 1)) >= leaf_size {
        levels += 1;
    }
    levels
}

/// Structural flags fixed at assembly time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TreeMode {
    /// Lower coupling blocks are transposes of the upper ones
    pub symmetric: bool,
    /// Factorize with Cholesky and expose the symmetric factor
    pub positive_definite: bool,
}

impl TreeMode {
    /// Create a mode, rejecting positive-definite without symmetric
    pub fn new(symmetric: bool, positive_definite: bool) -> Result<Self> {
        if positive_definite && !symmetric {
            return Err(HodlrError::construction(
                "positive-definite mode requires symmetric mode",
            ));
        }
        Ok(Self {
            symmetric,
            positive_definite,
        })
    }

    /// Whether the Cholesky / symmetric-factor path is used
    pub fn is_spd(&self) -> bool {
        self.symmetric && self.positive_definite
    }
}
