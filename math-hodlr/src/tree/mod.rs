//! HODLR tree
//!
//! A [`HodlrTree`] partitions [0, N) by repeated bisection. Internal nodes
//! store the two off-diagonal blocks between their children in low-rank
//! form, leaves store their diagonal block densely.
//!
//! Lifecycle:
//!
//! ```text
//! Empty --assemble--> Assembled --factorize--> Factorized
//!   \                     \
//!    `-- (failure) -------`--> Failed
//! ```
//!
//! - [`HodlrTree::matmat_product`] works on Assembled and Factorized trees
//! - [`HodlrTree::solve`] and [`HodlrTree::log_determinant`] need Factorized
//! - the symmetric factor operations additionally need a tree assembled in
//!   symmetric positive-definite mode
//!
//! # Example
//!
//! ```
//! use math_audio_hodlr::{HodlrConfig, HodlrTree, KernelMatrix, random_points};
//! use ndarray::Array2;
//!
//! let kernel = KernelMatrix::gaussian(random_points(256, 2, 0), 10.0);
//! let config = HodlrConfig::for_leaf_size(256, 32, 1e-10);
//! let mut tree = HodlrTree::new(256, config).unwrap();
//! tree.assemble(&kernel, true, false).unwrap();
//!
//! let x = Array2::<f64>::ones((256, 1));
//! let b = tree.matmat_product(&x).unwrap();
//! tree.factorize().unwrap();
//! let y = tree.solve(&b).unwrap();
//! assert!((&y - &x).iter().all(|v| v.abs() < 1e-8));
//! ```

mod apply;
mod build;
mod factorize;
mod node;
mod range;
mod solve;
mod symmetric;

pub use range::IndexRange;

use crate::config::{HodlrConfig, TreeMode};
use crate::error::{HodlrError, Result};
use crate::reorder::{inverse_permutation, is_permutation, permute_rows};
use ndarray::Array2;
use node::Node;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`HodlrTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TreeState {
    /// Configured, nothing assembled yet
    Empty,
    /// Off-diagonal blocks compressed, leaves materialized
    Assembled,
    /// Leaf and reduced-system factors computed
    Factorized,
    /// Assembly or factorization failed; the tree must be rebuilt
    Failed,
}

impl std::fmt::Display for TreeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TreeState::Empty => "empty",
            TreeState::Assembled => "assembled",
            TreeState::Factorized => "factorized",
            TreeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Storage and rank summary of an assembled tree
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TreeStats {
    /// Matrix dimension
    pub size: usize,
    /// Bisection levels below the root
    pub levels: usize,
    /// Number of leaves (2^levels)
    pub leaves: usize,
    /// Number of stored low-rank blocks
    pub low_rank_blocks: usize,
    /// Largest rank over all low-rank blocks
    pub max_rank: usize,
    /// Mean rank over all low-rank blocks
    pub mean_rank: f64,
    /// Scalars stored in leaves and low-rank factors
    pub stored_entries: usize,
}

impl TreeStats {
    /// Stored entries relative to a dense N x N matrix
    pub fn compression_ratio(&self) -> f64 {
        self.stored_entries as f64 / (self.size as f64 * self.size as f64)
    }
}

/// Hierarchical off-diagonal low-rank approximation of an N x N matrix
#[derive(Debug, Clone)]
pub struct HodlrTree {
    n: usize,
    config: HodlrConfig,
    mode: TreeMode,
    root: Option<Node>,
    permutation: Option<Vec<usize>>,
    state: TreeState,
}

impl HodlrTree {
    /// Create an empty tree for an N x N matrix
    ///
    /// Fails with [`HodlrError::Construction`] when the configuration does not
    /// fit N, e.g. when the depth would leave empty leaves.
    pub fn new(n: usize, config: HodlrConfig) -> Result<Self> {
        config.validate(n)?;
        Ok(Self {
            n,
            config,
            mode: TreeMode::default(),
            root: None,
            permutation: None,
            state: TreeState::Empty,
        })
    }

    /// Record the reordering that produced the tree ordering
    ///
    /// `permutation[k]` is the caller's index of tree row k, as returned by
    /// [`crate::kd_tree_order`] or [`crate::KernelMatrix::permutation`].
    pub fn with_permutation(mut self, permutation: Vec<usize>) -> Result<Self> {
        if !is_permutation(&permutation, self.n) {
            return Err(HodlrError::construction(format!(
                "not a permutation of 0..{}",
                self.n
            )));
        }
        self.permutation = Some(permutation);
        Ok(self)
    }

    /// Matrix dimension N
    pub fn size(&self) -> usize {
        self.n
    }

    /// Configuration the tree was created with
    pub fn config(&self) -> &HodlrConfig {
        &self.config
    }

    /// Mode flags fixed at assembly
    pub fn mode(&self) -> TreeMode {
        self.mode
    }

    /// Current lifecycle state
    pub fn state(&self) -> TreeState {
        self.state
    }

    /// Recorded reordering, if any
    pub fn permutation(&self) -> Option<&[usize]> {
        self.permutation.as_deref()
    }

    /// Move caller-ordered rows into tree order
    pub fn to_tree_order(&self, b: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_rows(b.nrows())?;
        Ok(match &self.permutation {
            Some(order) => permute_rows(b, order),
            None => b.clone(),
        })
    }

    /// Move tree-ordered rows back into caller order
    pub fn to_caller_order(&self, b: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_rows(b.nrows())?;
        Ok(match &self.permutation {
            Some(order) => permute_rows(b, &inverse_permutation(order)),
            None => b.clone(),
        })
    }

    /// Leaf index ranges, left to right
    pub fn leaf_ranges(&self) -> Result<Vec<IndexRange>> {
        let root = self.require("leaf_ranges", &[TreeState::Assembled, TreeState::Factorized])?;
        let mut ranges = Vec::with_capacity(1 << self.config.levels);
        root.visit(&mut |node| {
            if let Node::Leaf(leaf) = node {
                ranges.push(leaf.range);
            }
        });
        Ok(ranges)
    }

    /// Rank and storage summary
    pub fn stats(&self) -> Result<TreeStats> {
        let root = self.require("stats", &[TreeState::Assembled, TreeState::Factorized])?;
        Ok(collect_stats(root, self.n, self.config.levels))
    }

    /// Root node if the tree is in one of the `allowed` states
    fn require(&self, operation: &'static str, allowed: &[TreeState]) -> Result<&Node> {
        let sequencing = HodlrError::Sequencing {
            operation,
            state: self.state,
        };
        if !allowed.contains(&self.state) {
            return Err(sequencing);
        }
        self.root.as_ref().ok_or(sequencing)
    }

    fn check_rows(&self, rows: usize) -> Result<()> {
        if rows != self.n {
            return Err(HodlrError::DimensionMismatch {
                expected: self.n,
                got: rows,
            });
        }
        Ok(())
    }
}

fn collect_stats(root: &Node, size: usize, levels: usize) -> TreeStats {
    let mut leaves = 0;
    let mut ranks = Vec::new();
    let mut stored_entries = 0;
    root.visit(&mut |node| match node {
        Node::Leaf(leaf) => {
            leaves += 1;
            stored_entries += leaf.block.len();
        }
        Node::Internal(internal) => {
            ranks.push(internal.upper.rank());
            stored_entries += internal.upper.stored_entries();
            if let Some(lower) = &internal.lower {
                ranks.push(lower.rank());
                stored_entries += lower.stored_entries();
            }
        }
    });
    let max_rank = ranks.iter().copied().max().unwrap_or(0);
    let mean_rank = if ranks.is_empty() {
        0.0
    } else {
        ranks.iter().sum::<usize>() as f64 / ranks.len() as f64
    };
    TreeStats {
        size,
        levels,
        leaves,
        low_rank_blocks: ranks.len(),
        max_rank,
        mean_rank,
        stored_entries,
    }
}
