//! Fast direct solver for HODLR matrices
//!
//! A hierarchical off-diagonal low-rank (HODLR) matrix is split recursively
//! into halves; at every level the two off-diagonal blocks are stored as thin
//! factor pairs U V^T. Kernel matrices over clustered point sets have this
//! structure, which brings products, solves and determinants down from
//! O(N^2)-O(N^3) to near-linear cost.
//!
//! # Features
//!
//! - **Assembly**: adaptive cross approximation of off-diagonal blocks, no
//!   dense read outside the leaves
//! - **Products**: fast `A X` on the compressed tree
//! - **Direct solver**: nested Woodbury (LU) or symmetric Cholesky
//!   factorization, solves and log-determinants
//! - **Symmetric factor**: `A ≈ W W^T` for symmetric positive-definite
//!   matrices, applied without forming W
//! - **Kernels and reordering**: point-set kernel matrices with k-d ordering
//!
//! # Example
//!
//! ```
//! use math_audio_hodlr::{HodlrConfig, HodlrTree, KernelMatrix, random_points};
//! use ndarray::Array2;
//!
//! let n = 512;
//! let kernel = KernelMatrix::gaussian(random_points(n, 2, 42), 10.0);
//! let config = HodlrConfig::for_leaf_size(n, 32, 1e-10);
//!
//! let mut tree = HodlrTree::new(n, config)?;
//! tree.assemble(&kernel, true, true)?;
//! tree.factorize()?;
//!
//! let b = Array2::<f64>::ones((n, 1));
//! let x = tree.solve(&b)?;
//! let log_det = tree.log_determinant()?;
//! assert!(log_det > 0.0);
//! # assert_eq!(x.nrows(), n);
//! # Ok::<(), math_audio_hodlr::HodlrError>(())
//! ```

pub mod blas_helpers;
pub mod compression;
pub mod config;
pub mod dense;
pub mod error;
pub mod kernel;
pub mod parallel;
pub mod reorder;
pub mod traits;
pub mod tree;

// Re-export main types
pub use config::{HodlrConfig, TreeMode, levels_for_leaf_size};
pub use error::{HodlrError, Result};
pub use traits::EntrySource;
pub use tree::{HodlrTree, IndexRange, TreeState, TreeStats};

// Re-export compression
pub use compression::{AcaCompressor, LowRankBlock, LowRankCompressor};

// Re-export kernels and reordering
pub use kernel::{KernelMatrix, PairKernel, gaussian, random_points};
pub use reorder::{inverse_permutation, kd_tree_order, permute_rows};

// Re-export dense primitives
pub use dense::{DenseError, LuFactorization, lu_solve};
