//! Bottom-up factorization
//!
//! General mode (LU): each internal node keeps the capacitance matrix of the
//! Woodbury identity for
//!
//! ```text
//! K = diag(K_L, K_R) + [U1 0; 0 U2] [0 V1^T; V2^T 0]
//! S = [I, V1^T K_R^-1 U2; V2^T K_L^-1 U1, I]
//! ```
//!
//! Symmetric positive-definite mode (Cholesky): each node is factored as
//! K = W W^T with
//!
//! ```text
//! W = diag(W_L, W_R) (I + Q (L_p - I) Q^T)
//! ```
//!
//! where Q R = [W_L^-1 U1, 0; 0, W_R^-1 V1] (thin QR, block by block) and
//! L_p L_p^T = [I, R_L R_R^T; R_R R_L^T, I] is the reduced system.

use super::node::{InternalFactor, InternalNode, LeafFactor, Node};
use super::solve::{accumulate_determinant, solve_node};
use super::symmetric::{FactorOp, apply_factor};
use super::{HodlrTree, TreeState};
use crate::dense::{DenseError, cholesky_factorize, lu_factorize, thin_qr};
use crate::error::{HodlrError, Result};
use crate::parallel::join;
use ndarray::{Array2, s};

impl HodlrTree {
    /// Factorize the assembled tree
    ///
    /// Uses Cholesky factors when the tree was assembled symmetric and
    /// positive definite, pivoted LU otherwise. Can only be called once; a
    /// failure leaves the tree in the [`TreeState::Failed`] state.
    pub fn factorize(&mut self) -> Result<()> {
        let sequencing = HodlrError::Sequencing {
            operation: "factorize",
            state: self.state,
        };
        if self.state != TreeState::Assembled {
            return Err(sequencing);
        }
        let Some(root) = self.root.as_mut() else {
            return Err(sequencing);
        };

        let spd = self.mode.is_spd();
        if let Err(err) = factorize_node(root, spd, self.state) {
            log::warn!("HODLR factorization failed: {}", err);
            self.state = TreeState::Failed;
            return Err(err);
        }
        self.state = TreeState::Factorized;

        if log::log_enabled!(log::Level::Info) {
            let (log_det, sign) = accumulate_determinant(root, self.state)?;
            log::info!(
                "Factorized HODLR tree ({}): log|det| = {:.6e}, sign {}",
                if spd { "Cholesky" } else { "LU" },
                log_det,
                sign
            );
        }
        Ok(())
    }
}

fn factorize_node(node: &mut Node, spd: bool, state: TreeState) -> Result<()> {
    match node {
        Node::Leaf(leaf) => {
            let factor = if spd {
                cholesky_factorize(&leaf.block).map(LeafFactor::Cholesky)
            } else {
                lu_factorize(&leaf.block).map(LeafFactor::Lu)
            };
            leaf.factor = Some(factor.map_err(|e| dense_error(e, leaf.level))?);
            Ok(())
        }
        Node::Internal(internal) => {
            let (left, right) = (&mut internal.left, &mut internal.right);
            let (left_result, right_result) = join(
                || factorize_node(left, spd, state),
                || factorize_node(right, spd, state),
            );
            left_result?;
            right_result?;

            let factor = if spd {
                symmetric_reduced_system(internal, state)?
            } else {
                woodbury_reduced_system(internal, state)?
            };
            internal.factor = Some(factor);
            Ok(())
        }
    }
}

fn woodbury_reduced_system(internal: &InternalNode, state: TreeState) -> Result<InternalFactor> {
    let (u2, v2) = internal.lower_factors();
    let mut left_basis = internal.upper.u.clone();
    let mut right_basis = u2.clone();
    {
        let (left_view, right_view) = (left_basis.view_mut(), right_basis.view_mut());
        let (l, r) = join(
            || solve_node(&internal.left, left_view, state),
            || solve_node(&internal.right, right_view, state),
        );
        l?;
        r?;
    }

    let r1 = left_basis.ncols();
    let r2 = right_basis.ncols();
    let mut capacitance = Array2::eye(r1 + r2);
    capacitance
        .slice_mut(s![..r1, r1..])
        .assign(&internal.upper.v.t().dot(&right_basis));
    capacitance
        .slice_mut(s![r1.., ..r1])
        .assign(&v2.t().dot(&left_basis));
    let reduced = lu_factorize(&capacitance).map_err(|e| dense_error(e, internal.level))?;

    log::debug!(
        "level {} node {}: Woodbury system of size {}",
        internal.level,
        internal.range,
        r1 + r2
    );
    Ok(InternalFactor::Woodbury {
        left_basis,
        right_basis,
        reduced,
    })
}

fn symmetric_reduced_system(internal: &InternalNode, state: TreeState) -> Result<InternalFactor> {
    let mut u_hat = internal.upper.u.clone();
    let mut v_hat = internal.upper.v.clone();
    {
        let (left_view, right_view) = (u_hat.view_mut(), v_hat.view_mut());
        let (l, r) = join(
            || apply_factor(&internal.left, left_view, FactorOp::Inverse, state),
            || apply_factor(&internal.right, right_view, FactorOp::Inverse, state),
        );
        l?;
        r?;
    }

    let (left_q, left_r) = thin_qr(&u_hat);
    let (right_q, right_r) = thin_qr(&v_hat);
    let (k1, k2) = (left_r.nrows(), right_r.nrows());

    let mut system = Array2::eye(k1 + k2);
    let coupling = left_r.dot(&right_r.t());
    system.slice_mut(s![..k1, k1..]).assign(&coupling);
    system.slice_mut(s![k1.., ..k1]).assign(&coupling.t());
    let reduced = cholesky_factorize(&system).map_err(|e| dense_error(e, internal.level))?;

    log::debug!(
        "level {} node {}: Cholesky system of size {}",
        internal.level,
        internal.range,
        k1 + k2
    );
    Ok(InternalFactor::Symmetric {
        left_q,
        right_q,
        reduced,
    })
}

/// Attach the tree level to a dense factorization failure
fn dense_error(err: DenseError, level: usize) -> HodlrError {
    match err {
        DenseError::NotPositiveDefinite { value, .. } => HodlrError::NonPositiveDefinite {
            level,
            pivot: value,
        },
        DenseError::SingularMatrix { .. } => HodlrError::Singular { level },
        DenseError::DimensionMismatch { expected, got } => {
            HodlrError::DimensionMismatch { expected, got }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HodlrConfig;
    use crate::kernel::{KernelMatrix, random_points};
    use approx::assert_relative_eq;

    fn kernel(n: usize, seed: u64) -> KernelMatrix<crate::kernel::PairKernel> {
        KernelMatrix::gaussian(random_points(n, 2, seed), 10.0)
    }

    #[test]
    fn test_factorize_transitions_state() {
        let k = kernel(128, 1);
        let mut tree = HodlrTree::new(128, HodlrConfig::new(2, 1e-10)).unwrap();
        tree.assemble(&k, true, false).unwrap();
        tree.factorize().unwrap();
        assert_eq!(tree.state(), TreeState::Factorized);
    }

    #[test]
    fn test_factorize_twice_is_sequencing_error() {
        let k = kernel(64, 2);
        let mut tree = HodlrTree::new(64, HodlrConfig::new(2, 1e-10)).unwrap();
        tree.assemble(&k, true, true).unwrap();
        tree.factorize().unwrap();
        let err = tree.factorize().unwrap_err();
        assert!(err.is_sequencing_error());
        assert_eq!(tree.state(), TreeState::Factorized);
    }

    #[test]
    fn test_factorize_before_assembly() {
        let mut tree = HodlrTree::new(64, HodlrConfig::new(2, 1e-10)).unwrap();
        assert!(tree.factorize().unwrap_err().is_sequencing_error());
        assert_eq!(tree.state(), TreeState::Empty);
    }

    #[test]
    fn test_indefinite_leaf_fails_cholesky() {
        let mut a = Array2::<f64>::eye(16);
        a[[3, 3]] = -1.0;
        let mut tree = HodlrTree::new(16, HodlrConfig::new(2, 1e-10)).unwrap();
        tree.assemble(&a, true, true).unwrap();
        let err = tree.factorize().unwrap_err();
        assert!(matches!(
            err,
            HodlrError::NonPositiveDefinite { level: 2, .. }
        ));
        assert_eq!(tree.state(), TreeState::Failed);
        assert!(tree.matmat_product(&Array2::zeros((16, 1))).is_err());
    }

    #[test]
    fn test_indefinite_coupling_fails_reduced_system() {
        // Positive leaves, but the 2x2 coupling makes the whole matrix indefinite
        let a = ndarray::array![[1.0, 2.0], [2.0, 1.0]];
        let mut tree = HodlrTree::new(2, HodlrConfig::new(1, 1e-12)).unwrap();
        tree.assemble(&a, true, true).unwrap();
        let err = tree.factorize().unwrap_err();
        assert!(matches!(
            err,
            HodlrError::NonPositiveDefinite { level: 0, .. }
        ));
    }

    #[test]
    fn test_singular_leaf() {
        let mut a = Array2::<f64>::eye(8);
        a[[5, 5]] = 0.0;
        let mut tree = HodlrTree::new(8, HodlrConfig::new(1, 1e-10)).unwrap();
        tree.assemble(&a, false, false).unwrap();
        assert!(matches!(
            tree.factorize().unwrap_err(),
            HodlrError::Singular { level: 1 }
        ));
    }

    #[test]
    fn test_symmetric_factor_blocks_are_orthonormal() {
        let k = kernel(128, 3);
        let mut tree = HodlrTree::new(128, HodlrConfig::new(2, 1e-10)).unwrap();
        tree.assemble(&k, true, true).unwrap();
        tree.factorize().unwrap();

        let Some(root) = tree.root.as_ref() else {
            panic!("factorized tree has a root");
        };
        root.visit(&mut |node| {
            if let Node::Internal(internal) = node {
                let Some(InternalFactor::Symmetric { left_q, .. }) = &internal.factor else {
                    panic!("SPD tree stores symmetric factors");
                };
                let gram = left_q.t().dot(left_q);
                for i in 0..gram.nrows() {
                    for j in 0..gram.ncols() {
                        let expected = if i == j { 1.0 } else { 0.0 };
                        assert_relative_eq!(gram[[i, j]], expected, epsilon = 1e-10);
                    }
                }
            }
        });
    }
}
