//! Solves and determinants with the factorized tree

use super::node::{InternalFactor, LeafFactor, Node};
use super::symmetric::{FactorOp, apply_factor};
use super::{HodlrTree, TreeState};
use crate::error::{HodlrError, Result};
use crate::parallel::join;
use ndarray::{Array1, Array2, ArrayViewMut2, Axis, s};

impl HodlrTree {
    /// X ≈ A^-1 B for a block of right-hand sides
    pub fn solve(&self, b: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.require("solve", &[TreeState::Factorized])?;
        self.check_rows(b.nrows())?;

        let mut x = b.clone();
        if self.mode.is_spd() {
            // A^-1 = W^-T W^-1
            apply_factor(root, x.view_mut(), FactorOp::Inverse, self.state)?;
            apply_factor(root, x.view_mut(), FactorOp::InverseTranspose, self.state)?;
        } else {
            solve_node(root, x.view_mut(), self.state)?;
        }
        Ok(x)
    }

    /// x ≈ A^-1 b for a single vector
    pub fn solve_vec(&self, b: &Array1<f64>) -> Result<Array1<f64>> {
        let x = self.solve(&b.clone().insert_axis(Axis(1)))?;
        Ok(x.remove_axis(Axis(1)))
    }

    /// ln |det A|, summed over leaf and reduced-system factors
    pub fn log_determinant(&self) -> Result<f64> {
        let root = self.require("log_determinant", &[TreeState::Factorized])?;
        Ok(accumulate_determinant(root, self.state)?.0)
    }

    /// Sign of det A (+1 or -1)
    pub fn determinant_sign(&self) -> Result<f64> {
        let root = self.require("determinant_sign", &[TreeState::Factorized])?;
        Ok(accumulate_determinant(root, self.state)?.1)
    }
}

/// (ln |det|, sign) of the matrix a factorized node represents
pub(super) fn accumulate_determinant(root: &Node, state: TreeState) -> Result<(f64, f64)> {
    let mut log_det = 0.0;
    let mut sign = 1.0;
    let mut missing = None;
    root.visit(&mut |node| match node {
        Node::Leaf(leaf) => match &leaf.factor {
            Some(factor) => {
                log_det += factor.log_abs_det();
                sign *= factor.det_sign();
            }
            None => missing = Some(leaf.level),
        },
        Node::Internal(internal) => match &internal.factor {
            Some(factor) => {
                log_det += factor.log_abs_det();
                sign *= factor.det_sign();
            }
            None => missing = Some(internal.level),
        },
    });
    match missing {
        Some(level) => Err(not_factorized(level, state)),
        None => Ok((log_det, sign)),
    }
}

/// Overwrite `b` (the node's rows) with K^-1 b using LU leaves and Woodbury
/// corrections
///
/// Cholesky-factorized trees solve through [`apply_factor`] instead.
pub(super) fn solve_node(node: &Node, mut b: ArrayViewMut2<f64>, state: TreeState) -> Result<()> {
    match node {
        Node::Leaf(leaf) => match &leaf.factor {
            Some(LeafFactor::Lu(lu)) => {
                lu.solve_in_place(&mut b);
                Ok(())
            }
            _ => Err(not_factorized(leaf.level, state)),
        },
        Node::Internal(internal) => {
            let Some(InternalFactor::Woodbury {
                left_basis,
                right_basis,
                reduced,
            }) = &internal.factor
            else {
                return Err(not_factorized(internal.level, state));
            };
            let mid = internal.split();

            // y = diag(K_L, K_R)^-1 b
            {
                let (b_left, b_right) = b.view_mut().split_at(Axis(0), mid);
                let (l, r) = join(
                    || solve_node(&internal.left, b_left, state),
                    || solve_node(&internal.right, b_right, state),
                );
                l?;
                r?;
            }

            // z = S^-1 [V1^T y_R; V2^T y_L]
            let r1 = left_basis.ncols();
            let (_, v2) = internal.lower_factors();
            let mut z = Array2::zeros((r1 + right_basis.ncols(), b.ncols()));
            {
                let (y_left, y_right) = b.view().split_at(Axis(0), mid);
                z.slice_mut(s![..r1, ..])
                    .assign(&internal.upper.v.t().dot(&y_right));
                z.slice_mut(s![r1.., ..]).assign(&v2.t().dot(&y_left));
            }
            reduced.solve_in_place(&mut z.view_mut());

            // x = y - diag(K_L^-1 U1, K_R^-1 U2) z
            let (mut x_left, mut x_right) = b.split_at(Axis(0), mid);
            x_left -= &left_basis.dot(&z.slice(s![..r1, ..]));
            x_right -= &right_basis.dot(&z.slice(s![r1.., ..]));
            Ok(())
        }
    }
}

/// A node without a factor of the kind the operation needs
pub(super) fn not_factorized(level: usize, state: TreeState) -> HodlrError {
    log::debug!("node at level {} has no matching factor", level);
    HodlrError::Sequencing {
        operation: "factor application",
        state,
    }
}
