//! Symmetric factor W with A ≈ W W^T
//!
//! Only trees assembled in symmetric positive-definite mode carry the
//! Cholesky-based factors this module composes. W is never formed except by
//! [`HodlrTree::symmetric_factor`].

use super::node::{InternalFactor, LeafFactor, Node};
use super::solve::not_factorized;
use super::{HodlrTree, TreeState};
use crate::dense::CholeskyFactorization;
use crate::error::{HodlrError, Result};
use crate::parallel::join;
use ndarray::{Array2, ArrayViewMut2, Axis, s};

/// Which of W, W^T, W^-1, W^-T to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FactorOp {
    Forward,
    Transpose,
    Inverse,
    InverseTranspose,
}

impl FactorOp {
    /// W^T and W^-1 act on the children before the node's own term
    fn children_first(self) -> bool {
        matches!(self, FactorOp::Transpose | FactorOp::Inverse)
    }
}

impl HodlrTree {
    /// W y
    pub fn symmetric_factor_product(&self, y: &Array2<f64>) -> Result<Array2<f64>> {
        self.apply_symmetric("symmetric_factor_product", y, FactorOp::Forward)
    }

    /// W^T x
    pub fn symmetric_factor_transpose_product(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.apply_symmetric(
            "symmetric_factor_transpose_product",
            x,
            FactorOp::Transpose,
        )
    }

    /// W^-1 b
    pub fn symmetric_factor_solve(&self, b: &Array2<f64>) -> Result<Array2<f64>> {
        self.apply_symmetric("symmetric_factor_solve", b, FactorOp::Inverse)
    }

    /// W^-T b
    pub fn symmetric_factor_transpose_solve(&self, b: &Array2<f64>) -> Result<Array2<f64>> {
        self.apply_symmetric(
            "symmetric_factor_transpose_solve",
            b,
            FactorOp::InverseTranspose,
        )
    }

    /// Dense W, O(N^2) memory. Meant for validation.
    pub fn symmetric_factor(&self) -> Result<Array2<f64>> {
        self.apply_symmetric(
            "symmetric_factor",
            &Array2::eye(self.n),
            FactorOp::Forward,
        )
    }

    fn apply_symmetric(
        &self,
        operation: &'static str,
        b: &Array2<f64>,
        op: FactorOp,
    ) -> Result<Array2<f64>> {
        if !self.mode.is_spd() {
            return Err(HodlrError::Sequencing {
                operation,
                state: self.state,
            });
        }
        let root = self.require(operation, &[TreeState::Factorized])?;
        self.check_rows(b.nrows())?;
        let mut out = b.clone();
        apply_factor(root, out.view_mut(), op, self.state)?;
        Ok(out)
    }
}

/// Overwrite `b` (the node's rows) with op(W) b
pub(super) fn apply_factor(
    node: &Node,
    mut b: ArrayViewMut2<f64>,
    op: FactorOp,
    state: TreeState,
) -> Result<()> {
    match node {
        Node::Leaf(leaf) => {
            let Some(LeafFactor::Cholesky(chol)) = &leaf.factor else {
                return Err(not_factorized(leaf.level, state));
            };
            match op {
                FactorOp::Forward => chol.mul_lower_in_place(&mut b),
                FactorOp::Transpose => chol.mul_upper_in_place(&mut b),
                FactorOp::Inverse => chol.solve_lower_in_place(&mut b),
                FactorOp::InverseTranspose => chol.solve_upper_in_place(&mut b),
            }
            Ok(())
        }
        Node::Internal(internal) => {
            let Some(InternalFactor::Symmetric {
                left_q,
                right_q,
                reduced,
            }) = &internal.factor
            else {
                return Err(not_factorized(internal.level, state));
            };
            let middle = Middle {
                left_q,
                right_q,
                reduced,
                mid: internal.split(),
            };

            if !op.children_first() {
                middle.apply(b.view_mut(), op);
            }
            {
                let (b_left, b_right) = b.view_mut().split_at(Axis(0), middle.mid);
                let (l, r) = join(
                    || apply_factor(&internal.left, b_left, op, state),
                    || apply_factor(&internal.right, b_right, op, state),
                );
                l?;
                r?;
            }
            if op.children_first() {
                middle.apply(b, op);
            }
            Ok(())
        }
    }
}

/// The node's own term I + Q (L_p - I) Q^T
struct Middle<'a> {
    left_q: &'a Array2<f64>,
    right_q: &'a Array2<f64>,
    reduced: &'a CholeskyFactorization,
    mid: usize,
}

impl Middle<'_> {
    /// b += Q (op(L_p) - I) Q^T b
    fn apply(&self, b: ArrayViewMut2<f64>, op: FactorOp) {
        let (left_q, right_q, reduced) = (self.left_q, self.right_q, self.reduced);
        let k1 = left_q.ncols();
        let (mut b_left, mut b_right) = b.split_at(Axis(0), self.mid);

        let mut projected = Array2::zeros((k1 + right_q.ncols(), b_left.ncols()));
        projected
            .slice_mut(s![..k1, ..])
            .assign(&left_q.t().dot(&b_left));
        projected
            .slice_mut(s![k1.., ..])
            .assign(&right_q.t().dot(&b_right));

        let mut t = projected.clone();
        {
            let mut view = t.view_mut();
            match op {
                FactorOp::Forward => reduced.mul_lower_in_place(&mut view),
                FactorOp::Transpose => reduced.mul_upper_in_place(&mut view),
                FactorOp::Inverse => reduced.solve_lower_in_place(&mut view),
                FactorOp::InverseTranspose => reduced.solve_upper_in_place(&mut view),
            }
        }
        t -= &projected;

        b_left += &left_q.dot(&t.slice(s![..k1, ..]));
        b_right += &right_q.dot(&t.slice(s![k1.., ..]));
    }
}
