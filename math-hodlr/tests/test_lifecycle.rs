//! Lifecycle and Error Tests
//!
//! Checks that every operation is rejected outside the states it needs, and
//! that configuration and compression failures surface as typed errors.

use math_audio_hodlr::dense::thin_qr;
use math_audio_hodlr::{
    AcaCompressor, EntrySource, HodlrConfig, HodlrError, HodlrTree, IndexRange, KernelMatrix,
    LowRankBlock, LowRankCompressor, TreeMode, TreeState, random_points,
};
use ndarray::Array2;

fn kernel(n: usize) -> KernelMatrix<math_audio_hodlr::PairKernel> {
    KernelMatrix::gaussian(random_points(n, 2, 77), 10.0)
}

/// Exact compressor: thin QR of the dense block
struct DenseQrCompressor;

impl LowRankCompressor for DenseQrCompressor {
    fn compress<S: EntrySource + ?Sized>(
        &self,
        source: &S,
        rows: IndexRange,
        cols: IndexRange,
        _tolerance: f64,
    ) -> math_audio_hodlr::Result<LowRankBlock> {
        let block = source.block(rows.start, cols.start, rows.len, cols.len);
        if rows.len >= cols.len {
            // A = Q R
            let (q, r) = thin_qr(&block);
            Ok(LowRankBlock {
                u: q,
                v: r.t().to_owned(),
            })
        } else {
            // A^T = Q R, so A = R^T Q^T
            let (q, r) = thin_qr(&block.t().to_owned());
            Ok(LowRankBlock {
                u: r.t().to_owned(),
                v: q,
            })
        }
    }
}

#[test]
fn test_full_lifecycle_states() {
    let k = kernel(128);
    let mut tree = HodlrTree::new(128, HodlrConfig::new(2, 1e-10)).unwrap();
    assert_eq!(tree.state(), TreeState::Empty);

    tree.assemble(&k, true, true).unwrap();
    assert_eq!(tree.state(), TreeState::Assembled);
    assert!(tree.mode().is_spd());

    tree.factorize().unwrap();
    assert_eq!(tree.state(), TreeState::Factorized);
}

#[test]
fn test_operations_before_assembly() {
    let tree = HodlrTree::new(64, HodlrConfig::new(2, 1e-10)).unwrap();
    let b = Array2::zeros((64, 1));
    assert!(tree.matmat_product(&b).unwrap_err().is_sequencing_error());
    assert!(tree.solve(&b).unwrap_err().is_sequencing_error());
    assert!(tree.log_determinant().unwrap_err().is_sequencing_error());
    assert!(tree.symmetric_factor().unwrap_err().is_sequencing_error());
}

#[test]
fn test_operations_before_factorization() {
    let k = kernel(64);
    let mut tree = HodlrTree::new(64, HodlrConfig::new(2, 1e-10)).unwrap();
    tree.assemble(&k, true, true).unwrap();
    let b = Array2::zeros((64, 1));

    assert!(tree.matmat_product(&b).is_ok());
    let err = tree.solve(&b).unwrap_err();
    assert!(matches!(
        err,
        HodlrError::Sequencing {
            operation: "solve",
            state: TreeState::Assembled
        }
    ));
    assert!(tree.determinant_sign().unwrap_err().is_sequencing_error());
    assert!(tree.symmetric_factor_product(&b).unwrap_err().is_sequencing_error());
}

#[test]
fn test_invalid_depth_is_construction_error() {
    // 2^6 = 64 leaves for 40 indices
    let err = HodlrTree::new(40, HodlrConfig::new(6, 1e-10)).unwrap_err();
    assert!(err.is_construction_error());
}

#[test]
fn test_invalid_tolerance_is_construction_error() {
    assert!(HodlrTree::new(64, HodlrConfig::new(2, -1.0)).unwrap_err().is_construction_error());
    assert!(HodlrTree::new(64, HodlrConfig::new(2, 2.0)).unwrap_err().is_construction_error());
}

#[test]
fn test_positive_definite_without_symmetric() {
    assert!(TreeMode::new(false, true).unwrap_err().is_construction_error());

    let k = kernel(64);
    let mut tree = HodlrTree::new(64, HodlrConfig::new(2, 1e-10)).unwrap();
    assert!(tree.assemble(&k, false, true).unwrap_err().is_construction_error());
    assert_eq!(tree.state(), TreeState::Failed);
}

#[test]
fn test_rank_ceiling_makes_tolerance_unattainable() {
    let k = kernel(256);
    let config = HodlrConfig::new(2, 1e-12).with_max_rank(1);
    let mut tree = HodlrTree::new(256, config).unwrap();
    let err = tree.assemble(&k, true, false).unwrap_err();
    assert!(err.is_tolerance_error(), "{err}");

    // A failed tree stays unusable
    assert_eq!(tree.state(), TreeState::Failed);
    assert!(tree.assemble(&k, true, false).unwrap_err().is_sequencing_error());
    assert!(tree.factorize().unwrap_err().is_sequencing_error());
    assert!(tree.matmat_product(&Array2::zeros((256, 1))).unwrap_err().is_sequencing_error());
}

#[test]
fn test_rank_ceiling_large_enough() {
    let k = kernel(256);
    let config = HodlrConfig::new(2, 1e-6).with_max_rank(64);
    let mut tree = HodlrTree::new(256, config).unwrap();
    tree.assemble(&k, true, false).unwrap();
    assert!(tree.stats().unwrap().max_rank <= 64);
}

#[test]
fn test_custom_compressor() {
    let k = kernel(96);
    let mut tree = HodlrTree::new(96, HodlrConfig::new(2, 1e-10)).unwrap();
    let mode = TreeMode::new(false, false).unwrap();
    tree.assemble_with(&k, &DenseQrCompressor, mode).unwrap();

    // Exact off-diagonal blocks: the product matches the dense one to round-off
    let x = random_points(96, 2, 3);
    let exact = k.dense().dot(&x);
    let fast = tree.matmat_product(&x).unwrap();
    let diff = (&fast - &exact).iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    assert!(diff < 1e-12);
}

#[test]
fn test_aca_and_dense_compressors_agree() {
    let k = kernel(128);
    let mode = TreeMode::new(true, false).unwrap();

    let mut aca = HodlrTree::new(128, HodlrConfig::new(3, 1e-12)).unwrap();
    aca.assemble_with(&k, &AcaCompressor::new(), mode).unwrap();
    let mut exact = HodlrTree::new(128, HodlrConfig::new(3, 1e-12)).unwrap();
    exact.assemble_with(&k, &DenseQrCompressor, mode).unwrap();

    aca.factorize().unwrap();
    exact.factorize().unwrap();
    let diff = aca.log_determinant().unwrap() - exact.log_determinant().unwrap();
    assert!(diff.abs() < 1e-9);
}

#[test]
fn test_dimension_mismatch() {
    let k = kernel(64);
    let mut tree = HodlrTree::new(64, HodlrConfig::new(2, 1e-10)).unwrap();
    tree.assemble(&k, true, false).unwrap();
    tree.factorize().unwrap();
    let err = tree.solve(&Array2::zeros((63, 2))).unwrap_err();
    assert!(matches!(
        err,
        HodlrError::DimensionMismatch {
            expected: 64,
            got: 63
        }
    ));
    // Caller errors leave the tree usable
    assert_eq!(tree.state(), TreeState::Factorized);
}
