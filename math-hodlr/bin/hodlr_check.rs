//! End-to-end check of the HODLR solver against dense references
//!
//! Builds a Gaussian kernel matrix over random points (value 10 on the
//! diagonal), assembles and factorizes a HODLR tree, and compares product,
//! solve, log-determinant and symmetric factor against dense computations.
//!
//! Usage:
//!     cargo run --release --bin hodlr-check -- --n 2048 --leaf-size 64 --tolerance-exponent 10

use anyhow::Context;
use clap::Parser;
use math_audio_hodlr::blas_helpers::{max_abs_diff, relative_error};
use math_audio_hodlr::dense::{cholesky_factorize, lu_factorize};
use math_audio_hodlr::{
    EntrySource, HodlrConfig, HodlrTree, KernelMatrix, levels_for_leaf_size, lu_solve,
    random_points,
};
use ndarray::{Array2, Axis};
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "hodlr-check",
    about = "Validate HODLR product, solve and determinant against dense references"
)]
struct Cli {
    /// Matrix size N
    #[arg(long, default_value_t = 512)]
    n: usize,

    /// Target size of the leaf blocks
    #[arg(long, default_value_t = 32)]
    leaf_size: usize,

    /// Dimension of the random point cloud
    #[arg(long, default_value_t = 2)]
    dim: usize,

    /// Compression tolerance is 10^-exponent
    #[arg(long, default_value_t = 10)]
    tolerance_exponent: i32,

    /// Assemble without using symmetry
    #[arg(long)]
    nonsymmetric: bool,

    /// Factorize with Cholesky and check the symmetric factor
    #[arg(long)]
    positive_definite: bool,

    /// Random seed for the point cloud
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of threads (0 = use all available cores)
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

/// One comparison against the dense reference
struct Check {
    name: &'static str,
    error: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    configure_threads(args.threads)?;

    let symmetric = !args.nonsymmetric;
    let n = args.n;
    let levels = levels_for_leaf_size(n, args.leaf_size);
    let config = HodlrConfig::new(levels, 1.0).with_tolerance_exponent(args.tolerance_exponent);
    let tolerance = config.tolerance;

    println!("HODLR check");
    println!("===========");
    println!(
        "n = {}, leaf size {}, {} levels, dim {}, tolerance {:e}, symmetric {}, positive definite {}",
        n, args.leaf_size, levels, args.dim, tolerance, symmetric, args.positive_definite
    );
    if math_audio_hodlr::parallel::is_parallel_available() {
        println!("Threads: {}", rayon_threads());
    } else {
        println!("Threads: 1 (parallel feature disabled)");
    }

    let kernel = KernelMatrix::gaussian(random_points(n, args.dim, args.seed), 10.0);
    let mut tree = HodlrTree::new(n, config)?.with_permutation(kernel.permutation().to_vec())?;

    let start = Instant::now();
    tree.assemble(&kernel, symmetric, args.positive_definite)
        .context("assembly failed")?;
    println!("Assembly:      {:>10.3} ms", start.elapsed().as_secs_f64() * 1e3);

    let stats = tree.stats()?;
    println!(
        "Ranks:         max {}, mean {:.1}; storage {:.1}% of dense",
        stats.max_rank,
        stats.mean_rank,
        100.0 * stats.compression_ratio()
    );

    let x = random_points(n, 1, args.seed.wrapping_add(1));
    let dense = kernel.dense();
    let b_exact = dense.dot(&x);
    let mut checks = Vec::new();

    let start = Instant::now();
    let b_fast = tree.matmat_product(&x)?;
    println!("Product:       {:>10.3} ms", start.elapsed().as_secs_f64() * 1e3);
    checks.push(Check {
        name: "matmat_product",
        error: relative_error(&b_fast, &b_exact),
    });

    let start = Instant::now();
    tree.factorize().context("factorization failed")?;
    println!("Factorization: {:>10.3} ms", start.elapsed().as_secs_f64() * 1e3);

    let start = Instant::now();
    let x_fast = tree.solve(&b_exact)?;
    println!("Solve:         {:>10.3} ms", start.elapsed().as_secs_f64() * 1e3);
    checks.push(Check {
        name: "solve",
        error: relative_error(&x_fast, &x),
    });

    let log_det = tree.log_determinant()?;
    let log_det_dense = dense_log_determinant(&dense, symmetric && args.positive_definite)?;
    checks.push(Check {
        name: "log_determinant",
        error: (1.0 - (log_det / log_det_dense).abs()).abs(),
    });

    if symmetric && args.positive_definite {
        let y = tree.symmetric_factor_transpose_product(&x)?;
        let b_sym = tree.symmetric_factor_product(&y)?;
        checks.push(Check {
            name: "W W^T x",
            error: relative_error(&b_sym, &b_exact),
        });

        // x = W^-T W^-1 b through dense solves with the materialized factor
        let w = tree.symmetric_factor()?;
        let b_column = b_exact.index_axis(Axis(1), 0).to_owned();
        let inner = lu_solve(&w, &b_column).context("dense solve with W failed")?;
        let outer = lu_solve(&w.t().to_owned(), &inner).context("dense solve with W^T failed")?;
        checks.push(Check {
            name: "dense W solves",
            error: max_abs_diff(&outer, &x.index_axis(Axis(1), 0)),
        });
    }

    println!();
    println!("{:<18} {:>12} {:>8}", "check", "error", "status");
    let mut failed = 0;
    for check in &checks {
        let pass = check.error < tolerance;
        if !pass {
            failed += 1;
        }
        println!(
            "{:<18} {:>12.3e} {:>8}",
            check.name,
            check.error,
            if pass { "ok" } else { "FAILED" }
        );
    }

    if failed > 0 {
        eprintln!("{} of {} checks exceeded tolerance {:e}", failed, checks.len(), tolerance);
        process::exit(1);
    }
    println!("All {} checks passed", checks.len());
    Ok(())
}

/// ln |det A| from a dense Cholesky (SPD) or LU factorization
fn dense_log_determinant(a: &Array2<f64>, spd: bool) -> anyhow::Result<f64> {
    if spd {
        let chol = cholesky_factorize(a).context("dense Cholesky failed")?;
        Ok(chol.log_det())
    } else {
        let lu = lu_factorize(a).context("dense LU failed")?;
        Ok(lu.log_abs_det())
    }
}

#[cfg(feature = "parallel")]
fn configure_threads(threads: usize) -> anyhow::Result<()> {
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure the thread pool")?;
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn rayon_threads() -> usize {
    rayon::current_num_threads()
}

#[cfg(not(feature = "parallel"))]
fn rayon_threads() -> usize {
    1
}

#[cfg(not(feature = "parallel"))]
fn configure_threads(threads: usize) -> anyhow::Result<()> {
    if threads > 1 {
        log::warn!("built without the parallel feature; ignoring --threads {}", threads);
    }
    Ok(())
}
