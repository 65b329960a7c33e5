//! Tests for the spectrum-prescribed matrix generator and the Matrix Market reader.
//!
//! Generated matrices must carry exactly the requested eigenvalues: with the default spectrum
//! `1.5 + e^{2πik/n}` every trace moment has the closed form `tr(A^m) = n · 1.5^m` for
//! `m < n`. Spectra read from a file, permuted pipelines and loaded Matrix Market files go
//! through the same public entry points the driver uses.

use approx::assert_relative_eq;
use faer::c64;
use kryst_bgmres::context::{KspContext, MatrixSource};
use kryst_bgmres::core::{BlockVector, C_ZERO, Operator};
use kryst_bgmres::generator::{GeneratorParams, SparseRows, SpectrumMatrixGenerator};
use kryst_bgmres::parallel::SerialComm;
use kryst_bgmres::solver::BlockGmresParams;
use kryst_bgmres::utils::matrix_market::load_matrix_market;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

fn dense(a: &SparseRows) -> Vec<Vec<c64>> {
    (0..a.dim()).map(|i| (0..a.dim()).map(|j| a.get(i, j)).collect()).collect()
}

fn matmul(a: &[Vec<c64>], b: &[Vec<c64>]) -> Vec<Vec<c64>> {
    let n = a.len();
    (0..n)
        .map(|i| (0..n).map(|j| (0..n).map(|k| a[i][k] * b[k][j]).sum()).collect())
        .collect()
}

/// `tr(A^m)` for `m = 1..=count`.
fn trace_moments(a: &[Vec<c64>], count: usize) -> Vec<c64> {
    let mut power = a.to_vec();
    let mut moments = Vec::with_capacity(count);
    for _ in 0..count {
        moments.push((0..a.len()).map(|i| power[i][i]).sum());
        power = matmul(&power, a);
    }
    moments
}

fn scratch_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("kryst_bgmres_{}_{name}", std::process::id()));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn default_spectrum_trace_moments() {
    let n = 24;
    let params = GeneratorParams { size: n, continuity: 3, lower_bandwidth: 3, ..Default::default() };
    let a = SpectrumMatrixGenerator::new(&params).unwrap().assemble().unwrap();
    for (m, t) in trace_moments(&dense(&a), 5).into_iter().enumerate() {
        let expected = n as f64 * 1.5f64.powi(m as i32 + 1);
        assert_relative_eq!(t.re, expected, max_relative = 1e-8);
        assert!(t.im.abs() <= 1e-8 * expected, "tr(A^{}) has imaginary part {}", m + 1, t.im);
    }
}

#[test]
fn spectrum_from_file_with_permutation() {
    let path = scratch_file(
        "spectrum.txt",
        "% eigenvalues\n2.0\n# complex pair\n1.0 0.5\n1.0 -0.5\n\n3.0 0\n-1.5 2\n0.75\n",
    );
    let lambdas = [
        c64::new(2.0, 0.0),
        c64::new(1.0, 0.5),
        c64::new(1.0, -0.5),
        c64::new(3.0, 0.0),
        c64::new(-1.5, 2.0),
        c64::new(0.75, 0.0),
    ];
    let params = GeneratorParams {
        size: 6,
        continuity: 2,
        lower_bandwidth: 2,
        spectra_file: Some(path.clone()),
        permute: Some(3),
        ..Default::default()
    };
    let generator = SpectrumMatrixGenerator::new(&params);
    std::fs::remove_file(&path).ok();
    let generator = generator.unwrap();
    assert_eq!(generator.spectrum(), &lambdas);
    let moments = trace_moments(&dense(&generator.assemble().unwrap()), 4);
    for (m, t) in moments.into_iter().enumerate() {
        let expected: c64 = lambdas.iter().map(|l| l.powi(m as i32 + 1)).sum();
        assert!((t - expected).norm() <= 1e-8 * expected.norm().max(1.0), "moment {}: {t} vs {expected}", m + 1);
    }
}

#[test]
fn short_spectrum_file_is_rejected() {
    let path = scratch_file("short.txt", "1.0\n2.0\n");
    let params = GeneratorParams { size: 5, spectra_file: Some(path.clone()), ..Default::default() };
    let result = SpectrumMatrixGenerator::new(&params);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}

#[test]
fn matrix_market_file_drives_a_solve() {
    // 1-D convection-diffusion stencil, stored as a general real matrix
    let n = 20;
    let mut body = format!("%%MatrixMarket matrix coordinate real general\n% stencil\n{n} {n} {}\n", 3 * n - 2);
    for i in 1..=n {
        body.push_str(&format!("{i} {i} 4.0\n"));
        if i > 1 {
            body.push_str(&format!("{i} {} -1.5\n", i - 1));
        }
        if i < n {
            body.push_str(&format!("{i} {} -0.5\n", i + 1));
        }
    }
    let path = scratch_file("stencil.mtx", &body);

    let a = load_matrix_market(&path, Arc::new(SerialComm)).unwrap();
    assert_eq!((a.nrows(), a.ncols(), a.global_nnz()), (n, n, 3 * n - 2));
    assert_eq!(a.get(3, 2), Some(c64::new(-1.5, 0.0)));
    let ones = BlockVector::from_fn(Arc::clone(a.map()), 1, |_, _| c64::new(1.0, 0.0));
    let mut y = BlockVector::zeros(Arc::clone(a.map()), 1);
    a.apply(&ones, &mut y).unwrap();
    assert_eq!(y.col(0)[0], c64::new(3.5, 0.0));
    assert_eq!(y.col(0)[5], c64::new(2.0, 0.0));

    let gmres = BlockGmresParams { block_size: 2, num_blocks: 10, tol: 1e-10, ..Default::default() };
    let ctx = KspContext::new(MatrixSource::MatrixMarket(path.clone()), gmres).with_num_rhs(2);
    let a = Arc::new(ctx.build_matrix(Arc::new(SerialComm)).unwrap());
    std::fs::remove_file(&path).ok();
    let mut built = ctx.build_problem(a).unwrap();
    let stats = ctx.solve_context(&mut built.problem).unwrap();
    assert!(stats.converged());
    let mut err = built.problem.lhs().clone();
    err.axpy(c64::new(-1.0, 0.0), &built.exact).unwrap();
    for (e, x) in err.column_norms().iter().zip(built.exact.column_norms()) {
        assert!(*e <= 1e-8 * x);
    }
    assert!(built.problem.lhs().col(0).iter().any(|v| *v != C_ZERO));
}
