use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use kryst_bgmres::core::{BlockVector, Operator};
use kryst_bgmres::generator::{GeneratorParams, SpectrumMatrixGenerator};
use kryst_bgmres::matrix::CsrMatrix;
use kryst_bgmres::parallel::RowMap;
use kryst_bgmres::preconditioner::{LsPolyParams, LsPolynomial};
use kryst_bgmres::problem::LinearProblem;
use kryst_bgmres::solver::BlockGmresSolver;
use std::sync::Arc;

fn generated(n: usize) -> Arc<CsrMatrix> {
    let params = GeneratorParams { size: n, ..Default::default() };
    let generator = SpectrumMatrixGenerator::new(&params).unwrap();
    Arc::new(generator.build(Arc::new(RowMap::serial(n))).unwrap())
}

fn problem(a: &Arc<CsrMatrix>, k: usize, lsp: bool) -> LinearProblem {
    let map = Arc::clone(a.map());
    let op: Arc<dyn Operator> = a.clone();
    let mut x_true = BlockVector::zeros(Arc::clone(&map), k);
    x_true.randomize(0);
    let mut b = BlockVector::zeros(Arc::clone(&map), k);
    op.apply(&x_true, &mut b).unwrap();
    let mut p = LinearProblem::new(Arc::clone(&op), BlockVector::zeros(Arc::clone(&map), k), b);
    if lsp {
        let pc = LsPolynomial::build(op, map, &LsPolyParams::default()).unwrap();
        p.set_right_prec(Box::new(pc));
    }
    p.set_problem().unwrap();
    p
}

fn bench_generator(c: &mut Criterion) {
    let mut group = c.benchmark_group("generator");
    for n in [500, 2000] {
        let params = GeneratorParams { size: n, ..Default::default() };
        let generator = SpectrumMatrixGenerator::new(&params).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |ben, &n| {
            ben.iter(|| generator.build(black_box(Arc::new(RowMap::serial(n)))).unwrap())
        });
    }
    group.finish();
}

fn bench_block_sizes(c: &mut Criterion) {
    let a = generated(1000);
    let mut group = c.benchmark_group("block gmres, 4 rhs");
    for s in [1, 2, 4] {
        group.bench_with_input(BenchmarkId::new("block size", s), &s, |ben, &s| {
            ben.iter(|| {
                let mut p = problem(&a, 4, false);
                BlockGmresSolver::new(1e-8, 5000, 50).with_block_size(s).solve(black_box(&mut p)).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_lsp(c: &mut Criterion) {
    let a = generated(1000);
    c.bench_function("block gmres + lsp, block size 2", |ben| {
        ben.iter(|| {
            let mut p = problem(&a, 2, true);
            BlockGmresSolver::new(1e-8, 5000, 20).with_block_size(2).solve(black_box(&mut p)).unwrap()
        })
    });
}

criterion_group!(benches, bench_generator, bench_block_sizes, bench_lsp);
criterion_main!(benches);
