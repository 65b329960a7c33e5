//! Sparse matrices with a prescribed spectrum.
//!
//! The generator starts from a strictly lower-triangular seed `L` with `lower_bandwidth`
//! random sub-diagonals, injects the target eigenvalues on the diagonal (`T = L + D`, whose
//! eigenvalues are exactly the diagonal) and applies the shear similarity
//! `A = exp(−U) · T · exp(U)`, where `U` is a nilpotent super-diagonal pattern. Since `U` is
//! nilpotent both exponentials are short exact sums, and `A` keeps `lower_bandwidth`
//! sub-diagonals and at most `2·continuity` super-diagonals. An optional symmetric
//! permutation can scramble the band.
//!
//! Every process assembles the whole matrix in the same order and keeps its own rows, so the
//! result is identical for any process count.
//!
//! # References
//! - Wu, X., Petiton, S., Lu, Y. (2020). A parallel generator of non-Hermitian matrices
//!   computed from given spectra. Concurrency and Computation: Practice and Experience 32(20).

pub mod nilpotency;
pub mod spectrum;
pub mod transform;

pub use nilpotency::Nilpotency;
pub use spectrum::{default_spectrum, load_spectrum, parse_spectrum};
pub use transform::{SparseRows, Transform};

use crate::error::KError;
use crate::matrix::CsrMatrix;
use crate::parallel::RowMap;
use faer::c64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct GeneratorParams {
    pub size: usize,
    /// Length of the runs of ones in the nilpotent pattern.
    pub continuity: usize,
    /// Sub-diagonals of the random seed matrix.
    pub lower_bandwidth: usize,
    /// Spectrum file; the default spectrum is used when absent.
    pub spectra_file: Option<PathBuf>,
    pub seed: u64,
    /// Seed of a final symmetric permutation, if any.
    pub permute: Option<u64>,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self { size: 10, continuity: 4, lower_bandwidth: 4, spectra_file: None, seed: 0, permute: None }
    }
}

#[derive(Debug)]
pub struct SpectrumMatrixGenerator {
    size: usize,
    lower_bandwidth: usize,
    seed: u64,
    spectrum: Vec<c64>,
    pipeline: Vec<Transform>,
}

impl SpectrumMatrixGenerator {
    /// Validate the parameters, read the spectrum and lay out the default pipeline
    /// (inject, shear, then the optional permutation).
    pub fn new(params: &GeneratorParams) -> Result<Self, KError> {
        let spectrum = match &params.spectra_file {
            Some(path) => load_spectrum(path)?,
            None => default_spectrum(params.size),
        };
        Self::with_spectrum(params, spectrum)
    }

    pub fn with_spectrum(params: &GeneratorParams, spectrum: Vec<c64>) -> Result<Self, KError> {
        let n = params.size;
        if n == 0 {
            return Err(KError::DimensionError("matrix size must be positive".into()));
        }
        if params.lower_bandwidth == 0 {
            return Err(KError::DimensionError("lower bandwidth must be positive".into()));
        }
        if spectrum.len() != n {
            return Err(KError::DimensionError(format!(
                "spectrum has {} values, matrix size is {n}",
                spectrum.len()
            )));
        }
        let nilpotency = Nilpotency::new(params.continuity, n)?;
        let mut pipeline = vec![
            Transform::DiagonalInject { spectrum: spectrum.clone() },
            Transform::Shear { nilpotency },
        ];
        if let Some(seed) = params.permute {
            pipeline.push(Transform::Permute { seed });
        }
        Ok(Self { size: n, lower_bandwidth: params.lower_bandwidth, seed: params.seed, spectrum, pipeline })
    }

    /// Replace the transform pipeline.
    pub fn with_pipeline(mut self, pipeline: Vec<Transform>) -> Result<Self, KError> {
        transform::validate_pipeline(&pipeline)?;
        self.pipeline = pipeline;
        Ok(self)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn spectrum(&self) -> &[c64] {
        &self.spectrum
    }

    pub fn pipeline(&self) -> &[Transform] {
        &self.pipeline
    }

    /// Strictly lower-triangular seed; row `i` draws from its own generator.
    pub fn seed_matrix(&self) -> SparseRows {
        let mut l = SparseRows::zeros(self.size);
        for i in 1..self.size {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
            for d in 1..=self.lower_bandwidth.min(i) {
                let v = c64::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5));
                l.set(i, i - d, v);
            }
        }
        l
    }

    /// The whole matrix, identical on every process.
    pub fn assemble(&self) -> Result<SparseRows, KError> {
        transform::validate_pipeline(&self.pipeline)?;
        let mut a = self.seed_matrix();
        for t in &self.pipeline {
            t.apply(&mut a)?;
        }
        Ok(a)
    }

    /// Assemble and keep the rows `map` assigns to this process.
    pub fn build(&self, map: Arc<RowMap>) -> Result<CsrMatrix, KError> {
        if map.global_len() != self.size {
            return Err(KError::DimensionError(format!(
                "row map covers {} rows, matrix size is {}",
                map.global_len(),
                self.size
            )));
        }
        let a = self.assemble()?;
        log::debug!("generator: {}x{} with {} entries", self.size, self.size, a.nnz());
        let (lo, hi) = (map.offset(), map.offset() + map.local_len());
        let rows: Vec<Vec<(usize, c64)>> = a
            .into_rows()
            .into_iter()
            .skip(lo)
            .take(hi - lo)
            .map(|row| row.into_iter().collect())
            .collect();
        CsrMatrix::from_sorted_rows(map, self.size, rows)
    }
}
