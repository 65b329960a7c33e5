// Row-distributed complex CSR operator backed by faer's sparse row storage.

use crate::core::block::BlockVector;
use crate::core::traits::Operator;
use crate::core::C_ZERO;
use crate::error::KError;
use crate::parallel::{all_gather_c64, RowMap};
use faer::c64;
use faer::sparse::{
    SymbolicSparseRowMat,    // owning symbolic CSR alias
    SparseRowMat,            // owning numeric CSR alias
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Sparse matrix whose rows are distributed according to a [`RowMap`].
///
/// Each process stores its owned rows with global column indices. Applying the operator
/// gathers the input block once per call, so the operator is usable on any process count
/// without a halo-exchange plan.
pub struct CsrMatrix {
    map: Arc<RowMap>,
    ncols: usize,
    inner: SparseRowMat<usize, c64>,
}

impl CsrMatrix {
    /// Build from raw local row-ptr, global col-idx, and values.
    pub fn from_csr(
        map: Arc<RowMap>,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<c64>,
    ) -> Result<Self, KError> {
        let nrows = map.local_len();
        if row_ptr.len() != nrows + 1
            || col_idx.len() != values.len()
            || row_ptr.last().copied() != Some(col_idx.len())
            || col_idx.iter().any(|&c| c >= ncols)
        {
            return Err(KError::ShapeMismatch(format!(
                "CSR arrays do not describe a {nrows}x{ncols} local block"
            )));
        }
        // Build symbolic structure; second argument `None` means “no separate row_nnz”:
        let symbolic = SymbolicSparseRowMat::new_checked(nrows, ncols, row_ptr, None, col_idx);
        // Attach the numerical values:
        let inner = SparseRowMat::new(symbolic, values);
        Ok(Self { map, ncols, inner })
    }

    /// Assemble from `(global_row, global_col, value)` triplets.
    ///
    /// Triplets for rows this process does not own are ignored; duplicates are summed and
    /// columns come out sorted within each row.
    pub fn from_triplets(
        map: Arc<RowMap>,
        ncols: usize,
        triplets: impl IntoIterator<Item = (usize, usize, c64)>,
    ) -> Result<Self, KError> {
        let mut rows: Vec<BTreeMap<usize, c64>> = vec![BTreeMap::new(); map.local_len()];
        let off = map.offset();
        for (i, j, v) in triplets {
            if i >= map.global_len() || j >= ncols {
                return Err(KError::DimensionError(format!(
                    "entry ({i}, {j}) outside a {}x{ncols} matrix",
                    map.global_len()
                )));
            }
            if map.owns(i) {
                *rows[i - off].entry(j).or_insert(C_ZERO) += v;
            }
        }
        Self::from_sorted_rows(map, ncols, rows.into_iter().map(|r| r.into_iter().collect()))
    }

    /// Assemble from the locally owned rows, each already sorted by column.
    pub fn from_sorted_rows(
        map: Arc<RowMap>,
        ncols: usize,
        rows: impl IntoIterator<Item = Vec<(usize, c64)>>,
    ) -> Result<Self, KError> {
        let mut row_ptr = vec![0usize];
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        for row in rows {
            for (j, v) in row {
                col_idx.push(j);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        Self::from_csr(map, ncols, row_ptr, col_idx, values)
    }

    pub fn map(&self) -> &Arc<RowMap> {
        &self.map
    }

    /// Stored entries on this process.
    pub fn local_nnz(&self) -> usize {
        self.inner.as_ref().val().len()
    }

    /// Stored entries over all processes.
    pub fn global_nnz(&self) -> usize {
        self.map.comm().all_reduce(self.local_nnz() as f64) as usize
    }

    /// Visit every local entry as `(global_row, global_col, value)`.
    pub fn for_each_entry(&self, mut f: impl FnMut(usize, usize, c64)) {
        let a = self.inner.as_ref();
        let row_ptr = a.symbolic().row_ptr();
        let col_idx = a.symbolic().col_idx();
        let val = a.val();
        let off = self.map.offset();
        for i in 0..self.map.local_len() {
            for k in row_ptr[i]..row_ptr[i + 1] {
                f(off + i, col_idx[k], val[k]);
            }
        }
    }

    /// Entry `(i, j)` if this process owns row `i` and the entry is stored.
    pub fn get(&self, i: usize, j: usize) -> Option<c64> {
        if !self.map.owns(i) {
            return None;
        }
        let a = self.inner.as_ref();
        let li = i - self.map.offset();
        let row_ptr = a.symbolic().row_ptr();
        let cols = &a.symbolic().col_idx()[row_ptr[li]..row_ptr[li + 1]];
        cols.binary_search(&j).ok().map(|k| a.val()[row_ptr[li] + k])
    }

    /// One-line summary, or every stored entry when `extreme` is set.
    pub fn describe(&self, extreme: bool) -> String {
        let mut s = format!(
            "CsrMatrix<c64> {}x{}, {} stored entries, rows {}..{} on rank {}",
            self.map.global_len(),
            self.ncols,
            self.global_nnz(),
            self.map.offset(),
            self.map.offset() + self.map.local_len(),
            self.map.comm().rank()
        );
        if extreme {
            self.for_each_entry(|i, j, v| {
                s.push_str(&format!("\n  ({i}, {j})  {:+.6e} {:+.6e}i", v.re, v.im));
            });
        }
        s
    }

    fn spmv_local(&self, x: &[c64], y: &mut [c64]) {
        let a = self.inner.as_ref();
        let row_ptr = a.symbolic().row_ptr();
        let col_idx = a.symbolic().col_idx();
        let val = a.val();
        let row = |i: usize| -> c64 {
            (row_ptr[i]..row_ptr[i + 1]).map(|k| val[k] * x[col_idx[k]]).sum()
        };
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            y.par_iter_mut().enumerate().for_each(|(i, yi)| *yi = row(i));
        }
        #[cfg(not(feature = "rayon"))]
        {
            y.iter_mut().enumerate().for_each(|(i, yi)| *yi = row(i));
        }
    }
}

impl Operator for CsrMatrix {
    fn nrows(&self) -> usize {
        self.map.global_len()
    }
    fn ncols(&self) -> usize {
        self.ncols
    }
    fn apply(&self, x: &BlockVector, y: &mut BlockVector) -> Result<(), KError> {
        if x.global_rows() != self.ncols
            || !y.map().is_compatible(&self.map)
            || x.ncols() != y.ncols()
        {
            return Err(KError::ShapeMismatch(format!(
                "{}x{} operator applied to {}x{} into {}x{}",
                self.map.global_len(), self.ncols, x.global_rows(), x.ncols(), y.global_rows(), y.ncols()
            )));
        }
        let comm = self.map.comm();
        for j in 0..x.ncols() {
            if comm.size() == 1 {
                self.spmv_local(x.col(j), y.col_mut(j));
            } else {
                let full = all_gather_c64(comm, x.col(j));
                self.spmv_local(&full, y.col_mut(j));
            }
        }
        Ok(())
    }
    fn diagonal(&self) -> Option<Vec<c64>> {
        let off = self.map.offset();
        Some(
            (0..self.map.local_len())
                .map(|i| self.get(off + i, off + i).unwrap_or(C_ZERO))
                .collect(),
        )
    }
}

impl fmt::Debug for CsrMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(false))
    }
}
