//! Compressed sparse row storage of the near-field correction
//!
//! Row `i` owns `values[row_ptrs[i]..row_ptrs[i + 1]]` with matching column indices,
//! sorted by column. Each triangle couples with a bounded number of neighbours, so the
//! 9×9 blocks fill a small fraction of the matrix.

use ndarray::{Array1, Array2};
use std::ops::Range;

use crate::core::error::{NearfieldError, Result};

/// Real matrix in CSR layout
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    /// Rows
    pub num_rows: usize,
    /// Columns
    pub num_cols: usize,
    /// Stored entries, row by row
    pub values: Vec<f64>,
    /// Column of each stored entry
    pub col_indices: Vec<usize>,
    /// Offsets of each row into `values`, with `num_rows + 1` entries ending at `nnz`
    pub row_ptrs: Vec<usize>,
}

impl CsrMatrix {
    /// Matrix without stored entries
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptrs: vec![0; num_rows + 1],
        }
    }

    /// Compress `(row, col, value)` triplets, summing repeated positions
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        mut triplets: Vec<(usize, usize, f64)>,
    ) -> Result<Self> {
        if let Some(&(r, c, _)) = triplets
            .iter()
            .find(|(r, c, _)| *r >= num_rows || *c >= num_cols)
        {
            return Err(NearfieldError::invalid(format!(
                "triplet ({}, {}) outside a {}x{} matrix",
                r, c, num_rows, num_cols
            )));
        }
        triplets.sort_unstable_by_key(|&(r, c, _)| (r, c));

        let mut values = Vec::with_capacity(triplets.len());
        let mut col_indices = Vec::with_capacity(triplets.len());
        let mut row_ptrs = vec![0usize; num_rows + 1];
        let mut prev = None;
        for (r, c, v) in triplets {
            if prev == Some((r, c)) {
                let last = values.len() - 1;
                values[last] += v;
            } else {
                values.push(v);
                col_indices.push(c);
                row_ptrs[r + 1] += 1;
                prev = Some((r, c));
            }
        }
        for r in 0..num_rows {
            row_ptrs[r + 1] += row_ptrs[r];
        }

        Ok(Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs,
        })
    }

    /// Stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored fraction of the full matrix
    pub fn sparsity(&self) -> f64 {
        match self.num_rows * self.num_cols {
            0 => 0.0,
            cells => self.nnz() as f64 / cells as f64,
        }
    }

    /// Positions of `row` in `values` and `col_indices`
    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_ptrs[row]..self.row_ptrs[row + 1]
    }

    /// `(column, value)` of the stored entries of `row`
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.row_range(row)
            .map(move |k| (self.col_indices[k], self.values[k]))
    }

    /// `A x`
    pub fn matvec(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        let mut y = Array1::zeros(self.num_rows);
        self.matvec_add(x, &mut y)?;
        Ok(y)
    }

    /// `y += A x`
    pub fn matvec_add(&self, x: &Array1<f64>, y: &mut Array1<f64>) -> Result<()> {
        if x.len() != self.num_cols || y.len() != self.num_rows {
            return Err(NearfieldError::invalid(format!(
                "matvec of a {}x{} matrix with vectors of length {} and {}",
                self.num_rows,
                self.num_cols,
                x.len(),
                y.len()
            )));
        }
        for (i, yi) in y.iter_mut().enumerate() {
            *yi += self.row_entries(i).map(|(j, v)| v * x[j]).sum::<f64>();
        }
        Ok(())
    }

    /// Entry `(i, j)`, zero when not stored
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let start = self.row_ptrs[i];
        self.col_indices[self.row_range(i)]
            .binary_search(&j)
            .map_or(0.0, |k| self.values[start + k])
    }

    /// Add every stored entry to a dense matrix of the same shape
    pub fn add_to_dense(&self, dense: &mut Array2<f64>) -> Result<()> {
        if dense.dim() != (self.num_rows, self.num_cols) {
            return Err(NearfieldError::invalid(format!(
                "cannot add a {}x{} matrix to a {:?} array",
                self.num_rows,
                self.num_cols,
                dense.dim()
            )));
        }
        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                dense[[i, j]] += v;
            }
        }
        Ok(())
    }

    /// Dense copy
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.num_rows, self.num_cols));
        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                dense[[i, j]] = v;
            }
        }
        dense
    }
}
