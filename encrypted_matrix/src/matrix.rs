use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A square `n x n` matrix of reals stored row-major.
///
/// # Remarks
/// The row-major flattening is the canonical layout encrypted matrices use: element `(i, j)`
/// lives in slot `i * n + j`.
pub struct Matrix {
    n: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Wraps row-major `data` as an `n x n` matrix.
    pub fn new(n: usize, data: Vec<f64>) -> Result<Self> {
        Self::check_nonempty(n)?;

        if data.len() != n * n {
            return Err(Error::DimensionMismatch {
                expected: n * n,
                actual: data.len(),
            });
        }

        Ok(Self { n, data })
    }

    /// Builds a matrix from its rows. Every row must have as many entries as there are rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        Self::check_nonempty(n)?;

        let mut data = Vec::with_capacity(n * n);

        for row in rows {
            if row.len() != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    actual: row.len(),
                });
            }

            data.extend_from_slice(row);
        }

        Ok(Self { n, data })
    }

    fn check_nonempty(n: usize) -> Result<()> {
        if n == 0 {
            return Err(Error::InvalidDimension {
                n,
                reason: "matrices cannot be empty",
            });
        }

        Ok(())
    }

    /// Builds an `n x n` matrix whose entry `(i, j)` is `f(i, j)`.
    pub fn from_fn(n: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let data = (0..n * n).map(|x| f(x / n, x % n)).collect();

        Self { n, data }
    }

    /// The `n x n` identity.
    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    /// The matrix dimension `n`.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Returns entry `(row, col)`.
    ///
    /// # Panics
    /// If either index is out of bounds.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(row < self.n && col < self.n);

        self.data[row * self.n + col]
    }

    /// The row-major flattening.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Consumes the matrix, returning its row-major flattening.
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// The rows of this matrix.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.n.max(1))
    }

    /// The transpose, computed in the clear.
    pub fn transpose(&self) -> Self {
        Self::from_fn(self.n, |i, j| self.get(j, i))
    }

    /// Computes `self * rhs`.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        if self.n != rhs.n {
            return Err(Error::DimensionMismatch {
                expected: self.n,
                actual: rhs.n,
            });
        }

        Ok(Self::from_fn(self.n, |i, j| {
            (0..self.n).map(|k| self.get(i, k) * rhs.get(k, j)).sum()
        }))
    }

    /// The largest elementwise absolute difference between `self` and `other`.
    ///
    /// # Panics
    /// If the matrices have different dimensions.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        assert_eq!(self.n, other.n);

        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Whether every entry is within `tolerance` of `other` relative to the entry's magnitude
    /// (absolute for entries smaller than 1).
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.n == other.n
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| (a - b).abs() <= tolerance * b.abs().max(1.0))
    }
}
