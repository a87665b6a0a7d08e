use std::sync::Arc;

use cached::proc_macro::cached;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The families of selector matrices used by transpose and multiplication.
pub enum SelectorKind {
    /// Realigns the first operand: row `i` is rotated left by `i`.
    Sigma,

    /// Realigns the second operand: column `j` is rotated up by `j`.
    Tau,

    /// Rotates every row of a sigma-aligned operand left by `k`.
    V(usize),

    /// Rotates every column of a tau-aligned operand up by `k`.
    W(usize),

    /// Maps a flattened matrix to its flattened transpose.
    Transpose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An `n^2 x n^2` permutation matrix acting on row-major flattened `n x n` matrices.
///
/// # Remarks
/// Rather than storing the dense 0/1 matrix, we store the permutation: output slot `r` takes
/// input slot `source[r]`, i.e. the dense matrix has a single `1` at `(r, source[r])` in every
/// row. [`SelectorMatrix::to_dense`] materializes the dense form when needed.
pub struct SelectorMatrix {
    kind: SelectorKind,
    n: usize,
    source: Vec<usize>,
}

impl SelectorMatrix {
    fn from_fn(kind: SelectorKind, n: usize, f: impl Fn(usize, usize) -> (usize, usize)) -> Self {
        let source = (0..n * n)
            .map(|r| {
                let (i, j) = f(r / n, r % n);
                i * n + j
            })
            .collect();

        Self { kind, n, source }
    }

    /// Which family this selector belongs to.
    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    /// The dimension `n` of the matrices this selector permutes.
    pub fn n(&self) -> usize {
        self.n
    }

    /// The selector's side length, `n^2`.
    pub fn dim(&self) -> usize {
        self.source.len()
    }

    /// The column holding the single nonzero entry of each row.
    pub fn source(&self) -> &[usize] {
        &self.source
    }

    /// Returns entry `(row, col)` of the dense matrix.
    pub fn entry(&self, row: usize, col: usize) -> f64 {
        if self.source[row] == col { 1.0 } else { 0.0 }
    }

    /// Materializes the dense `n^2 x n^2` matrix. This is `O(n^4)`.
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let dim = self.dim();

        self.source
            .iter()
            .map(|&c| {
                let mut row = vec![0.0; dim];
                row[c] = 1.0;
                row
            })
            .collect()
    }

    /// Computes `self * x` for a plaintext vector `x` of length `n^2`.
    ///
    /// # Panics
    /// If `x` has the wrong length.
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.dim());

        self.source.iter().map(|&c| x[c]).collect()
    }
}

/// The selector realigning the first multiplicand.
///
/// # Remarks
/// The dense form is the identity `n x n` block followed, for `i = 0..n-1`, by a shifted band
/// offset by `(i + 1) * n` rows and columns.
pub fn sigma(n: usize) -> SelectorMatrix {
    SelectorMatrix::from_fn(SelectorKind::Sigma, n, |i, j| (i, (i + j) % n))
}

/// The selector realigning the second multiplicand, assembled from cyclic index rotation
/// blocks.
pub fn tau(n: usize) -> SelectorMatrix {
    SelectorMatrix::from_fn(SelectorKind::Tau, n, |i, j| ((i + j) % n, j))
}

/// Per-step column shifts `V_1..V_{n-1}`.
pub fn v(n: usize) -> Vec<SelectorMatrix> {
    (1..n)
        .map(|k| SelectorMatrix::from_fn(SelectorKind::V(k), n, |i, j| (i, (j + k) % n)))
        .collect()
}

/// Per-step row shifts `W_1..W_{n-1}`.
pub fn w(n: usize) -> Vec<SelectorMatrix> {
    (1..n)
        .map(|k| SelectorMatrix::from_fn(SelectorKind::W(k), n, |i, j| ((i + k) % n, j)))
        .collect()
}

/// The selector mapping a flattened matrix to its transpose: output `i * n + j` reads input
/// `j * n + i`.
pub fn transpose_permutation(n: usize) -> SelectorMatrix {
    SelectorMatrix::from_fn(SelectorKind::Transpose, n, |i, j| (j, i))
}

#[derive(Debug, Clone)]
/// Every selector needed to transpose or multiply `n x n` matrices.
pub struct Selectors {
    /// See [`sigma`].
    pub sigma: SelectorMatrix,
    /// See [`tau`].
    pub tau: SelectorMatrix,
    /// See [`v`].
    pub v: Vec<SelectorMatrix>,
    /// See [`w`].
    pub w: Vec<SelectorMatrix>,
    /// See [`transpose_permutation`].
    pub transpose: SelectorMatrix,
}

impl Selectors {
    /// Builds the selectors for dimension `n`. Prefer [`selectors`], which memoizes the result.
    pub fn build(n: usize) -> Self {
        Self {
            sigma: sigma(n),
            tau: tau(n),
            v: v(n),
            w: w(n),
            transpose: transpose_permutation(n),
        }
    }
}

/// Returns the (process-wide, shared) selectors for dimension `n`, building them on first use.
#[cached]
pub fn selectors(n: usize) -> Arc<Selectors> {
    debug!("Building selectors for n={n}");

    Arc::new(Selectors::build(n))
}
