use std::sync::Arc;

use cached::proc_macro::cached;
use log::debug;

use crate::{
    Error, Result,
    encoder::{SelectorMatrix, selectors},
};

/// The default perturbation added to every diagonal coefficient.
///
/// # Remarks
/// Multiplying a ciphertext by an all-zero plaintext yields a transparent ciphertext, which
/// CKKS engines refuse to produce. Selector diagonals are mostly zero, so every coefficient is
/// nudged by this amount. It must stay well below the tolerance results are checked against.
pub const DEFAULT_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
/// The `m` cyclic diagonals of an `m x m` matrix, where diagonal `p` holds
/// `U[k][(k + p) mod m]` at index `k`.
pub struct Diagonals(Vec<Vec<f64>>);

impl Diagonals {
    /// Derives the diagonals of `sel` directly from its permutation in `O(m^2)`, without
    /// materializing the dense matrix, then adds `epsilon` to every coefficient.
    pub fn from_selector(sel: &SelectorMatrix, epsilon: f64) -> Self {
        let m = sel.dim();
        let mut diags = vec![vec![epsilon; m]; m];

        // Row k's only nonzero sits at column source[k], which lies on diagonal
        // (source[k] - k) mod m.
        for (k, &c) in sel.source().iter().enumerate() {
            let p = (c + m - k) % m;
            diags[p][k] += 1.0;
        }

        Self(diags)
    }

    /// The number of diagonals, which equals their length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no diagonals.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Diagonal `p`.
    pub fn get(&self, p: usize) -> &[f64] {
        &self.0[p]
    }

    /// The diagonals in order, starting with the main diagonal.
    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.0.iter().map(|x| x.as_slice())
    }
}

/// Extracts diagonal `p` of the square matrix `matrix`.
///
/// # Remarks
/// The walk has two segments: `m - p` entries starting at `(0, p)` heading down-right, then
/// `p` entries starting at `(m - p, 0)`.
fn diagonal(matrix: &[Vec<f64>], p: usize) -> Vec<f64> {
    let m = matrix.len();

    let upper = (0..m - p).map(|i| matrix[i][i + p]);
    let lower = (0..p).map(|j| matrix[m - p + j][j]);

    upper.chain(lower).collect()
}

/// Extracts every cyclic diagonal of the dense square matrix `matrix` and adds `epsilon` to
/// each coefficient.
pub fn extract_diagonals(matrix: &[Vec<f64>], epsilon: f64) -> Result<Diagonals> {
    let m = matrix.len();

    if let Some(row) = matrix.iter().find(|r| r.len() != m) {
        return Err(Error::DimensionMismatch {
            expected: m,
            actual: row.len(),
        });
    }

    let diags = (0..m)
        .map(|p| {
            let mut d = diagonal(matrix, p);
            d.iter_mut().for_each(|x| *x += epsilon);
            d
        })
        .collect();

    Ok(Diagonals(diags))
}

#[derive(Debug, Clone)]
/// The perturbed diagonals of every selector for one dimension.
pub struct SelectorDiagonals {
    /// The dimension `n`.
    pub n: usize,
    /// Diagonals of Sigma, which realigns the left operand.
    pub sigma: Diagonals,
    /// Diagonals of Tau, which realigns the right operand.
    pub tau: Diagonals,
    /// Diagonals of `V_1..V_{n-1}`.
    pub v: Vec<Diagonals>,
    /// Diagonals of `W_1..W_{n-1}`.
    pub w: Vec<Diagonals>,
    /// Diagonals of the transpose permutation.
    pub transpose: Diagonals,
}

impl SelectorDiagonals {
    /// Extracts the diagonals of all the selectors for `n`, perturbed by `epsilon`.
    pub fn build(n: usize, epsilon: f64) -> Self {
        let sel = selectors(n);
        let extract = |s: &SelectorMatrix| Diagonals::from_selector(s, epsilon);

        Self {
            n,
            sigma: extract(&sel.sigma),
            tau: extract(&sel.tau),
            v: sel.v.iter().map(extract).collect(),
            w: sel.w.iter().map(extract).collect(),
            transpose: extract(&sel.transpose),
        }
    }
}

/// Returns the shared diagonals for dimension `n` perturbed by `epsilon`.
///
/// # Remarks
/// Floats aren't hashable, so the cache is keyed on `epsilon`'s bit pattern.
pub fn selector_diagonals(n: usize, epsilon: f64) -> Arc<SelectorDiagonals> {
    cached_selector_diagonals(n, epsilon.to_bits())
}

#[cached]
fn cached_selector_diagonals(n: usize, epsilon_bits: u64) -> Arc<SelectorDiagonals> {
    debug!("Extracting selector diagonals for n={n}");

    Arc::new(SelectorDiagonals::build(n, f64::from_bits(epsilon_bits)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{Selectors, sigma, transpose_permutation};

    #[test]
    fn dense_and_closed_form_extraction_agree() {
        for n in [2, 3, 4] {
            let sel = Selectors::build(n);
            let all = [&sel.sigma, &sel.tau, &sel.transpose]
                .into_iter()
                .chain(sel.v.iter())
                .chain(sel.w.iter());

            for s in all {
                let dense = extract_diagonals(&s.to_dense(), DEFAULT_EPSILON).unwrap();
                let closed = Diagonals::from_selector(s, DEFAULT_EPSILON);

                assert_eq!(dense, closed, "{:?}", s.kind());
            }
        }
    }

    #[test]
    fn diagonal_walk_wraps() {
        let m: Vec<Vec<f64>> = (0..3)
            .map(|i| (0..3).map(|j| (i * 3 + j) as f64).collect())
            .collect();

        let d = extract_diagonals(&m, 0.0).unwrap();

        assert_eq!(d.len(), 3);
        assert_eq!(d.get(0), &[0.0, 4.0, 8.0]);
        assert_eq!(d.get(1), &[1.0, 5.0, 6.0]);
        assert_eq!(d.get(2), &[2.0, 3.0, 7.0]);
    }

    #[test]
    fn no_diagonal_is_all_zero() {
        let d = Diagonals::from_selector(&sigma(4), DEFAULT_EPSILON);

        assert_eq!(d.len(), 16);

        for diag in d.iter() {
            assert_eq!(diag.len(), 16);
            assert!(diag.iter().all(|x| *x != 0.0));
        }
    }

    #[test]
    fn unperturbed_diagonals_can_be_zero() {
        let d = Diagonals::from_selector(&transpose_permutation(2), 0.0);

        // The 2x2 transpose swaps slots 1 and 2 only, so diagonal 3 is empty.
        assert_eq!(d.get(0), &[1.0, 0.0, 0.0, 1.0]);
        assert_eq!(d.get(1), &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(d.get(2), &[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(d.get(3), &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn rejects_non_square() {
        let m = vec![vec![1.0, 0.0], vec![0.0]];

        assert!(extract_diagonals(&m, 0.0).is_err());
    }

    #[test]
    fn diagonals_are_cached_per_epsilon() {
        let a = selector_diagonals(3, DEFAULT_EPSILON);
        let b = selector_diagonals(3, DEFAULT_EPSILON);
        let c = selector_diagonals(3, 0.0);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.v.len(), 2);
        assert_eq!(c.transpose.get(0)[0], 1.0);
    }
}
