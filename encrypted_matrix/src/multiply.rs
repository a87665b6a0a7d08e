use std::backtrace::Backtrace;

use log::{debug, error};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::{
    CancelToken, Error, HeEngine, Result,
    diagonals::{Diagonals, SelectorDiagonals},
    engine::same_scale,
    transform::{EncodedDiagonalSet, LinearTransformer, map_indexed},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
/// How the correction terms of a multiplication are brought back to the scale of the base
/// product.
///
/// # Remarks
/// Each correction term passes through a second linear transform and a rescale, which divides
/// its scale by the prime `q` at its level. Since `q` is close to, but not exactly, a power of
/// two, the resulting scale drifts away from the base product's unless something compensates.
pub enum ScaleStrategy {
    /// Overwrite the scale metadata of each rescaled term with `2^floor(log2(scale))`.
    ///
    /// This assumes every input scale is a power of two and slightly perturbs the encrypted
    /// values (by the ratio of the prime to the nearest power of two).
    PowerOfTwo,

    /// Encode the `V_k` and `W_k` diagonals at exactly the prime the rescale divides out, so the
    /// rescaled terms land on the base scale without touching metadata.
    #[default]
    PrimeMatched,
}

/// The selectors a multiplication needs for one dimension, encoded for ciphertexts at one level.
pub struct EncodedSelectors<P> {
    /// The matrix dimension.
    pub n: usize,

    /// The level the diagonals are encoded for.
    pub level: usize,

    /// Sigma, encoded at the base scale.
    pub sigma: EncodedDiagonalSet<P>,

    /// Tau, encoded at the base scale.
    pub tau: EncodedDiagonalSet<P>,

    /// `V_1..V_{n-1}`, encoded at the correction scale.
    pub v: Vec<EncodedDiagonalSet<P>>,

    /// `W_1..W_{n-1}`, encoded at the correction scale.
    pub w: Vec<EncodedDiagonalSet<P>>,
}

impl<P> EncodedSelectors<P> {
    /// Encodes `diagonals` for ciphertexts at `level`.
    ///
    /// # Remarks
    /// Sigma and Tau are encoded at `scale`. `V_k` and `W_k` are encoded at
    /// `scale` or at [`HeEngine::rescale_prime`] of `level`, according to `strategy`.
    pub fn encode<E>(
        engine: &E,
        diagonals: &SelectorDiagonals,
        scale: f64,
        strategy: ScaleStrategy,
        level: usize,
    ) -> Result<Self>
    where
        E: HeEngine<Plaintext = P>,
    {
        debug!(
            "Encoding selectors for n={} at level {level} ({strategy:?})",
            diagonals.n
        );

        let correction_scale = match strategy {
            ScaleStrategy::PowerOfTwo => scale,
            ScaleStrategy::PrimeMatched => engine.rescale_prime(level),
        };

        let encode = |d: &Diagonals, s: f64| EncodedDiagonalSet::encode(engine, d, s, level);

        Ok(Self {
            n: diagonals.n,
            level,
            sigma: encode(&diagonals.sigma, scale)?,
            tau: encode(&diagonals.tau, scale)?,
            v: diagonals
                .v
                .iter()
                .map(|d| encode(d, correction_scale))
                .collect::<Result<_>>()?,
            w: diagonals
                .w
                .iter()
                .map(|d| encode(d, correction_scale))
                .collect::<Result<_>>()?,
        })
    }
}

fn incompatible(op: &'static str, lhs: (f64, usize), rhs: (f64, usize)) -> Error {
    let err = Error::IncompatibleOperands {
        op,
        lhs_scale: lhs.0,
        rhs_scale: rhs.0,
        lhs_level: lhs.1,
        rhs_level: rhs.1,
    };

    error!("{err}\n at {}", Backtrace::force_capture());

    err
}

/// Multiplies encrypted `n x n` matrices with the diagonal method.
///
/// # Remarks
/// With `A` and `B` flattened row-major, `A * B = sum_k V_k(sigma(A)) (.) W_k(tau(B))` where
/// `(.)` is the slotwise product and `V_0`, `W_0` are the identity. The `k = 0` term is the
/// product of the two base realignments; every other term applies one more transform to each
/// base, consuming a level, so it's rescaled and the base product is switched down to meet it.
///
/// Inputs at level `L` produce a result at level `L - 1` with scale `s_a * s_b * scale^2`,
/// where `s_a`, `s_b` are the inputs' scales and `scale` the diagonals' encoding scale.
pub struct MatrixMultiplier<'a, E: HeEngine> {
    engine: &'a E,
    transformer: LinearTransformer<'a, E>,
    thread_pool: Option<&'a ThreadPool>,
    cancel: &'a CancelToken,
    strategy: ScaleStrategy,
}

impl<'a, E: HeEngine> MatrixMultiplier<'a, E> {
    /// Creates a multiplier that rotates with `keys` and observes `cancel`.
    pub fn new(
        engine: &'a E,
        keys: &'a E::RotationKeys,
        cancel: &'a CancelToken,
        strategy: ScaleStrategy,
    ) -> Self {
        Self {
            engine,
            transformer: LinearTransformer::new(engine, keys, cancel),
            thread_pool: None,
            cancel,
            strategy,
        }
    }

    /// Runs the diagonal terms and the per-step correction chains on `thread_pool`.
    pub fn with_thread_pool(mut self, thread_pool: Option<&'a ThreadPool>) -> Self {
        self.transformer = self.transformer.with_thread_pool(thread_pool);
        self.thread_pool = thread_pool;
        self
    }

    /// Mod switches the operand at the higher level down to the other's level.
    fn align_levels(
        &self,
        a: &E::Ciphertext,
        b: &E::Ciphertext,
    ) -> Result<(E::Ciphertext, E::Ciphertext)> {
        let (la, lb) = (self.engine.level(a), self.engine.level(b));

        Ok(match la.cmp(&lb) {
            std::cmp::Ordering::Equal => (a.clone(), b.clone()),
            std::cmp::Ordering::Greater => (self.engine.mod_switch_to(a, lb)?, b.clone()),
            std::cmp::Ordering::Less => (a.clone(), self.engine.mod_switch_to(b, la)?),
        })
    }

    /// Makes `term` addable to `target`: matches its level, then its scale metadata when the
    /// two differ only by rounding.
    fn align_to(&self, term: E::Ciphertext, target: &E::Ciphertext) -> Result<E::Ciphertext> {
        let target_level = self.engine.level(target);
        let target_scale = self.engine.scale(target);

        let mut term = if self.engine.level(&term) > target_level {
            self.engine.mod_switch_to(&term, target_level)?
        } else {
            term
        };

        let (scale, level) = (self.engine.scale(&term), self.engine.level(&term));

        if level != target_level || !same_scale(scale, target_scale) {
            return Err(incompatible(
                "add",
                (scale, level),
                (target_scale, target_level),
            ));
        }

        self.engine.set_scale(&mut term, target_scale);

        Ok(term)
    }

    fn normalize(&self, mut ct: E::Ciphertext) -> E::Ciphertext {
        if self.strategy == ScaleStrategy::PowerOfTwo {
            let snapped = self.engine.scale(&ct).log2().floor().exp2();
            self.engine.set_scale(&mut ct, snapped);
        }

        ct
    }

    /// Computes `A * B`, where `a` and `b` encrypt the flattened `A` and `B` and `selectors`
    /// were encoded for their (common, after alignment) level.
    pub fn multiply(
        &self,
        a: &E::Ciphertext,
        b: &E::Ciphertext,
        selectors: &EncodedSelectors<E::Plaintext>,
    ) -> Result<E::Ciphertext> {
        let n = selectors.n;

        self.cancel.check()?;

        let (a, b) = self.align_levels(a, b)?;
        let level = self.engine.level(&a);

        if level == 0 {
            return Err(Error::InsufficientLevels { required: 1, level });
        }

        if level != selectors.level {
            return Err(incompatible(
                "multiply",
                (self.engine.scale(&a), level),
                (selectors.sigma.scale(), selectors.level),
            ));
        }

        debug!("Multiplying {n}x{n} matrices at level {level}");

        let base_a = self.transformer.apply(&a, &selectors.sigma)?;
        let base_b = self.transformer.apply(&b, &selectors.tau)?;

        let corrections = map_indexed(self.thread_pool, n - 1, |k| {
            let r_a = self.transformer.apply(&base_a, &selectors.v[k])?;
            let r_b = self.transformer.apply(&base_b, &selectors.w[k])?;

            self.cancel.check()?;

            let r_a = self.normalize(self.engine.rescale_to_next(&r_a)?);
            let r_b = self.normalize(self.engine.rescale_to_next(&r_b)?);

            if !same_scale(self.engine.scale(&r_a), self.engine.scale(&base_a))
                || !same_scale(self.engine.scale(&r_b), self.engine.scale(&base_b))
            {
                debug!("Correction {} drifted from the base scale", k + 1);
            }

            self.engine.multiply(&r_a, &r_b)
        })?;

        self.cancel.check()?;

        let product = self.engine.multiply(&base_a, &base_b)?;
        let product = self.engine.mod_switch_to_next(&product)?;

        debug!(
            "Accumulating {} correction terms into the base product",
            corrections.len()
        );

        corrections.into_iter().try_fold(product, |acc, term| {
            let term = self.align_to(term, &acc)?;
            self.engine.add(&acc, &term)
        })
    }
}
