use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::debug;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::{
    CancelToken, DEFAULT_EPSILON, Error, HeEngine, Matrix, Params, Result,
    diagonals::selector_diagonals,
    engine::same_scale,
    multiply::{EncodedSelectors, MatrixMultiplier, ScaleStrategy},
    transform::{EncodedDiagonalSet, LinearTransformer},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Settings for a [`MatrixEvaluator`].
pub struct MatrixConfig {
    /// The scale matrices and selector diagonals are encoded at.
    pub scale: f64,

    /// The perturbation added to every diagonal coefficient. Must be nonzero for engines that
    /// reject transparent ciphertexts.
    pub epsilon: f64,

    /// How multiplication keeps its correction terms on the base scale.
    pub scale_strategy: ScaleStrategy,
}

impl MatrixConfig {
    /// The default configuration for ciphertexts encrypted under `params`.
    pub fn from_params(params: &Params) -> Self {
        Self {
            scale: params.scale(),
            epsilon: DEFAULT_EPSILON,
            scale_strategy: ScaleStrategy::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::InvalidParams(format!(
                "scale {} must be positive and finite",
                self.scale
            )));
        }

        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(Error::InvalidParams(format!(
                "epsilon {} must be nonnegative and finite",
                self.epsilon
            )));
        }

        Ok(())
    }
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self::from_params(&Params::default())
    }
}

#[derive(Debug, Clone)]
/// An encrypted `n x n` matrix, flattened row-major into the first `n^2` slots of a
/// ciphertext.
pub struct EncryptedMatrix<C> {
    ct: C,
    n: usize,
}

impl<C> EncryptedMatrix<C> {
    /// Wraps a ciphertext known to hold a flattened `n x n` matrix.
    pub fn from_ciphertext(ct: C, n: usize) -> Self {
        Self { ct, n }
    }

    /// The matrix dimension.
    pub fn n(&self) -> usize {
        self.n
    }

    /// The underlying ciphertext.
    pub fn ciphertext(&self) -> &C {
        &self.ct
    }

    /// Unwraps the underlying ciphertext.
    pub fn into_ciphertext(self) -> C {
        self.ct
    }
}

type SelectorCache<P> = Mutex<HashMap<(usize, usize), Arc<EncodedSelectors<P>>>>;
type TransposeCache<P> = Mutex<HashMap<(usize, usize), Arc<EncodedDiagonalSet<P>>>>;

/// Encrypts, transposes, multiplies and decrypts square matrices with an [`HeEngine`].
///
/// # Remarks
/// Every operation validates its inputs against the engine's slot count and modulus chain
/// before issuing any HE operation, so configuration problems surface as errors rather than
/// as garbage decryptions.
///
/// Encoded selector diagonals depend on the dimension and the level of the inputs; they're
/// built on first use and cached for the evaluator's lifetime.
///
/// Key generation stays with the caller: `keys` must cover
/// [`required_rotations`](crate::required_rotations) for every dimension used.
pub struct MatrixEvaluator<'a, E: HeEngine> {
    engine: &'a E,
    keys: &'a E::RotationKeys,
    config: MatrixConfig,
    thread_pool: Option<Arc<ThreadPool>>,
    multiply_cache: SelectorCache<E::Plaintext>,
    transpose_cache: TransposeCache<E::Plaintext>,
}

impl<'a, E: HeEngine> MatrixEvaluator<'a, E> {
    /// Creates an evaluator that runs on the current thread.
    pub fn new(engine: &'a E, keys: &'a E::RotationKeys, config: MatrixConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            engine,
            keys,
            config,
            thread_pool: None,
            multiply_cache: Mutex::new(HashMap::new()),
            transpose_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Runs independent HE operations on `thread_pool`.
    pub fn with_thread_pool(mut self, thread_pool: Arc<ThreadPool>) -> Self {
        self.thread_pool = Some(thread_pool);
        self
    }

    /// The engine this evaluator runs on.
    pub fn engine(&self) -> &E {
        self.engine
    }

    /// The evaluator's settings.
    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Checks that `n x n` matrices fit the engine's slots.
    pub fn validate_dimension(&self, n: usize) -> Result<()> {
        let slot_count = self.engine.slot_count();
        let required = n * n;

        if n < 2 {
            return Err(Error::InvalidDimension {
                n,
                reason: "matrices must be at least 2x2",
            });
        }

        if required > slot_count {
            return Err(Error::InsufficientSlots {
                n,
                required,
                slot_count,
            });
        }

        if required != slot_count && 2 * required > slot_count {
            return Err(Error::UnsupportedSlotLayout {
                required,
                slot_count,
            });
        }

        Ok(())
    }

    fn check_modulus(&self, required_bits: f64, level: usize) -> Result<()> {
        let available_bits = self.engine.modulus_bits(level);

        if required_bits >= available_bits {
            return Err(Error::InsufficientModulus {
                required_bits,
                available_bits,
            });
        }

        Ok(())
    }

    /// Checks that power-of-two snapping brings each operand's rescaled correction terms back
    /// to its base scale.
    fn check_power_of_two(&self, scale: f64, level: usize) -> Result<()> {
        let base = self.engine.plain_product_scale(scale, self.config.scale);
        let rescaled = self.engine.plain_product_scale(base, self.config.scale)
            / self.engine.rescale_prime(level);
        let snapped = rescaled.log2().floor().exp2();

        if !same_scale(snapped, base) {
            return Err(Error::UnalignedScale {
                base_bits: base.log2(),
                rescaled_bits: rescaled.log2(),
                snapped_bits: snapped.log2(),
            });
        }

        Ok(())
    }

    /// Encodes and encrypts `matrix` at the configured scale and the engine's top level.
    pub fn encrypt_matrix(&self, matrix: &Matrix) -> Result<EncryptedMatrix<E::Ciphertext>> {
        self.validate_dimension(matrix.n())?;

        let pt = self.engine.encode(
            matrix.as_slice(),
            self.config.scale,
            self.engine.top_level(),
        )?;

        Ok(EncryptedMatrix {
            ct: self.engine.encrypt(&pt)?,
            n: matrix.n(),
        })
    }

    /// Decrypts and decodes `matrix`.
    pub fn decrypt_matrix(&self, matrix: &EncryptedMatrix<E::Ciphertext>) -> Result<Matrix> {
        let n = matrix.n;
        let slots = self.engine.decode(&self.engine.decrypt(&matrix.ct)?)?;

        if slots.len() < n * n {
            return Err(Error::DimensionMismatch {
                expected: n * n,
                actual: slots.len(),
            });
        }

        Matrix::new(n, slots[..n * n].to_vec())
    }

    /// Transposes an encrypted matrix.
    ///
    /// # Remarks
    /// The result stays at the input's level with its scale multiplied by the configured
    /// scale.
    pub fn transpose(
        &self,
        matrix: &EncryptedMatrix<E::Ciphertext>,
    ) -> Result<EncryptedMatrix<E::Ciphertext>> {
        self.transpose_with_cancel(matrix, &CancelToken::new())
    }

    /// [`MatrixEvaluator::transpose`], stopping early with [`Error::Cancelled`] once `cancel`
    /// is set.
    pub fn transpose_with_cancel(
        &self,
        matrix: &EncryptedMatrix<E::Ciphertext>,
        cancel: &CancelToken,
    ) -> Result<EncryptedMatrix<E::Ciphertext>> {
        let n = matrix.n;

        cancel.check()?;
        self.validate_dimension(n)?;

        let level = self.engine.level(&matrix.ct);
        let scale = self.engine.scale(&matrix.ct);

        self.check_modulus(scale.log2() + self.config.scale.log2(), level)?;

        debug!("Transposing {n}x{n} matrix at level {level}");

        let diagonals = self.transpose_diagonals(n, level)?;

        let ct = LinearTransformer::new(self.engine, self.keys, cancel)
            .with_thread_pool(self.thread_pool.as_deref())
            .apply(&matrix.ct, &diagonals)?;

        Ok(EncryptedMatrix { ct, n })
    }

    /// Multiplies two encrypted matrices of the same dimension.
    ///
    /// # Remarks
    /// Inputs at different levels are first switched to the lower one, `L`. The result sits
    /// at level `L - 1` with scale `s_a * s_b * scale^2`, which must fit the modulus there.
    /// With [`ScaleStrategy::PowerOfTwo`], the input and diagonal scales must also be powers of
    /// two that survive a rescale by the prime at `L`.
    pub fn multiply(
        &self,
        a: &EncryptedMatrix<E::Ciphertext>,
        b: &EncryptedMatrix<E::Ciphertext>,
    ) -> Result<EncryptedMatrix<E::Ciphertext>> {
        self.multiply_with_cancel(a, b, &CancelToken::new())
    }

    /// [`MatrixEvaluator::multiply`], stopping early with [`Error::Cancelled`] once `cancel` is
    /// set.
    pub fn multiply_with_cancel(
        &self,
        a: &EncryptedMatrix<E::Ciphertext>,
        b: &EncryptedMatrix<E::Ciphertext>,
        cancel: &CancelToken,
    ) -> Result<EncryptedMatrix<E::Ciphertext>> {
        let n = a.n;

        cancel.check()?;

        if a.n != b.n {
            return Err(Error::DimensionMismatch {
                expected: a.n,
                actual: b.n,
            });
        }

        self.validate_dimension(n)?;

        let level = usize::min(self.engine.level(&a.ct), self.engine.level(&b.ct));

        if level == 0 {
            return Err(Error::InsufficientLevels { required: 1, level });
        }

        let (scale_a, scale_b) = (self.engine.scale(&a.ct), self.engine.scale(&b.ct));
        let diag_bits = self.config.scale.log2();
        let correction_bits = match self.config.scale_strategy {
            ScaleStrategy::PowerOfTwo => diag_bits,
            ScaleStrategy::PrimeMatched => self.engine.rescale_prime(level).log2(),
        };

        // Correction terms before rescaling, then the final product.
        self.check_modulus(
            scale_a.max(scale_b).log2() + diag_bits + correction_bits,
            level,
        )?;
        self.check_modulus(
            scale_a.log2() + scale_b.log2() + 2.0 * diag_bits,
            level - 1,
        )?;

        if self.config.scale_strategy == ScaleStrategy::PowerOfTwo {
            self.check_power_of_two(scale_a, level)?;
            self.check_power_of_two(scale_b, level)?;
        }

        let selectors = self.multiply_selectors(n, level)?;

        let ct = MatrixMultiplier::new(self.engine, self.keys, cancel, self.config.scale_strategy)
            .with_thread_pool(self.thread_pool.as_deref())
            .multiply(&a.ct, &b.ct, &selectors)?;

        Ok(EncryptedMatrix { ct, n })
    }

    fn transpose_diagonals(
        &self,
        n: usize,
        level: usize,
    ) -> Result<Arc<EncodedDiagonalSet<E::Plaintext>>> {
        let mut cache = self.transpose_cache.lock().unwrap();

        if let Some(x) = cache.get(&(n, level)) {
            return Ok(x.clone());
        }

        let diagonals = selector_diagonals(n, self.config.epsilon);
        let encoded = Arc::new(EncodedDiagonalSet::encode(
            self.engine,
            &diagonals.transpose,
            self.config.scale,
            level,
        )?);

        cache.insert((n, level), encoded.clone());

        Ok(encoded)
    }

    fn multiply_selectors(
        &self,
        n: usize,
        level: usize,
    ) -> Result<Arc<EncodedSelectors<E::Plaintext>>> {
        let mut cache = self.multiply_cache.lock().unwrap();

        if let Some(x) = cache.get(&(n, level)) {
            return Ok(x.clone());
        }

        let encoded = Arc::new(EncodedSelectors::encode(
            self.engine,
            &selector_diagonals(n, self.config.epsilon),
            self.config.scale,
            self.config.scale_strategy,
            level,
        )?);

        cache.insert((n, level), encoded.clone());

        Ok(encoded)
    }
}
