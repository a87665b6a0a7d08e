use std::collections::BTreeSet;

use log::{debug, trace};
use rayon::{ThreadPool, prelude::*};

use crate::{CancelToken, Error, HeEngine, Result, diagonals::Diagonals};

/// The diagonals of one selector, encoded as plaintexts at a shared scale and level.
pub struct EncodedDiagonalSet<P> {
    plaintexts: Vec<P>,
    scale: f64,
    level: usize,
}

impl<P> EncodedDiagonalSet<P> {
    /// Encodes every diagonal in `diagonals` at `scale` for use at `level`.
    pub fn encode<E>(engine: &E, diagonals: &Diagonals, scale: f64, level: usize) -> Result<Self>
    where
        E: HeEngine<Plaintext = P>,
    {
        let plaintexts = diagonals
            .iter()
            .map(|d| engine.encode(d, scale, level))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            plaintexts,
            scale,
            level,
        })
    }

    /// The number of diagonals, `m`.
    pub fn len(&self) -> usize {
        self.plaintexts.len()
    }

    /// Whether the set holds no diagonals.
    pub fn is_empty(&self) -> bool {
        self.plaintexts.is_empty()
    }

    /// The scale every diagonal was encoded at.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The level every diagonal lives at.
    pub fn level(&self) -> usize {
        self.level
    }
}

/// The rotation amounts [`LinearTransformer::apply`] needs for `n x n` matrices:
/// `-n^2` for the fold and `1..n^2` for the diagonal terms.
pub fn required_rotations(n: usize) -> BTreeSet<i64> {
    let m = (n * n) as i64;

    std::iter::once(-m).chain(1..m).collect()
}

/// Maps `f` over `0..count`, on `thread_pool` when one is given and sequentially otherwise.
/// The results keep their order.
pub(crate) fn map_indexed<T, F>(
    thread_pool: Option<&ThreadPool>,
    count: usize,
    f: F,
) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync + Send,
{
    match thread_pool {
        Some(tp) => tp.install(|| (0..count).into_par_iter().map(&f).collect()),
        None => (0..count).map(f).collect(),
    }
}

/// Multiplies an encrypted vector by a matrix given as its cyclic diagonals (the Halevi-Shoup
/// diagonal method).
///
/// # Remarks
/// For an `m x m` matrix `U` with diagonals `d_p[k] = U[k][(k + p) mod m]`,
/// `U * x = sum_p d_p (.) rot(x, p)`, where `rot` rotates left cyclically over `m` elements.
/// Ciphertext rotations wrap at the slot count rather than `m`, so we first fold a copy of `x`
/// into slots `[m, 2m)`; a left rotation by `p < m` then reads the cyclic rotation in its
/// first `m` slots. Only those `m` slots of the result are meaningful.
///
/// Evaluating a transform costs `m` rotations and `m` plaintext multiplications and consumes
/// one multiplicative level's worth of scale (the result's scale is the input scale times the
/// diagonals' scale).
pub struct LinearTransformer<'a, E: HeEngine> {
    engine: &'a E,
    keys: &'a E::RotationKeys,
    thread_pool: Option<&'a ThreadPool>,
    cancel: &'a CancelToken,
}

impl<'a, E: HeEngine> LinearTransformer<'a, E> {
    /// Creates a transformer that rotates with `keys` and observes `cancel`.
    pub fn new(engine: &'a E, keys: &'a E::RotationKeys, cancel: &'a CancelToken) -> Self {
        Self {
            engine,
            keys,
            thread_pool: None,
            cancel,
        }
    }

    /// Evaluates the diagonal terms on `thread_pool`.
    pub fn with_thread_pool(mut self, thread_pool: Option<&'a ThreadPool>) -> Self {
        self.thread_pool = thread_pool;
        self
    }

    /// Computes `U * x`, where `ct` encrypts `x` in its first `m` slots and `diagonals` holds
    /// the encoded diagonals of `U`.
    ///
    /// # Remarks
    /// `ct` must sit at `diagonals.level()` and `2m` must not exceed the slot count unless `m`
    /// equals it exactly.
    pub fn apply(
        &self,
        ct: &E::Ciphertext,
        diagonals: &EncodedDiagonalSet<E::Plaintext>,
    ) -> Result<E::Ciphertext> {
        let m = diagonals.len();
        let slots = self.engine.slot_count();

        if m == 0 {
            return Err(Error::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        if m != slots && 2 * m > slots {
            return Err(Error::UnsupportedSlotLayout {
                required: m,
                slot_count: slots,
            });
        }

        debug!(
            "Applying {m} diagonals at level {} (scale 2^{:.2})",
            diagonals.level(),
            diagonals.scale().log2()
        );

        self.cancel.check()?;

        let combined = if m == slots {
            ct.clone()
        } else {
            let rotated = self.engine.rotate(ct, -(m as i64), self.keys)?;
            self.engine.add(ct, &rotated)?
        };

        let terms = map_indexed(self.thread_pool, m, |i| {
            self.cancel.check()?;
            trace!("Diagonal term {i}/{m}");

            if i == 0 {
                self.engine
                    .multiply_plain(&combined, &diagonals.plaintexts[0])
            } else {
                let rotated = self.engine.rotate(&combined, i as i64, self.keys)?;
                self.engine.multiply_plain(&rotated, &diagonals.plaintexts[i])
            }
        })?;

        self.engine.add_many(&terms)
    }
}
