use std::{collections::BTreeSet, sync::Mutex};

use log::debug;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};

use crate::{Error, Params, Result};

use super::{HeEngine, same_scale};

/// The standard deviation of fresh encryption noise, in units of the scaled message.
pub const NOISE_STDDEV: f64 = 3.2;

#[derive(Debug, Clone, PartialEq)]
/// An encoded message: every slot multiplied by `scale` and rounded to an integer.
pub struct SimPlaintext {
    values: Vec<f64>,
    scale: f64,
    level: usize,
}

impl SimPlaintext {
    /// The scale this plaintext was encoded at.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The level this plaintext lives at.
    pub fn level(&self) -> usize {
        self.level
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A simulated CKKS ciphertext.
///
/// # Remarks
/// The "encrypted" payload is the noisy scaled message itself. Nothing is hidden; the point is
/// to reproduce the bookkeeping (scale, level, modulus) and numerical behavior of CKKS.
pub struct SimCiphertext {
    values: Vec<f64>,
    scale: f64,
    level: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The rotations a [`SimCkks`] ciphertext may undergo.
pub enum SimRotationKeys {
    /// Keys for every rotation amount.
    All,

    /// Keys for the listed rotation amounts, normalized into `[0, slot_count)`.
    Steps(BTreeSet<usize>),
}

impl SimRotationKeys {
    fn allows(&self, normalized: usize) -> bool {
        match self {
            Self::All => true,
            Self::Steps(s) => normalized == 0 || s.contains(&normalized),
        }
    }
}

/// A CKKS simulator that reproduces the scale and level bookkeeping of a real engine.
///
/// # Remarks
/// Messages are held as `f64` multiples of their scale, rounded to integers at encoding and
/// after every rescale, with Gaussian noise added at encryption. The modulus chain is made of
/// real NTT-friendly primes generated from [`Params`], so rescaling divides by the same
/// (non power of two) values a real engine would.
///
/// The simulator enforces the rules a production engine does:
/// * Additions need matching scales and levels; multiplications need matching levels.
/// * A result's scale must stay below the modulus at its level ([`Error::ScaleOutOfBounds`]).
/// * Multiplying by an all-zero plaintext is rejected ([`Error::TransparentCiphertext`]).
/// * Rotations need a key for the requested amount ([`Error::MissingRotationKey`]).
///
/// Decryption reduces the scaled message into the centered range of the modulus at the
/// ciphertext's level, so overflowing the modulus yields garbage just as exhausting the noise
/// budget does on a real engine.
pub struct SimCkks {
    params: Params,
    primes: Vec<u64>,
    modulus_bits: Vec<f64>,
    noise: Normal<f64>,
    rng: Mutex<StdRng>,
}

impl SimCkks {
    /// Creates a simulator for `params` whose noise is drawn from an RNG seeded with `seed`.
    pub fn new(params: &Params, seed: u64) -> Result<Self> {
        let primes = params.generate_primes()?;

        debug!(
            "Simulated CKKS context N={} primes={primes:?}",
            params.poly_modulus_degree
        );

        let modulus_bits = primes
            .iter()
            .scan(0.0, |acc, q| {
                *acc += (*q as f64).log2();
                Some(*acc)
            })
            .collect();

        let noise = Normal::new(0.0, NOISE_STDDEV)
            .map_err(|e| Error::InvalidParams(format!("noise distribution: {e}")))?;

        Ok(Self {
            params: params.clone(),
            primes,
            modulus_bits,
            noise,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// The parameters this simulator was built from.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The generated modulus chain, special prime last.
    pub fn primes(&self) -> &[u64] {
        &self.primes
    }

    /// Generates keys for exactly the rotation amounts in `steps`.
    pub fn generate_rotation_keys(&self, steps: impl IntoIterator<Item = i64>) -> SimRotationKeys {
        let slots = self.slot_count() as i64;

        SimRotationKeys::Steps(
            steps
                .into_iter()
                .map(|s| s.rem_euclid(slots) as usize)
                .collect(),
        )
    }

    fn check_scale(&self, scale: f64, level: usize) -> Result<()> {
        let scale_bits = scale.log2();
        let modulus_bits = self.modulus_bits(level);

        if scale <= 0.0 || scale_bits >= modulus_bits {
            return Err(Error::ScaleOutOfBounds {
                scale_bits,
                modulus_bits,
            });
        }

        Ok(())
    }

    fn check_level(&self, level: usize) -> Result<()> {
        if level > self.top_level() {
            return Err(Error::LevelExhausted {
                from: self.top_level(),
                to: level as i64,
            });
        }

        Ok(())
    }

    fn incompatible(op: &'static str, a: (f64, usize), b: (f64, usize)) -> Error {
        Error::IncompatibleOperands {
            op,
            lhs_scale: a.0,
            rhs_scale: b.0,
            lhs_level: a.1,
            rhs_level: b.1,
        }
    }

    fn zip(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        a.iter().zip(b.iter()).map(|(x, y)| f(*x, *y)).collect()
    }
}

impl HeEngine for SimCkks {
    type Plaintext = SimPlaintext;
    type Ciphertext = SimCiphertext;
    type RotationKeys = SimRotationKeys;

    fn slot_count(&self) -> usize {
        self.params.slot_count()
    }

    fn top_level(&self) -> usize {
        self.primes.len() - 2
    }

    fn rescale_prime(&self, level: usize) -> f64 {
        self.primes[level] as f64
    }

    fn modulus_bits(&self, level: usize) -> f64 {
        self.modulus_bits[level]
    }

    fn encode(&self, values: &[f64], scale: f64, level: usize) -> Result<SimPlaintext> {
        if values.len() > self.slot_count() {
            return Err(Error::SlotOverflow {
                len: values.len(),
                slot_count: self.slot_count(),
            });
        }

        self.check_level(level)?;
        self.check_scale(scale, level)?;

        let mut values = values
            .iter()
            .map(|x| (x * scale).round())
            .collect::<Vec<_>>();
        values.resize(self.slot_count(), 0.0);

        Ok(SimPlaintext {
            values,
            scale,
            level,
        })
    }

    fn decode(&self, pt: &SimPlaintext) -> Result<Vec<f64>> {
        Ok(pt.values.iter().map(|x| x / pt.scale).collect())
    }

    fn encrypt(&self, pt: &SimPlaintext) -> Result<SimCiphertext> {
        let mut rng = self.rng.lock().unwrap();

        let values = pt
            .values
            .iter()
            .map(|x| x + self.noise.sample(&mut *rng).round())
            .collect();

        Ok(SimCiphertext {
            values,
            scale: pt.scale,
            level: pt.level,
        })
    }

    fn decrypt(&self, ct: &SimCiphertext) -> Result<SimPlaintext> {
        let q = self.modulus_bits(ct.level).exp2();

        let values = ct
            .values
            .iter()
            .map(|x| x - q * (x / q).round())
            .collect();

        Ok(SimPlaintext {
            values,
            scale: ct.scale,
            level: ct.level,
        })
    }

    fn add(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        if a.level != b.level || !same_scale(a.scale, b.scale) {
            return Err(Self::incompatible(
                "add",
                (a.scale, a.level),
                (b.scale, b.level),
            ));
        }

        Ok(SimCiphertext {
            values: Self::zip(&a.values, &b.values, |x, y| x + y),
            scale: a.scale,
            level: a.level,
        })
    }

    fn add_plain(&self, a: &SimCiphertext, b: &SimPlaintext) -> Result<SimCiphertext> {
        if a.level != b.level || !same_scale(a.scale, b.scale) {
            return Err(Self::incompatible(
                "add_plain",
                (a.scale, a.level),
                (b.scale, b.level),
            ));
        }

        Ok(SimCiphertext {
            values: Self::zip(&a.values, &b.values, |x, y| x + y),
            scale: a.scale,
            level: a.level,
        })
    }

    fn add_many(&self, cts: &[SimCiphertext]) -> Result<SimCiphertext> {
        let (first, rest) = cts.split_first().ok_or(Error::DimensionMismatch {
            expected: 1,
            actual: 0,
        })?;

        rest.iter().try_fold(first.clone(), |acc, x| self.add(&acc, x))
    }

    fn multiply(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        if a.level != b.level {
            return Err(Self::incompatible(
                "multiply",
                (a.scale, a.level),
                (b.scale, b.level),
            ));
        }

        let scale = a.scale * b.scale;
        self.check_scale(scale, a.level)?;

        Ok(SimCiphertext {
            values: Self::zip(&a.values, &b.values, |x, y| x * y),
            scale,
            level: a.level,
        })
    }

    fn multiply_plain(&self, a: &SimCiphertext, b: &SimPlaintext) -> Result<SimCiphertext> {
        if a.level != b.level {
            return Err(Self::incompatible(
                "multiply_plain",
                (a.scale, a.level),
                (b.scale, b.level),
            ));
        }

        if b.values.iter().all(|x| *x == 0.0) {
            return Err(Error::TransparentCiphertext);
        }

        let scale = a.scale * b.scale;
        self.check_scale(scale, a.level)?;

        Ok(SimCiphertext {
            values: Self::zip(&a.values, &b.values, |x, y| x * y),
            scale,
            level: a.level,
        })
    }

    fn rotate(&self, a: &SimCiphertext, steps: i64, keys: &SimRotationKeys) -> Result<SimCiphertext> {
        let shift = steps.rem_euclid(self.slot_count() as i64) as usize;

        if !keys.allows(shift) {
            return Err(Error::MissingRotationKey { steps });
        }

        let mut values = a.values.clone();
        values.rotate_left(shift);

        Ok(SimCiphertext {
            values,
            scale: a.scale,
            level: a.level,
        })
    }

    fn rescale_to_next(&self, a: &SimCiphertext) -> Result<SimCiphertext> {
        if a.level == 0 {
            return Err(Error::LevelExhausted { from: 0, to: -1 });
        }

        let q = self.rescale_prime(a.level);

        Ok(SimCiphertext {
            values: a.values.iter().map(|x| (x / q).round()).collect(),
            scale: a.scale / q,
            level: a.level - 1,
        })
    }

    fn mod_switch_to_next(&self, a: &SimCiphertext) -> Result<SimCiphertext> {
        if a.level == 0 {
            return Err(Error::LevelExhausted { from: 0, to: -1 });
        }

        self.mod_switch_to(a, a.level - 1)
    }

    fn mod_switch_to(&self, a: &SimCiphertext, level: usize) -> Result<SimCiphertext> {
        if level > a.level {
            return Err(Error::LevelExhausted {
                from: a.level,
                to: level as i64,
            });
        }

        self.check_scale(a.scale, level)?;

        Ok(SimCiphertext {
            values: a.values.clone(),
            scale: a.scale,
            level,
        })
    }

    fn scale(&self, a: &SimCiphertext) -> f64 {
        a.scale
    }

    fn level(&self, a: &SimCiphertext) -> usize {
        a.level
    }

    fn set_scale(&self, a: &mut SimCiphertext, scale: f64) {
        a.scale = scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TRANSPOSE_8192, test_utils::get_transpose_engine};

    fn encrypt(engine: &SimCkks, values: &[f64], scale: f64, level: usize) -> SimCiphertext {
        engine
            .encrypt(&engine.encode(values, scale, level).unwrap())
            .unwrap()
    }

    fn decrypt(engine: &SimCkks, ct: &SimCiphertext) -> Vec<f64> {
        engine.decode(&engine.decrypt(ct).unwrap()).unwrap()
    }

    #[test]
    fn can_roundtrip_with_small_error() {
        let engine = get_transpose_engine();
        let scale = TRANSPOSE_8192.scale();
        let ct = encrypt(engine, &[1.5, -2.25, 3.0], scale, 2);

        let actual = decrypt(engine, &ct);

        assert_eq!(actual.len(), 4096);

        for (a, e) in actual.iter().zip([1.5, -2.25, 3.0, 0.0]) {
            assert!((a - e).abs() < 1e-9);
        }
    }

    #[test]
    fn multiply_then_rescale_restores_scale() {
        let engine = get_transpose_engine();
        let scale = TRANSPOSE_8192.scale();
        let a = encrypt(engine, &[2.0, 3.0], scale, 2);
        let b = encrypt(engine, &[4.0, -1.0], scale, 2);

        let c = engine.multiply(&a, &b).unwrap();
        assert_eq!(engine.scale(&c), scale * scale);

        let c = engine.rescale_to_next(&c).unwrap();
        assert_eq!(engine.level(&c), 1);
        assert_eq!(engine.scale(&c), scale * scale / engine.rescale_prime(2));

        let actual = decrypt(engine, &c);
        assert!((actual[0] - 8.0).abs() < 1e-6);
        assert!((actual[1] + 3.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_mismatched_operands() {
        let engine = get_transpose_engine();
        let scale = TRANSPOSE_8192.scale();
        let a = encrypt(engine, &[1.0], scale, 2);
        let b = encrypt(engine, &[1.0], scale * 2.0, 2);
        let c = engine.mod_switch_to_next(&a).unwrap();

        assert!(matches!(
            engine.add(&a, &b),
            Err(Error::IncompatibleOperands { op: "add", .. })
        ));
        assert!(matches!(
            engine.multiply(&a, &c),
            Err(Error::IncompatibleOperands {
                op: "multiply",
                lhs_level: 2,
                rhs_level: 1,
                ..
            })
        ));
        assert!(engine.add(&a, &a).is_ok());
    }

    #[test]
    fn rejects_transparent_result() {
        let engine = get_transpose_engine();
        let scale = TRANSPOSE_8192.scale();
        let a = encrypt(engine, &[1.0], scale, 2);
        let zero = engine.encode(&[0.0, 1e-15], scale, 2).unwrap();

        assert_eq!(
            engine.multiply_plain(&a, &zero),
            Err(Error::TransparentCiphertext)
        );
    }

    #[test]
    fn rejects_scale_overflow() {
        let engine = get_transpose_engine();
        let scale = TRANSPOSE_8192.scale();
        let a = encrypt(engine, &[1.0], scale, 2);
        let a = engine.mod_switch_to(&a, 0).unwrap();

        // 80 bits of scale can't fit in the 60-bit base prime.
        assert!(matches!(
            engine.multiply(&a, &a),
            Err(Error::ScaleOutOfBounds { .. })
        ));
        assert_eq!(
            engine.rescale_to_next(&a).err(),
            Some(Error::LevelExhausted { from: 0, to: -1 })
        );
        assert_eq!(
            engine.mod_switch_to_next(&a).err(),
            Some(Error::LevelExhausted { from: 0, to: -1 })
        );
    }

    #[test]
    fn overflowing_the_modulus_yields_garbage() {
        let engine = get_transpose_engine();
        let scale = 2f64.powi(50);
        let a = encrypt(engine, &[1000.0], scale, 0);

        // 1000 * 2^50 exceeds half the 60-bit modulus and wraps.
        let actual = decrypt(engine, &a);

        assert!((actual[0] - 1000.0).abs() > 1.0);
    }

    #[test]
    fn rotation_requires_keys() {
        let engine = get_transpose_engine();
        let a = encrypt(engine, &[1.0, 2.0, 3.0], TRANSPOSE_8192.scale(), 2);
        let keys = engine.generate_rotation_keys([1, -4]);

        let left = engine.rotate(&a, 1, &keys).unwrap();
        assert!((decrypt(engine, &left)[0] - 2.0).abs() < 1e-9);

        let right = engine.rotate(&a, -4, &keys).unwrap();
        assert!((decrypt(engine, &right)[5] - 2.0).abs() < 1e-9);

        // 4092 == -4 mod 4096.
        assert!(engine.rotate(&a, 4092, &keys).is_ok());
        assert!(engine.rotate(&a, 0, &keys).is_ok());
        assert_eq!(
            engine.rotate(&a, 2, &keys),
            Err(Error::MissingRotationKey { steps: 2 })
        );
        assert!(engine.rotate(&a, 2, &SimRotationKeys::All).is_ok());
    }
}
