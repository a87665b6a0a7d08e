use std::{borrow::Cow, collections::HashMap};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A CKKS parameter set.
///
/// # Remarks
/// The coefficient modulus is a chain of primes `q_0, q_1, ..., q_k`, each with
/// `coeff_modulus_bits[i]` bits and each `1 mod 2N` so the NTT exists. The last prime is the
/// "special" prime reserved for key switching and never holds data, so freshly encrypted
/// ciphertexts sit at level `k - 1` and every rescale peels one data prime off the top of the
/// chain. Level `0` (modulus `q_0`) is the last level that can be decrypted, so `q_0` should be
/// large enough to hold the final scale plus the integer part of the result.
///
/// The fixed-point scale is `2^scale_bits`. Intermediate primes are typically chosen close to
/// the scale so rescaling approximately restores it.
pub struct Params {
    /// The ring dimension `N`. Ciphertexts have `N / 2` slots.
    pub poly_modulus_degree: usize,

    /// Bit sizes of the primes in the coefficient modulus chain, special prime last.
    pub coeff_modulus_bits: Cow<'static, [u32]>,

    /// log2 of the default encoding scale.
    pub scale_bits: u32,
}

impl Params {
    /// The number of complex slots, `N / 2`.
    pub fn slot_count(&self) -> usize {
        self.poly_modulus_degree / 2
    }

    /// The default encoding scale, `2^scale_bits`.
    pub fn scale(&self) -> f64 {
        2f64.powi(self.scale_bits as i32)
    }

    /// The level freshly encrypted ciphertexts start at: the number of data primes minus one.
    pub fn top_level(&self) -> usize {
        self.coeff_modulus_bits.len().saturating_sub(2)
    }

    /// Checks that these parameters describe a usable, 128-bit secure CKKS context.
    pub fn validate(&self) -> Result<()> {
        let n = self.poly_modulus_degree;

        if !n.is_power_of_two() || !(1024..=32768).contains(&n) {
            return Err(Error::InvalidParams(format!(
                "poly_modulus_degree {n} must be a power of two in [1024, 32768]"
            )));
        }

        if self.coeff_modulus_bits.len() < 2 {
            return Err(Error::InvalidParams(
                "coefficient modulus needs at least one data prime and a special prime".to_owned(),
            ));
        }

        if let Some(b) = self
            .coeff_modulus_bits
            .iter()
            .find(|b| !(MIN_PRIME_BITS..=MAX_PRIME_BITS).contains(*b))
        {
            return Err(Error::InvalidParams(format!(
                "prime bit size {b} is outside [{MIN_PRIME_BITS}, {MAX_PRIME_BITS}]"
            )));
        }

        let total: u32 = self.coeff_modulus_bits.iter().sum();
        let max = max_secure_modulus_bits(n);

        if total > max {
            return Err(Error::InvalidParams(format!(
                "{total}-bit coefficient modulus exceeds the {max}-bit maximum for N={n}"
            )));
        }

        if self.scale_bits == 0 || self.scale_bits >= self.coeff_modulus_bits[0] {
            return Err(Error::InvalidParams(format!(
                "scale_bits {} must be nonzero and below the {}-bit base prime",
                self.scale_bits, self.coeff_modulus_bits[0]
            )));
        }

        Ok(())
    }

    /// Generates the NTT-friendly primes of the coefficient modulus chain.
    ///
    /// # Remarks
    /// For every bit size `b`, candidates `q = 1 mod 2N` are searched downward from `2^b`, so
    /// each prime lies in `[2^(b-1), 2^b)`. Requesting the same bit size several times yields
    /// distinct primes.
    pub fn generate_primes(&self) -> Result<Vec<u64>> {
        self.validate()?;

        let two_n = 2 * self.poly_modulus_degree as u64;
        let mut next = HashMap::<u32, u64>::new();

        self.coeff_modulus_bits
            .iter()
            .map(|&bits| {
                let lower = 1u64 << (bits - 1);
                let start = *next.entry(bits).or_insert_with(|| {
                    let upper = 1u64 << bits;
                    upper - (upper % two_n) + 1 - two_n
                });

                let mut candidate = start;

                while candidate >= lower {
                    if is_prime(candidate) {
                        next.insert(bits, candidate - two_n);
                        return Ok(candidate);
                    }

                    candidate -= two_n;
                }

                Err(Error::InvalidParams(format!(
                    "ran out of {bits}-bit NTT-friendly primes for N={}",
                    self.poly_modulus_degree
                )))
            })
            .collect()
    }
}

impl Default for Params {
    fn default() -> Self {
        MULTIPLY_16384
    }
}

const MIN_PRIME_BITS: u32 = 20;
const MAX_PRIME_BITS: u32 = 60;

/// The largest coefficient modulus, in bits, that keeps ring dimension `n` at 128-bit security
/// against classical attacks (HomomorphicEncryption.org standard).
pub fn max_secure_modulus_bits(n: usize) -> u32 {
    match n {
        1024 => 27,
        2048 => 54,
        4096 => 109,
        8192 => 218,
        16384 => 438,
        32768 => 881,
        _ => 0,
    }
}

/// Enough levels to transpose: one plaintext multiplication.
pub const TRANSPOSE_8192: Params = Params {
    poly_modulus_degree: 8192,
    coeff_modulus_bits: Cow::Borrowed(&[60, 40, 40, 60]),
    scale_bits: 40,
};

/// Enough levels to multiply: two plaintext multiplications, a rescale, and a ciphertext
/// multiplication.
pub const MULTIPLY_16384: Params = Params {
    poly_modulus_degree: 16384,
    coeff_modulus_bits: Cow::Borrowed(&[60, 40, 40, 40, 40, 60]),
    scale_bits: 40,
};

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1;
    base %= m;

    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }

        base = mul_mod(base, base, m);
        exp >>= 1;
    }

    result
}

/// Deterministic Miller-Rabin, exact for every `u64`.
fn is_prime(n: u64) -> bool {
    const BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

    if n < 2 {
        return false;
    }

    for p in BASES {
        if n % p == 0 {
            return n == p;
        }
    }

    let s = (n - 1).trailing_zeros();
    let d = (n - 1) >> s;

    'witness: for a in BASES {
        let mut x = pow_mod(a, d, n);

        if x == 1 || x == n - 1 {
            continue;
        }

        for _ in 1..s {
            x = mul_mod(x, x, n);

            if x == n - 1 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}
