use crate::Result;

/// An identity "engine" over raw slot vectors, used to simulate the diagonal method without
/// encryption.
pub mod plain;

/// A CKKS simulator that faithfully tracks scales, levels and the modulus chain.
pub mod sim;

/// The homomorphic encryption operations the matrix pipeline consumes.
///
/// # Remarks
/// Implementations wrap a CKKS-style engine: ciphertexts hold vectors of reals in `slot_count()`
/// slots, carry a fixed-point scale, and sit at a level in a modulus chain where level `0` is
/// the last level that can be decrypted. Key generation and key management stay with the
/// implementation; [`HeEngine::RotationKeys`] is whatever the engine needs to rotate.
///
/// Operations that combine ciphertexts (`add`, `add_many`) require identical scales and
/// levels, and `multiply`/`multiply_plain` require identical levels. The matrix pipeline
/// normalizes operands before calling them, so an implementation should reject mismatches
/// rather than silently fix them up.
///
/// The pipeline may issue operations concurrently from a rayon pool, hence the `Sync` bounds.
pub trait HeEngine: Sync {
    /// An encoded, unencrypted message.
    type Plaintext: Send + Sync;

    /// An encrypted message.
    type Ciphertext: Clone + Send + Sync;

    /// The key material [`HeEngine::rotate`] needs.
    type RotationKeys: Sync;

    /// The number of slots in a ciphertext.
    fn slot_count(&self) -> usize;

    /// The level freshly encrypted ciphertexts start at.
    fn top_level(&self) -> usize;

    /// The prime [`HeEngine::rescale_to_next`] divides out when rescaling from `level`.
    fn rescale_prime(&self, level: usize) -> f64;

    /// The bit size of the ciphertext modulus at `level`.
    fn modulus_bits(&self, level: usize) -> f64;

    /// Encodes `values` (zero-padded to the slot count) at `scale` for use at `level`.
    fn encode(&self, values: &[f64], scale: f64, level: usize) -> Result<Self::Plaintext>;

    /// Decodes every slot of `pt`.
    fn decode(&self, pt: &Self::Plaintext) -> Result<Vec<f64>>;

    /// Encrypts `pt` at the level it was encoded for.
    fn encrypt(&self, pt: &Self::Plaintext) -> Result<Self::Ciphertext>;

    /// Decrypts `ct`. The result keeps the ciphertext's scale.
    fn decrypt(&self, ct: &Self::Ciphertext) -> Result<Self::Plaintext>;

    /// Adds two ciphertexts with identical scales and levels.
    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Adds a plaintext encoded at `a`'s scale and level.
    fn add_plain(&self, a: &Self::Ciphertext, b: &Self::Plaintext) -> Result<Self::Ciphertext>;

    /// Sums `cts`, which must be nonempty.
    fn add_many(&self, cts: &[Self::Ciphertext]) -> Result<Self::Ciphertext>;

    /// Multiplies two ciphertexts. The result's scale is the product of the inputs' scales.
    fn multiply(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Multiplies a ciphertext by a plaintext. Engines should refuse to produce transparent
    /// results.
    fn multiply_plain(
        &self,
        a: &Self::Ciphertext,
        b: &Self::Plaintext,
    ) -> Result<Self::Ciphertext>;

    /// Cyclically rotates the slots left by `steps` (right when negative).
    fn rotate(
        &self,
        a: &Self::Ciphertext,
        steps: i64,
        keys: &Self::RotationKeys,
    ) -> Result<Self::Ciphertext>;

    /// Divides out [`HeEngine::rescale_prime`] at the ciphertext's level and drops one level.
    fn rescale_to_next(&self, a: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Drops one level without changing the scale.
    fn mod_switch_to_next(&self, a: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Drops levels until `a` is at `level`.
    fn mod_switch_to(&self, a: &Self::Ciphertext, level: usize) -> Result<Self::Ciphertext>;

    /// The scale `a` is encoded at.
    fn scale(&self, a: &Self::Ciphertext) -> f64;

    /// The scale [`HeEngine::multiply_plain`] produces from a ciphertext at `ct_scale` and a
    /// plaintext encoded at `pt_scale`.
    fn plain_product_scale(&self, ct_scale: f64, pt_scale: f64) -> f64 {
        ct_scale * pt_scale
    }

    /// The level of `a` in the modulus chain.
    fn level(&self, a: &Self::Ciphertext) -> usize;

    /// Overwrites the scale metadata of `a` without touching its contents.
    fn set_scale(&self, a: &mut Self::Ciphertext, scale: f64);
}

/// Whether two scales are equal up to floating point noise.
pub fn same_scale(a: f64, b: f64) -> bool {
    (a - b).abs() <= a.abs().max(b.abs()) * f64::EPSILON * 16.0
}
