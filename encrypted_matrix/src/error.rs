#[derive(Debug, Clone, PartialEq, thiserror::Error)]
/// Errors produced while building selectors, validating parameters or running the encrypted
/// pipeline.
///
/// # Remarks
/// The configuration variants ([`Error::InvalidDimension`], [`Error::InsufficientSlots`],
/// [`Error::UnsupportedSlotLayout`], [`Error::InsufficientLevels`],
/// [`Error::InsufficientModulus`], [`Error::UnalignedScale`], [`Error::InvalidParams`] and
/// [`Error::DimensionMismatch`])
/// are always reported before any HE operation runs. None of these errors are transient; HE
/// operations are deterministic so retrying never helps.
pub enum Error {
    /// Matrices must be at least 2x2.
    #[error("Matrix dimension {n} is unsupported: {reason}")]
    InvalidDimension {
        /// The offending dimension.
        n: usize,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The flattened matrix doesn't fit in a single ciphertext.
    #[error("A {n}x{n} matrix needs {required} slots, but only {slot_count} are available")]
    InsufficientSlots {
        /// The matrix dimension.
        n: usize,
        /// `n^2`.
        required: usize,
        /// The engine's slot count.
        slot_count: usize,
    },

    /// The diagonal method duplicates the input into slots `[n^2, 2n^2)` before rotating. This
    /// requires either `2n^2 <= slot_count` or `n^2 == slot_count`.
    #[error(
        "{required} diagonal slots cannot be folded into {slot_count} slots; need 2 * {required} <= slot count or an exact fit"
    )]
    UnsupportedSlotLayout {
        /// `n^2`.
        required: usize,
        /// The engine's slot count.
        slot_count: usize,
    },

    /// The modulus chain doesn't have enough levels left for the operation.
    #[error("Operation requires {required} level(s) below the input, but the input is at level {level}")]
    InsufficientLevels {
        /// Levels the operation consumes.
        required: usize,
        /// The level of the input ciphertext.
        level: usize,
    },

    /// The final scale of an operation would not fit in the remaining modulus.
    #[error("Result scale needs {required_bits:.1} bits but only {available_bits:.1} are available")]
    InsufficientModulus {
        /// log2 of the scale the result would carry.
        required_bits: f64,
        /// Bit size of the modulus at the result's level.
        available_bits: f64,
    },

    /// Snapping a rescaled correction term to a power of two doesn't land it on the scale of
    /// the base product, so [`crate::ScaleStrategy::PowerOfTwo`] can't be used.
    #[error(
        "Rescaled correction scale 2^{rescaled_bits:.2} snaps to 2^{snapped_bits:.2}, not the base scale 2^{base_bits:.2}"
    )]
    UnalignedScale {
        /// log2 of the base product's per-operand scale.
        base_bits: f64,
        /// log2 of a correction term's scale after rescaling.
        rescaled_bits: f64,
        /// log2 of that scale after snapping to a power of two.
        snapped_bits: f64,
    },

    /// A parameter set is malformed.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Two operands or a matrix and its claimed shape disagree.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected length or dimension.
        expected: usize,
        /// The length or dimension that was supplied.
        actual: usize,
    },

    /// Two ciphertexts had different scales or levels and couldn't be normalized.
    #[error(
        "Incompatible operands for {op}: scales ({lhs_scale:e}, {rhs_scale:e}), levels ({lhs_level}, {rhs_level})"
    )]
    IncompatibleOperands {
        /// The operation being attempted.
        op: &'static str,
        /// Scale of the left operand.
        lhs_scale: f64,
        /// Scale of the right operand.
        rhs_scale: f64,
        /// Level of the left operand.
        lhs_level: usize,
        /// Level of the right operand.
        rhs_level: usize,
    },

    /// Attempted to rescale or modulus switch past the end of the modulus chain, or to switch to
    /// a higher level.
    #[error("Cannot move from level {from} to level {to}")]
    LevelExhausted {
        /// The ciphertext's current level.
        from: usize,
        /// The requested level, `-1` when moving past level `0`.
        to: i64,
    },

    /// A result's scale exceeds the modulus at its level.
    #[error("Scale 2^{scale_bits:.1} is out of bounds for a {modulus_bits:.1}-bit modulus")]
    ScaleOutOfBounds {
        /// log2 of the offending scale.
        scale_bits: f64,
        /// Bit size of the modulus at the operand's level.
        modulus_bits: f64,
    },

    /// The operation would produce a ciphertext that decrypts without the secret key.
    #[error("Result ciphertext is transparent")]
    TransparentCiphertext,

    /// No rotation key was provisioned for the requested step count.
    #[error("No rotation key for {steps} step(s)")]
    MissingRotationKey {
        /// The rotation amount.
        steps: i64,
    },

    /// More values than slots were supplied to the encoder.
    #[error("Cannot encode {len} values into {slot_count} slots")]
    SlotOverflow {
        /// Number of values.
        len: usize,
        /// Slots available.
        slot_count: usize,
    },

    /// The operation was cancelled through its [`crate::CancelToken`].
    #[error("Operation cancelled")]
    Cancelled,
}

/// A [`std::result::Result`] whose error is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
