#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Transposes and multiplies CKKS-encrypted square matrices without decrypting them.
//!
//! An `n x n` matrix is flattened row-major into the first `n^2` slots of a single ciphertext.
//! Transposition and the realignment steps of multiplication are `n^2 x n^2` permutations
//! ([`encoder`]), which are applied to ciphertexts with the diagonal method: each permutation's
//! cyclic diagonals ([`diagonals`]) are encoded as plaintexts and combined with rotations of the
//! input ([`transform`]). Multiplication ([`multiply`]) realigns both operands, then sums `n`
//! slotwise products of shifted realignments while keeping every term's scale and level
//! compatible.
//!
//! The crate is generic over the CKKS implementation through the [`HeEngine`] trait. Two
//! engines ship with it: [`engine::plain::PlainSlots`], which runs the pipeline on unencrypted
//! slots, and [`engine::sim::SimCkks`], which simulates CKKS's scale, level and modulus
//! bookkeeping.
//!
//! # Example
//!
//! ```rust
//! use encrypted_matrix::{
//!     MULTIPLY_16384, Matrix, MatrixConfig, MatrixEvaluator, required_rotations,
//!     engine::sim::SimCkks,
//! };
//!
//! let engine = SimCkks::new(&MULTIPLY_16384, 42).unwrap();
//! let keys = engine.generate_rotation_keys(required_rotations(2));
//! let eval = MatrixEvaluator::new(&engine, &keys, MatrixConfig::from_params(&MULTIPLY_16384))
//!     .unwrap();
//!
//! let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
//! let ct = eval.encrypt_matrix(&a).unwrap();
//!
//! let product = eval.decrypt_matrix(&eval.multiply(&ct, &ct).unwrap()).unwrap();
//! let transpose = eval.decrypt_matrix(&eval.transpose(&ct).unwrap()).unwrap();
//!
//! assert!(product.approx_eq(&a.matmul(&a).unwrap(), 1e-3));
//! assert!(transpose.approx_eq(&a.transpose(), 1e-3));
//! ```

mod cancel;
pub use cancel::*;

/// Builds the selector (permutation) matrices used by transposition and multiplication.
pub mod encoder;

/// Extracts the cyclic diagonals of selector matrices.
pub mod diagonals;
pub use diagonals::DEFAULT_EPSILON;

/// The homomorphic encryption engine abstraction and its implementations.
pub mod engine;
pub use engine::HeEngine;

mod error;
pub use error::*;

mod evaluator;
pub use evaluator::*;

mod matrix;
pub use matrix::*;

/// Encrypted matrix multiplication.
pub mod multiply;
pub use multiply::ScaleStrategy;

mod params;
pub use params::*;

#[doc(hidden)]
pub mod test_utils;

/// Applies encoded diagonals to ciphertexts.
pub mod transform;
pub use transform::required_rotations;
