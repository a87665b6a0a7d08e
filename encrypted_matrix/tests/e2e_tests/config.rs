use encrypted_matrix::{
    EncryptedMatrix, Error, HeEngine, MULTIPLY_16384, Matrix, MatrixConfig, MatrixEvaluator,
    ScaleStrategy, TRANSPOSE_8192,
    engine::sim::SimRotationKeys,
    test_utils::{
        get_multiply_engine, get_transpose_engine, make_multiply_evaluator,
        make_transpose_evaluator,
    },
};

use crate::sample_matrix;

#[test]
fn rejects_1x1() {
    let eval = make_transpose_evaluator();

    assert!(matches!(
        eval.encrypt_matrix(&Matrix::identity(1)),
        Err(Error::InvalidDimension { n: 1, .. })
    ));
}

#[test]
fn rejects_matrices_larger_than_slots() {
    let eval = make_transpose_evaluator();

    assert_eq!(
        eval.encrypt_matrix(&Matrix::identity(65)).err().unwrap(),
        Error::InsufficientSlots {
            n: 65,
            required: 4225,
            slot_count: 4096
        }
    );

    // Fits, but leaves no room to fold.
    assert_eq!(
        eval.encrypt_matrix(&Matrix::identity(50)).err().unwrap(),
        Error::UnsupportedSlotLayout {
            required: 2500,
            slot_count: 4096
        }
    );
}

#[test]
fn transpose_chain_cannot_multiply() {
    let keys = SimRotationKeys::All;
    let config = MatrixConfig {
        scale_strategy: ScaleStrategy::PowerOfTwo,
        ..MatrixConfig::from_params(&TRANSPOSE_8192)
    };
    let eval = MatrixEvaluator::new(get_transpose_engine(), &keys, config).unwrap();

    let ct = eval.encrypt_matrix(&sample_matrix(2, 0)).unwrap();

    assert!(matches!(
        eval.multiply(&ct, &ct),
        Err(Error::InsufficientModulus { .. })
    ));
}

#[test]
fn rejects_level_zero_inputs() {
    let eval = make_multiply_evaluator(ScaleStrategy::default());
    let engine = eval.engine();

    let ct = eval.encrypt_matrix(&sample_matrix(2, 0)).unwrap();
    let ct = EncryptedMatrix::from_ciphertext(engine.mod_switch_to(ct.ciphertext(), 0).unwrap(), 2);

    assert_eq!(
        eval.multiply(&ct, &ct).err(),
        Some(Error::InsufficientLevels {
            required: 1,
            level: 0
        })
    );
}

#[test]
fn rejects_transpose_without_modulus() {
    let eval = make_transpose_evaluator();
    let engine = eval.engine();

    let ct = eval.encrypt_matrix(&sample_matrix(2, 0)).unwrap();
    let ct = EncryptedMatrix::from_ciphertext(engine.mod_switch_to(ct.ciphertext(), 0).unwrap(), 2);

    // 80 bits of scale don't fit the 60-bit base prime.
    assert!(matches!(
        eval.transpose(&ct),
        Err(Error::InsufficientModulus { .. })
    ));
}

#[test]
fn power_of_two_rejects_scale_off_the_prime_size() {
    let keys = SimRotationKeys::All;
    let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    let expected = a.matmul(&a).unwrap();

    let config = |scale_strategy| MatrixConfig {
        scale: 2f64.powi(30),
        scale_strategy,
        ..MatrixConfig::from_params(&MULTIPLY_16384)
    };

    // 2^30 * 2^30 / q lands near 2^50, nowhere near the 2^60 base scale.
    let eval = MatrixEvaluator::new(
        get_multiply_engine(),
        &keys,
        config(ScaleStrategy::PowerOfTwo),
    )
    .unwrap();
    let ct = eval.encrypt_matrix(&a).unwrap();

    match eval.multiply(&ct, &ct) {
        Err(Error::UnalignedScale {
            base_bits,
            snapped_bits,
            ..
        }) => {
            assert_eq!(base_bits, 60.0);
            assert_eq!(snapped_bits, 50.0);
        }
        x => panic!("expected UnalignedScale, got {x:?}"),
    }

    let eval = MatrixEvaluator::new(
        get_multiply_engine(),
        &keys,
        config(ScaleStrategy::PrimeMatched),
    )
    .unwrap();
    let ct = eval.encrypt_matrix(&a).unwrap();
    let actual = eval.decrypt_matrix(&eval.multiply(&ct, &ct).unwrap()).unwrap();

    assert!(actual.approx_eq(&expected, 1e-3), "{actual:?}");
}
