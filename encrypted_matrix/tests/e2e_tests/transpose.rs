use encrypted_matrix::{
    CancelToken, Error, HeEngine, Matrix, MatrixConfig, MatrixEvaluator, TRANSPOSE_8192,
    engine::{plain::PlainSlots, sim::SimRotationKeys},
    required_rotations,
    test_utils::{get_thread_pool, get_transpose_engine, make_transpose_evaluator},
};

use crate::{init_logging, sample_matrix};

#[test]
fn can_transpose() {
    init_logging();

    let eval = make_transpose_evaluator();

    for n in [2, 3, 4] {
        let a = sample_matrix(n, n);
        let ct = eval.encrypt_matrix(&a).unwrap();

        let actual = eval.decrypt_matrix(&eval.transpose(&ct).unwrap()).unwrap();

        assert!(actual.approx_eq(&a.transpose(), 1e-3), "n={n}: {actual:?}");
    }
}

#[test]
fn transpose_4x4_sequence() {
    let a = Matrix::from_fn(4, |i, j| (i * 4 + j + 1) as f64);

    // Exact when simulated without encryption.
    let engine = PlainSlots::new(32, 2);
    let config = MatrixConfig {
        epsilon: 0.0,
        ..MatrixConfig::default()
    };
    let plain = MatrixEvaluator::new(&engine, &(), config).unwrap();
    let ct = plain.encrypt_matrix(&a).unwrap();

    assert_eq!(
        plain.decrypt_matrix(&plain.transpose(&ct).unwrap()).unwrap(),
        a.transpose()
    );

    let eval = make_transpose_evaluator();
    let ct = eval.encrypt_matrix(&a).unwrap();
    let actual = eval.decrypt_matrix(&eval.transpose(&ct).unwrap()).unwrap();

    assert!(actual.approx_eq(&a.transpose(), 1e-3));
    assert_eq!(actual.get(0, 1).round(), 5.0);
    assert_eq!(actual.get(3, 0).round(), 4.0);
}

#[test]
fn transposing_twice_is_identity() {
    let eval = make_transpose_evaluator();
    let a = sample_matrix(3, 11);

    let ct = eval.encrypt_matrix(&a).unwrap();
    let once = eval.transpose(&ct).unwrap();
    let twice = eval.transpose(&once).unwrap();

    let engine = eval.engine();
    assert_eq!(engine.level(twice.ciphertext()), engine.top_level());
    assert_eq!(
        engine.scale(twice.ciphertext()),
        TRANSPOSE_8192.scale().powi(3)
    );

    let actual = eval.decrypt_matrix(&twice).unwrap();
    assert!(actual.approx_eq(&a, 1e-3));
}

#[test]
fn thread_pool_matches_sequential() {
    let sequential = make_transpose_evaluator();
    let pooled = make_transpose_evaluator().with_thread_pool(get_thread_pool());

    let ct = sequential.encrypt_matrix(&sample_matrix(4, 3)).unwrap();

    let a = sequential.transpose(&ct).unwrap();
    let b = pooled.transpose(&ct).unwrap();

    assert_eq!(a.ciphertext(), b.ciphertext());
}

#[test]
fn transpose_needs_nonzero_epsilon() {
    let keys = SimRotationKeys::All;
    let config = MatrixConfig {
        epsilon: 0.0,
        ..MatrixConfig::from_params(&TRANSPOSE_8192)
    };
    let eval = MatrixEvaluator::new(get_transpose_engine(), &keys, config).unwrap();

    let ct = eval.encrypt_matrix(&sample_matrix(2, 0)).unwrap();

    // The 2x2 transpose has an all-zero diagonal.
    assert_eq!(eval.transpose(&ct).err(), Some(Error::TransparentCiphertext));
}

#[test]
fn transpose_with_provisioned_keys() {
    let engine = get_transpose_engine();
    let keys = engine.generate_rotation_keys(required_rotations(3));
    let eval =
        MatrixEvaluator::new(engine, &keys, MatrixConfig::from_params(&TRANSPOSE_8192)).unwrap();

    let a = sample_matrix(3, 5);
    let ct = eval.encrypt_matrix(&a).unwrap();
    let actual = eval.decrypt_matrix(&eval.transpose(&ct).unwrap()).unwrap();

    assert!(actual.approx_eq(&a.transpose(), 1e-3));

    // Keys for 3x3 don't cover the 4x4 fold.
    let ct = eval.encrypt_matrix(&sample_matrix(4, 5)).unwrap();

    assert_eq!(
        eval.transpose(&ct).err(),
        Some(Error::MissingRotationKey { steps: -16 })
    );
}

#[test]
fn cancelled_transpose_returns_error() {
    let eval = make_transpose_evaluator();
    let ct = eval.encrypt_matrix(&sample_matrix(3, 1)).unwrap();
    let cancel = CancelToken::new();

    cancel.cancel();

    assert_eq!(
        eval.transpose_with_cancel(&ct, &cancel).err(),
        Some(Error::Cancelled)
    );
}
