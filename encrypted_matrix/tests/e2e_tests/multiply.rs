use encrypted_matrix::{
    CancelToken, Error, HeEngine, MULTIPLY_16384, Matrix, MatrixConfig, MatrixEvaluator,
    ScaleStrategy,
    engine::plain::PlainSlots,
    test_utils::{get_thread_pool, make_multiply_evaluator},
};

use crate::{init_logging, sample_matrix};

const STRATEGIES: [ScaleStrategy; 2] = [ScaleStrategy::PowerOfTwo, ScaleStrategy::PrimeMatched];

#[test]
fn can_multiply() {
    init_logging();

    for strategy in STRATEGIES {
        let eval = make_multiply_evaluator(strategy);

        for n in [2, 3, 4] {
            let a = sample_matrix(n, 1);
            let b = sample_matrix(n, 2 * n);

            let ct_a = eval.encrypt_matrix(&a).unwrap();
            let ct_b = eval.encrypt_matrix(&b).unwrap();

            let actual = eval
                .decrypt_matrix(&eval.multiply(&ct_a, &ct_b).unwrap())
                .unwrap();
            let expected = a.matmul(&b).unwrap();

            assert!(
                actual.approx_eq(&expected, 1e-3),
                "{strategy:?} n={n}: {actual:?} != {expected:?}"
            );
        }
    }
}

#[test]
fn can_square_2x2() {
    let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    let expected = Matrix::from_rows(&[vec![7.0, 10.0], vec![15.0, 22.0]]).unwrap();

    for strategy in STRATEGIES {
        let eval = make_multiply_evaluator(strategy);
        let ct = eval.encrypt_matrix(&a).unwrap();

        let product = eval.multiply(&ct, &ct).unwrap();

        let engine = eval.engine();
        assert_eq!(engine.level(product.ciphertext()), engine.top_level() - 1);

        let actual = eval.decrypt_matrix(&product).unwrap();
        assert!(actual.approx_eq(&expected, 1e-3), "{strategy:?}: {actual:?}");
    }
}

#[test]
fn multiplying_by_identity_is_noop() {
    let eval = make_multiply_evaluator(ScaleStrategy::default());
    let a = sample_matrix(3, 4);

    let ct_a = eval.encrypt_matrix(&a).unwrap();
    let ct_i = eval.encrypt_matrix(&Matrix::identity(3)).unwrap();

    let left = eval.decrypt_matrix(&eval.multiply(&ct_i, &ct_a).unwrap()).unwrap();
    let right = eval.decrypt_matrix(&eval.multiply(&ct_a, &ct_i).unwrap()).unwrap();

    assert!(left.approx_eq(&a, 1e-3));
    assert!(right.approx_eq(&a, 1e-3));
}

#[test]
fn plaintext_simulation_is_exact() {
    let engine = PlainSlots::new(64, 1);
    let config = MatrixConfig {
        epsilon: 0.0,
        ..MatrixConfig::default()
    };

    for strategy in STRATEGIES {
        let eval = MatrixEvaluator::new(
            &engine,
            &(),
            MatrixConfig {
                scale_strategy: strategy,
                ..config
            },
        )
        .unwrap();

        for n in [2, 3, 4, 5] {
            let a = Matrix::from_fn(n, |i, j| (i * n + j + 1) as f64);
            let b = Matrix::from_fn(n, |i, j| i as f64 - 2.0 * j as f64);

            let ct_a = eval.encrypt_matrix(&a).unwrap();
            let ct_b = eval.encrypt_matrix(&b).unwrap();

            let actual = eval
                .decrypt_matrix(&eval.multiply(&ct_a, &ct_b).unwrap())
                .unwrap();

            assert_eq!(actual, a.matmul(&b).unwrap());
        }
    }
}

#[test]
fn thread_pool_matches_sequential() {
    let sequential = make_multiply_evaluator(ScaleStrategy::PrimeMatched);
    let pooled =
        make_multiply_evaluator(ScaleStrategy::PrimeMatched).with_thread_pool(get_thread_pool());

    let ct_a = sequential.encrypt_matrix(&sample_matrix(4, 9)).unwrap();
    let ct_b = sequential.encrypt_matrix(&sample_matrix(4, 10)).unwrap();

    let a = sequential.multiply(&ct_a, &ct_b).unwrap();
    let b = pooled.multiply(&ct_a, &ct_b).unwrap();

    assert_eq!(a.ciphertext(), b.ciphertext());
}

#[test]
fn cancelled_multiply_returns_error() {
    let eval = make_multiply_evaluator(ScaleStrategy::default());
    let ct = eval.encrypt_matrix(&sample_matrix(2, 0)).unwrap();
    let cancel = CancelToken::new();

    cancel.cancel();

    assert_eq!(
        eval.multiply_with_cancel(&ct, &ct, &cancel).err(),
        Some(Error::Cancelled)
    );
}

#[test]
fn product_scale_is_prescribed() {
    let eval = make_multiply_evaluator(ScaleStrategy::PrimeMatched);
    let ct = eval.encrypt_matrix(&sample_matrix(2, 3)).unwrap();

    let product = eval.multiply(&ct, &ct).unwrap();
    let scale = eval.engine().scale(product.ciphertext());
    let expected = MULTIPLY_16384.scale().powi(4);

    assert!((scale / expected - 1.0).abs() < 1e-12);
}
