use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{
    MULTIPLY_16384, MatrixConfig, MatrixEvaluator, ScaleStrategy, TRANSPOSE_8192,
    engine::sim::{SimCkks, SimRotationKeys},
};

static ALL_ROTATIONS: SimRotationKeys = SimRotationKeys::All;

/// A shared [`TRANSPOSE_8192`] simulator.
pub fn get_transpose_engine() -> &'static SimCkks {
    static ENGINE: OnceLock<SimCkks> = OnceLock::new();

    ENGINE.get_or_init(|| SimCkks::new(&TRANSPOSE_8192, 1234).unwrap())
}

/// A shared [`MULTIPLY_16384`] simulator.
pub fn get_multiply_engine() -> &'static SimCkks {
    static ENGINE: OnceLock<SimCkks> = OnceLock::new();

    ENGINE.get_or_init(|| SimCkks::new(&MULTIPLY_16384, 5678).unwrap())
}

/// A shared rayon pool for concurrency tests.
pub fn get_thread_pool() -> Arc<ThreadPool> {
    static THREAD_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();

    THREAD_POOL
        .get_or_init(|| {
            Arc::new(
                ThreadPoolBuilder::new()
                    .thread_name(|x| format!("Matrix worker {x}"))
                    .build()
                    .unwrap(),
            )
        })
        .clone()
}

/// An evaluator over the [`TRANSPOSE_8192`] simulator with keys for every rotation.
pub fn make_transpose_evaluator() -> MatrixEvaluator<'static, SimCkks> {
    MatrixEvaluator::new(
        get_transpose_engine(),
        &ALL_ROTATIONS,
        MatrixConfig::from_params(&TRANSPOSE_8192),
    )
    .unwrap()
}

/// An evaluator over the [`MULTIPLY_16384`] simulator with keys for every rotation.
pub fn make_multiply_evaluator(strategy: ScaleStrategy) -> MatrixEvaluator<'static, SimCkks> {
    let config = MatrixConfig {
        scale_strategy: strategy,
        ..MatrixConfig::from_params(&MULTIPLY_16384)
    };

    MatrixEvaluator::new(get_multiply_engine(), &ALL_ROTATIONS, config).unwrap()
}
