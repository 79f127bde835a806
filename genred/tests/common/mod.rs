#![allow(dead_code)]

use genred::{Planner, PlannerConfig, Reduction};
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random(rng: &mut StdRng, shape: (usize, usize)) -> Array2<f64> {
    Array2::from_shape_fn(shape, |_| rng.gen_range(-1.0..1.0))
}

/// Sequential planner with tiles small enough that every test grid is split
pub fn small_tiles() -> Arc<Planner> {
    Arc::new(Planner::new(PlannerConfig {
        tile_rows: 4,
        tile_cols: 3,
        dense_threshold: 0,
        parallel: false,
        ..Default::default()
    }))
}

pub fn with_planner(r: &Reduction, planner: Arc<Planner>) -> Reduction {
    Reduction::with_planner(r.formula().clone(), r.backend(), planner)
}

pub fn assert_close(actual: &Array2<f64>, expected: &Array2<f64>, tol: f64) {
    assert_eq!(actual.dim(), expected.dim());
    for ((index, a), e) in actual.indexed_iter().zip(expected.iter()) {
        assert!(
            approx::relative_eq!(*a, *e, epsilon = tol, max_relative = tol),
            "{:?}: {} != {}",
            index,
            a,
            e
        );
    }
}
