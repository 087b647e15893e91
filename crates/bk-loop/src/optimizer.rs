//! Numeric maximization of acquisition functions over a parameter space.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use bk_acquisition::AcquisitionFunction;
use bk_models::SurrogateModel;
use bk_types::{BkResult, ParameterSpace, Point};

use crate::design::sample_point;

/// Candidates scored per maximization unless configured otherwise.
const DEFAULT_CANDIDATE_COUNT: usize = 1000;

/// Proposes the point maximizing an acquisition function.
pub trait AcquisitionOptimizer: Send + Sync {
    fn maximize(
        &mut self,
        acquisition: &dyn AcquisitionFunction,
        model: &dyn SurrogateModel,
        space: &ParameterSpace,
    ) -> BkResult<Point>;

    fn name(&self) -> &str {
        "acquisition_optimizer"
    }
}

/// Random-search maximizer: draws a fresh uniform candidate set, scores it,
/// and keeps the argmax. Ties keep the earliest candidate so fixed-seed runs
/// reproduce exactly.
pub struct RandomSearchOptimizer {
    candidate_count: usize,
    rng: ChaCha8Rng,
}

impl RandomSearchOptimizer {
    pub fn new() -> Self {
        Self {
            candidate_count: DEFAULT_CANDIDATE_COUNT,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            candidate_count: DEFAULT_CANDIDATE_COUNT,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn candidate_count(mut self, count: usize) -> Self {
        self.candidate_count = count.max(1);
        self
    }
}

impl Default for RandomSearchOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionOptimizer for RandomSearchOptimizer {
    fn maximize(
        &mut self,
        acquisition: &dyn AcquisitionFunction,
        model: &dyn SurrogateModel,
        space: &ParameterSpace,
    ) -> BkResult<Point> {
        // Draw sequentially so the RNG stream stays deterministic, then
        // score in parallel.
        let mut candidates = Vec::with_capacity(self.candidate_count);
        for _ in 0..self.candidate_count {
            candidates.push(sample_point(space, &mut self.rng)?);
        }
        let encoded = candidates
            .iter()
            .map(|point| space.encode(point))
            .collect::<BkResult<Vec<_>>>()?;

        let scores = encoded
            .par_iter()
            .map(|x| acquisition.evaluate(model, x))
            .collect::<BkResult<Vec<f64>>>()?;

        let mut best_index = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (index, score) in scores.iter().enumerate() {
            if *score > best_score {
                best_score = *score;
                best_index = index;
            }
        }
        Ok(candidates.swap_remove(best_index))
    }

    fn name(&self) -> &str {
        "random_search"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bk_models::Prediction;
    use bk_types::ModelFitError;

    struct FlatModel;

    impl SurrogateModel for FlatModel {
        fn update(&mut self, _x: &[Vec<f64>], _y: &[f64]) -> BkResult<()> {
            Ok(())
        }

        fn predict(&self, _x: &[f64]) -> BkResult<Prediction> {
            Ok(Prediction {
                mean: 0.0,
                variance: 1.0,
            })
        }

        fn training_size(&self) -> usize {
            0
        }

        fn training_inputs(&self) -> &[Vec<f64>] {
            &[]
        }

        fn best_target(&self) -> Option<f64> {
            None
        }
    }

    /// Scores a candidate by its negative squared distance to a target, so
    /// the maximizer should land near the target.
    struct NearTarget {
        target: Vec<f64>,
    }

    impl AcquisitionFunction for NearTarget {
        fn evaluate(&self, _model: &dyn SurrogateModel, x: &[f64]) -> BkResult<f64> {
            let distance: f64 = x
                .iter()
                .zip(&self.target)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            Ok(-distance)
        }

        fn name(&self) -> &str {
            "near_target"
        }
    }

    struct Failing;

    impl AcquisitionFunction for Failing {
        fn evaluate(&self, _model: &dyn SurrogateModel, _x: &[f64]) -> BkResult<f64> {
            Err(ModelFitError::NotFitted.into())
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn unit_square() -> ParameterSpace {
        ParameterSpace::new()
            .add_continuous("x", 0.0, 1.0)
            .add_continuous("y", 0.0, 1.0)
    }

    #[test]
    fn finds_the_acquisition_peak() {
        let space = unit_square();
        let acquisition = NearTarget {
            target: vec![0.7, 0.3],
        };
        let mut optimizer = RandomSearchOptimizer::with_seed(5).candidate_count(4000);

        let point = optimizer.maximize(&acquisition, &FlatModel, &space).unwrap();
        let x = point.values[0].as_float().unwrap();
        let y = point.values[1].as_float().unwrap();
        assert!((x - 0.7).abs() < 0.1, "x = {x}");
        assert!((y - 0.3).abs() < 0.1, "y = {y}");
    }

    #[test]
    fn result_lies_inside_the_space() {
        let space = ParameterSpace::new()
            .add_continuous("x", -2.0, -1.0)
            .add_discrete("k", vec![3.0, 5.0]);
        let acquisition = NearTarget {
            target: vec![0.0, 0.0],
        };
        let mut optimizer = RandomSearchOptimizer::with_seed(8).candidate_count(64);

        let point = optimizer.maximize(&acquisition, &FlatModel, &space).unwrap();
        space.validate_point(&point).unwrap();
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let space = unit_square();
        let acquisition = NearTarget {
            target: vec![0.5, 0.5],
        };
        let mut a = RandomSearchOptimizer::with_seed(21).candidate_count(256);
        let mut b = RandomSearchOptimizer::with_seed(21).candidate_count(256);

        let first = a.maximize(&acquisition, &FlatModel, &space).unwrap();
        let second = b.maximize(&acquisition, &FlatModel, &space).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn scoring_errors_propagate() {
        let space = unit_square();
        let mut optimizer = RandomSearchOptimizer::with_seed(1).candidate_count(16);

        assert!(optimizer.maximize(&Failing, &FlatModel, &space).is_err());
    }
}
