//! The surrogate model contract used by the optimization loop.

use serde::{Deserialize, Serialize};

use bk_types::BkResult;

/// Marginal posterior at a single query point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub mean: f64,
    /// Predictive variance; never negative (numerical noise is clipped).
    pub variance: f64,
}

impl Prediction {
    pub fn standard_deviation(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// A probabilistic model of the objective, refit from scratch on every call
/// to [`update`](SurrogateModel::update).
///
/// Inputs are numeric encodings of points in parameter-space order (see
/// `ParameterSpace::encode`); targets are raw objective values. `update` is
/// synchronous and may be expensive; the loop calls it exactly once per
/// iteration.
pub trait SurrogateModel: Send + Sync {
    /// Refit on the full training set. Degenerate data fails with a
    /// `ModelFitError`.
    fn update(&mut self, x: &[Vec<f64>], y: &[f64]) -> BkResult<()>;

    /// Predictive mean and variance at one encoded point.
    fn predict(&self, x: &[f64]) -> BkResult<Prediction>;

    /// Pointwise batch prediction.
    fn predict_batch(&self, xs: &[Vec<f64>]) -> BkResult<Vec<Prediction>> {
        xs.iter().map(|x| self.predict(x)).collect()
    }

    /// Number of rows the model was last fitted on (0 before the first fit).
    fn training_size(&self) -> usize;

    /// The encoded inputs the model was last fitted on.
    fn training_inputs(&self) -> &[Vec<f64>];

    /// Minimum observed target, in raw units. `None` before the first fit.
    fn best_target(&self) -> Option<f64>;
}
