//! Expected Improvement for minimization.

use bk_models::SurrogateModel;
use bk_types::{BkResult, ModelFitError};

use crate::acquisition::AcquisitionFunction;
use crate::math::{norm_cdf, norm_pdf};

/// Below this predictive deviation the posterior is treated as a point mass.
const MIN_STANDARD_DEVIATION: f64 = 1e-12;

/// Expected Improvement over the best observed target.
///
/// `EI(x) = (best - mean - jitter) Phi(z) + sd phi(z)` with
/// `z = (best - mean - jitter) / sd`; when the deviation underflows this
/// degenerates to the plain improvement clipped at zero. The jitter shifts
/// the improvement threshold to encourage exploration.
pub struct ExpectedImprovement {
    jitter: f64,
}

impl ExpectedImprovement {
    pub fn new() -> Self {
        Self { jitter: 0.0 }
    }

    pub fn with_jitter(jitter: f64) -> Self {
        Self { jitter }
    }
}

impl Default for ExpectedImprovement {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionFunction for ExpectedImprovement {
    fn evaluate(&self, model: &dyn SurrogateModel, x: &[f64]) -> BkResult<f64> {
        let best = model.best_target().ok_or(ModelFitError::NotFitted)?;
        let prediction = model.predict(x)?;

        let sd = prediction.standard_deviation();
        let improvement = best - prediction.mean - self.jitter;
        if sd < MIN_STANDARD_DEVIATION {
            return Ok(improvement.max(0.0));
        }

        let z = improvement / sd;
        Ok((improvement * norm_cdf(z) + sd * norm_pdf(z)).max(0.0))
    }

    fn name(&self) -> &str {
        "expected_improvement"
    }
}
