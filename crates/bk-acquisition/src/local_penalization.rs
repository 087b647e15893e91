//! Local penalization for batch diversity.
//!
//! Each already-promised point gets an exclusion ball whose radius follows
//! from a Lipschitz argument: within distance `(mean - best) / L` of a
//! center, the objective cannot undercut the incumbent. The penalizer is
//! the sum of log hammer functions (normal CDFs of the scaled distance to
//! each center) and is added to a log-space acquisition, which multiplies
//! the underlying scores.

use bk_models::SurrogateModel;
use bk_types::BkResult;

use crate::acquisition::AcquisitionFunction;
use crate::math::norm_cdf;

/// Predictive variances below this are clipped before scaling.
const MIN_VARIANCE: f64 = 1e-16;
/// Smallest hammer value fed to the log.
const MIN_HAMMER: f64 = 1e-16;

/// Multiplicative batch penalizer, expressed in log space.
///
/// Built fresh for every batch round from the centers to penalize (pending
/// points plus batch members selected so far); the per-center statistics
/// are frozen at construction so evaluation never touches the model.
pub struct LocalPenalization {
    centers: Vec<Vec<f64>>,
    radii: Vec<f64>,
    scales: Vec<f64>,
}

impl LocalPenalization {
    /// Derives per-center radii and scales from the model posterior, the
    /// Lipschitz estimate, and the best observed target.
    pub fn new(
        model: &dyn SurrogateModel,
        centers: &[Vec<f64>],
        lipschitz: f64,
        best: f64,
    ) -> BkResult<Self> {
        let predictions = model.predict_batch(centers)?;
        let mut radii = Vec::with_capacity(centers.len());
        let mut scales = Vec::with_capacity(centers.len());
        for prediction in predictions {
            let variance = prediction.variance.max(MIN_VARIANCE);
            radii.push((prediction.mean - best) / lipschitz);
            scales.push(variance.sqrt() / lipschitz);
        }
        Ok(Self {
            centers: centers.to_vec(),
            radii,
            scales,
        })
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}

impl AcquisitionFunction for LocalPenalization {
    fn evaluate(&self, _model: &dyn SurrogateModel, x: &[f64]) -> BkResult<f64> {
        let mut total = 0.0;
        for ((center, radius), scale) in self.centers.iter().zip(&self.radii).zip(&self.scales) {
            let distance = euclidean(x, center);
            let z = (distance - radius) / scale;
            total += norm_cdf(z).max(MIN_HAMMER).ln();
        }
        Ok(total)
    }

    fn name(&self) -> &str {
        "local_penalization"
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(ai, bi)| (ai - bi) * (ai - bi))
        .sum::<f64>()
        .sqrt()
}
