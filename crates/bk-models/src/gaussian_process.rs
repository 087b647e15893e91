//! Gaussian process surrogate with a Matérn 5/2 kernel.
//!
//! Targets are standardized to zero mean and unit variance before fitting;
//! ARD length-scales are set to the per-dimension standard deviation of the
//! training inputs. The fit is a Cholesky decomposition of `K + sigma^2 I`,
//! so each refit costs O(n^3) in the number of observations.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use bk_types::{BkResult, InvalidInputError, ModelFitError};

use crate::surrogate::{Prediction, SurrogateModel};

/// Default observation noise variance added to the kernel diagonal.
const DEFAULT_NOISE_VARIANCE: f64 = 1e-6;
/// Smallest allowed ARD length-scale.
const LENGTH_SCALE_FLOOR: f64 = 1e-3;
/// Signal variance of the kernel; targets are standardized, so unit scale.
const SIGNAL_VARIANCE: f64 = 1.0;
/// Precomputed sqrt(5) for the Matérn 5/2 kernel.
const SQRT_5: f64 = 2.236_067_977_499_79;

/// Configuration for [`GaussianProcess`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianProcessConfig {
    /// Observation noise variance added to the kernel diagonal. Larger
    /// values smooth the posterior; zero makes duplicate inputs singular.
    pub noise_variance: f64,
}

impl Default for GaussianProcessConfig {
    fn default() -> Self {
        Self {
            noise_variance: DEFAULT_NOISE_VARIANCE,
        }
    }
}

impl GaussianProcessConfig {
    pub fn with_noise_variance(mut self, noise_variance: f64) -> Self {
        self.noise_variance = noise_variance;
        self
    }
}

/// A fitted posterior, rebuilt wholesale on every `update`.
struct FittedModel {
    /// Cholesky factor of `K + sigma^2 I`.
    cholesky: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    /// `alpha = (K + sigma^2 I)^{-1} y_standardized`.
    alpha: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    length_scales: Vec<f64>,
    /// Standardization offsets for mapping predictions back to raw units.
    y_mean: f64,
    y_std: f64,
    /// Minimum raw target seen during the fit.
    best_y: f64,
}

/// Gaussian process surrogate model.
pub struct GaussianProcess {
    config: GaussianProcessConfig,
    fitted: Option<FittedModel>,
}

impl GaussianProcess {
    pub fn new(config: GaussianProcessConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    fn validate_training_data(x: &[Vec<f64>], y: &[f64]) -> BkResult<()> {
        if x.is_empty() || y.is_empty() {
            return Err(ModelFitError::EmptyTrainingSet.into());
        }
        if x.len() != y.len() {
            return Err(ModelFitError::DegenerateData {
                message: format!("{} input rows but {} targets", x.len(), y.len()),
            }
            .into());
        }

        let expected = x[0].len();
        if expected == 0 {
            return Err(ModelFitError::DegenerateData {
                message: "input rows have zero dimensions".to_string(),
            }
            .into());
        }
        for (row, values) in x.iter().enumerate() {
            if values.len() != expected {
                return Err(ModelFitError::InconsistentDimensions {
                    expected,
                    actual: values.len(),
                    row,
                }
                .into());
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(ModelFitError::DegenerateData {
                    message: format!("non-finite input value in row {}", row),
                }
                .into());
            }
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ModelFitError::DegenerateData {
                message: "non-finite target value".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self::new(GaussianProcessConfig::default())
    }
}

impl SurrogateModel for GaussianProcess {
    fn update(&mut self, x: &[Vec<f64>], y: &[f64]) -> BkResult<()> {
        Self::validate_training_data(x, y)?;
        let n = y.len();

        // Standardize targets.
        let y_mean = y.iter().sum::<f64>() / n as f64;
        let y_var = if n > 1 {
            y.iter().map(|&v| (v - y_mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            1.0
        };
        let y_std = y_var.sqrt().max(1e-10);
        let y_standardized: Vec<f64> = y.iter().map(|&v| (v - y_mean) / y_std).collect();
        let best_y = y.iter().copied().fold(f64::INFINITY, f64::min);

        // ARD length-scales: per-dimension std dev of the inputs, floored.
        let d = x[0].len();
        let length_scales: Vec<f64> = (0..d)
            .map(|j| {
                let mean_j = x.iter().map(|row| row[j]).sum::<f64>() / n as f64;
                let var_j =
                    x.iter().map(|row| (row[j] - mean_j).powi(2)).sum::<f64>() / n as f64;
                var_j.sqrt().max(LENGTH_SCALE_FLOOR)
            })
            .collect();

        let k = kernel_matrix(x, &length_scales, self.config.noise_variance);
        let cholesky = nalgebra::linalg::Cholesky::new(k)
            .ok_or(ModelFitError::SingularCovariance { n_points: n })?;

        let y_vec = DVector::from_column_slice(&y_standardized);
        let alpha = cholesky.solve(&y_vec);
        if alpha.iter().any(|a| !a.is_finite()) {
            return Err(ModelFitError::SingularCovariance { n_points: n }.into());
        }

        debug!(points = n, dimensions = d, "fitted gaussian process");
        self.fitted = Some(FittedModel {
            cholesky,
            alpha,
            x_train: x.to_vec(),
            length_scales,
            y_mean,
            y_std,
            best_y,
        });
        Ok(())
    }

    fn predict(&self, x: &[f64]) -> BkResult<Prediction> {
        let model = self.fitted.as_ref().ok_or(ModelFitError::NotFitted)?;
        let expected = model.x_train[0].len();
        if x.len() != expected {
            return Err(InvalidInputError::DimensionMismatch {
                expected,
                actual: x.len(),
            }
            .into());
        }

        let k_star = kernel_vector(x, &model.x_train, &model.length_scales);

        // Mean: k*^T alpha, mapped back to raw units.
        let mean_standardized = k_star.dot(&model.alpha);
        let mean = model.y_mean + model.y_std * mean_standardized;

        // Variance: k(x*, x*) - k*^T (K + sigma^2 I)^{-1} k*, clipped at zero.
        let v = model.cholesky.solve(&k_star);
        let variance_standardized = (SIGNAL_VARIANCE - k_star.dot(&v)).max(0.0);
        let variance = variance_standardized * model.y_std * model.y_std;

        Ok(Prediction { mean, variance })
    }

    fn training_size(&self) -> usize {
        self.fitted.as_ref().map_or(0, |m| m.x_train.len())
    }

    fn training_inputs(&self) -> &[Vec<f64>] {
        self.fitted.as_ref().map_or(&[], |m| m.x_train.as_slice())
    }

    fn best_target(&self) -> Option<f64> {
        self.fitted.as_ref().map(|m| m.best_y)
    }
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// Matérn 5/2 kernel with ARD length-scales.
///
/// `k(x1, x2) = sigma^2 (1 + sqrt(5) r + 5/3 r^2) exp(-sqrt(5) r)`
/// where `r = sqrt(sum_i ((x1_i - x2_i) / l_i)^2)`.
fn matern52(x1: &[f64], x2: &[f64], length_scales: &[f64]) -> f64 {
    let mut r_sq = 0.0;
    for i in 0..x1.len() {
        let diff = (x1[i] - x2[i]) / length_scales[i];
        r_sq += diff * diff;
    }
    let r = r_sq.sqrt();
    let sqrt5_r = SQRT_5 * r;
    SIGNAL_VARIANCE * (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

/// Build the kernel matrix `K + sigma^2 I`.
fn kernel_matrix(x: &[Vec<f64>], length_scales: &[f64], noise_variance: f64) -> DMatrix<f64> {
    let n = x.len();
    DMatrix::from_fn(n, n, |i, j| {
        let k = matern52(&x[i], &x[j], length_scales);
        if i == j {
            k + noise_variance
        } else {
            k
        }
    })
}

/// Compute the kernel vector `k(x*, X)` against the training inputs.
fn kernel_vector(x_star: &[f64], x_train: &[Vec<f64>], length_scales: &[f64]) -> DVector<f64> {
    DVector::from_fn(x_train.len(), |i, _| {
        matern52(x_star, &x_train[i], length_scales)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bk_types::BkError;

    fn training_grid() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64 / 7.0]).collect();
        let y: Vec<f64> = x.iter().map(|row| (row[0] - 0.3).powi(2)).collect();
        (x, y)
    }

    #[test]
    fn fit_interpolates_training_points() {
        let (x, y) = training_grid();
        let mut gp = GaussianProcess::default();
        gp.update(&x, &y).unwrap();

        for (row, target) in x.iter().zip(&y) {
            let p = gp.predict(row).unwrap();
            assert!(
                (p.mean - target).abs() < 1e-3,
                "mean {} should be close to {}",
                p.mean,
                target
            );
            assert!(p.variance >= 0.0);
            assert!(p.variance < 1e-3);
        }
    }

    #[test]
    fn variance_grows_away_from_training_data() {
        let (x, y) = training_grid();
        let mut gp = GaussianProcess::default();
        gp.update(&x, &y).unwrap();

        let near = gp.predict(&[0.3]).unwrap();
        let far = gp.predict(&[25.0]).unwrap();
        assert!(far.variance > near.variance);
    }

    #[test]
    fn batch_prediction_matches_pointwise_prediction() {
        let (x, y) = training_grid();
        let mut gp = GaussianProcess::default();
        gp.update(&x, &y).unwrap();

        let queries = vec![vec![0.05], vec![0.3], vec![0.62], vec![1.4]];
        let batch = gp.predict_batch(&queries).unwrap();
        assert_eq!(batch.len(), queries.len());
        for (row, prediction) in queries.iter().zip(&batch) {
            assert_eq!(*prediction, gp.predict(row).unwrap());
        }

        // A bad row poisons the whole batch.
        assert!(gp.predict_batch(&[vec![0.2], vec![0.1, 0.9]]).is_err());
    }

    #[test]
    fn predictions_follow_target_shifts() {
        let (x, y) = training_grid();
        let shifted: Vec<f64> = y.iter().map(|v| v + 100.0).collect();

        let mut base = GaussianProcess::default();
        base.update(&x, &y).unwrap();
        let mut moved = GaussianProcess::default();
        moved.update(&x, &shifted).unwrap();

        let p0 = base.predict(&[0.45]).unwrap();
        let p1 = moved.predict(&[0.45]).unwrap();
        assert!((p1.mean - p0.mean - 100.0).abs() < 1e-6);
        assert!((p1.variance - p0.variance).abs() < 1e-6);
    }

    #[test]
    fn best_target_is_raw_minimum() {
        let (x, y) = training_grid();
        let mut gp = GaussianProcess::default();
        gp.update(&x, &y).unwrap();

        let expected = y.iter().copied().fold(f64::INFINITY, f64::min);
        assert_eq!(gp.best_target(), Some(expected));
        assert_eq!(gp.training_size(), x.len());
        assert_eq!(gp.training_inputs().len(), x.len());
    }

    #[test]
    fn update_rejects_degenerate_data() {
        let mut gp = GaussianProcess::default();

        assert!(matches!(
            gp.update(&[], &[]),
            Err(BkError::ModelFit(ModelFitError::EmptyTrainingSet))
        ));
        assert!(matches!(
            gp.update(&[vec![0.1], vec![0.2]], &[1.0]),
            Err(BkError::ModelFit(ModelFitError::DegenerateData { .. }))
        ));
        assert!(matches!(
            gp.update(&[vec![0.1], vec![0.2, 0.3]], &[1.0, 2.0]),
            Err(BkError::ModelFit(ModelFitError::InconsistentDimensions { .. }))
        ));
        assert!(matches!(
            gp.update(&[vec![0.1], vec![0.2]], &[1.0, f64::NAN]),
            Err(BkError::ModelFit(ModelFitError::DegenerateData { .. }))
        ));
    }

    #[test]
    fn duplicate_inputs_without_noise_are_singular() {
        let config = GaussianProcessConfig::default().with_noise_variance(0.0);
        let mut gp = GaussianProcess::new(config);

        let x = vec![vec![0.5], vec![0.5], vec![0.9]];
        let y = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            gp.update(&x, &y),
            Err(BkError::ModelFit(ModelFitError::SingularCovariance { .. }))
        ));
    }

    #[test]
    fn predict_before_fit_fails() {
        let gp = GaussianProcess::default();
        assert!(matches!(
            gp.predict(&[0.5]),
            Err(BkError::ModelFit(ModelFitError::NotFitted))
        ));
        assert_eq!(gp.best_target(), None);
        assert_eq!(gp.training_size(), 0);
    }

    #[test]
    fn predict_checks_query_dimension() {
        let (x, y) = training_grid();
        let mut gp = GaussianProcess::default();
        gp.update(&x, &y).unwrap();

        assert!(matches!(
            gp.predict(&[0.1, 0.2]),
            Err(BkError::InvalidInput(
                InvalidInputError::DimensionMismatch { .. }
            ))
        ));
    }
}
