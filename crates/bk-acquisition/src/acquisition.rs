//! The acquisition contract and its algebraic composites.

use std::sync::Arc;

use bk_models::SurrogateModel;
use bk_types::{BkResult, CandidateGenerationError};

/// Scores how desirable a candidate point is; higher is better.
///
/// Implementations are cheap relative to the objective and are queried many
/// thousands of times per candidate batch, against the model fitted for the
/// current iteration.
pub trait AcquisitionFunction: Send + Sync {
    /// Score one encoded point.
    fn evaluate(&self, model: &dyn SurrogateModel, x: &[f64]) -> BkResult<f64>;

    /// Whether [`evaluate_with_gradient`](Self::evaluate_with_gradient) is
    /// available.
    fn has_gradient(&self) -> bool {
        false
    }

    /// Score plus gradient with respect to `x`.
    fn evaluate_with_gradient(
        &self,
        _model: &dyn SurrogateModel,
        _x: &[f64],
    ) -> BkResult<(f64, Vec<f64>)> {
        Err(CandidateGenerationError::GradientUnavailable {
            acquisition: self.name().to_string(),
        }
        .into())
    }

    /// Human-readable name, used for logging and error context.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Composites
// ---------------------------------------------------------------------------

/// Sum of sub-acquisitions. A failure in any term propagates; the gradient
/// is the sum of term gradients and exists only if every term has one.
pub struct Sum {
    terms: Vec<Arc<dyn AcquisitionFunction>>,
}

impl Sum {
    pub fn new(terms: Vec<Arc<dyn AcquisitionFunction>>) -> Self {
        Self { terms }
    }
}

impl AcquisitionFunction for Sum {
    fn evaluate(&self, model: &dyn SurrogateModel, x: &[f64]) -> BkResult<f64> {
        let mut total = 0.0;
        for term in &self.terms {
            total += term.evaluate(model, x)?;
        }
        Ok(total)
    }

    fn has_gradient(&self) -> bool {
        self.terms.iter().all(|t| t.has_gradient())
    }

    fn evaluate_with_gradient(
        &self,
        model: &dyn SurrogateModel,
        x: &[f64],
    ) -> BkResult<(f64, Vec<f64>)> {
        let mut total = 0.0;
        let mut gradient = vec![0.0; x.len()];
        for term in &self.terms {
            let (value, term_gradient) = term.evaluate_with_gradient(model, x)?;
            total += value;
            for (g, tg) in gradient.iter_mut().zip(term_gradient) {
                *g += tg;
            }
        }
        Ok((total, gradient))
    }

    fn name(&self) -> &str {
        "sum"
    }
}

/// Product of sub-acquisitions. Gradient follows the product rule.
pub struct Product {
    factors: Vec<Arc<dyn AcquisitionFunction>>,
}

impl Product {
    pub fn new(factors: Vec<Arc<dyn AcquisitionFunction>>) -> Self {
        Self { factors }
    }
}

impl AcquisitionFunction for Product {
    fn evaluate(&self, model: &dyn SurrogateModel, x: &[f64]) -> BkResult<f64> {
        let mut total = 1.0;
        for factor in &self.factors {
            total *= factor.evaluate(model, x)?;
        }
        Ok(total)
    }

    fn has_gradient(&self) -> bool {
        self.factors.iter().all(|f| f.has_gradient())
    }

    fn evaluate_with_gradient(
        &self,
        model: &dyn SurrogateModel,
        x: &[f64],
    ) -> BkResult<(f64, Vec<f64>)> {
        let mut evaluated = Vec::with_capacity(self.factors.len());
        for factor in &self.factors {
            evaluated.push(factor.evaluate_with_gradient(model, x)?);
        }

        let value = evaluated.iter().map(|(v, _)| v).product();
        let mut gradient = vec![0.0; x.len()];
        for (i, (_, factor_gradient)) in evaluated.iter().enumerate() {
            let others: f64 = evaluated
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, (v, _))| v)
                .product();
            for (g, fg) in gradient.iter_mut().zip(factor_gradient) {
                *g += fg * others;
            }
        }
        Ok((value, gradient))
    }

    fn name(&self) -> &str {
        "product"
    }
}

/// Floor applied before taking logs, so a vanishing acquisition stays finite.
const LOG_FLOOR: f64 = 1e-40;

/// Natural log of a non-negative acquisition, for additive composition in
/// log space.
pub struct LogAcquisition {
    inner: Arc<dyn AcquisitionFunction>,
}

impl LogAcquisition {
    pub fn new(inner: Arc<dyn AcquisitionFunction>) -> Self {
        Self { inner }
    }
}

impl AcquisitionFunction for LogAcquisition {
    fn evaluate(&self, model: &dyn SurrogateModel, x: &[f64]) -> BkResult<f64> {
        Ok(self.inner.evaluate(model, x)?.max(LOG_FLOOR).ln())
    }

    fn has_gradient(&self) -> bool {
        self.inner.has_gradient()
    }

    fn evaluate_with_gradient(
        &self,
        model: &dyn SurrogateModel,
        x: &[f64],
    ) -> BkResult<(f64, Vec<f64>)> {
        let (value, inner_gradient) = self.inner.evaluate_with_gradient(model, x)?;
        let floored = value.max(LOG_FLOOR);
        let gradient = inner_gradient.into_iter().map(|g| g / floored).collect();
        Ok((floored.ln(), gradient))
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bk_models::Prediction;
    use bk_types::BkError;

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
            Some(0.0)
        }
    }

    /// Affine score w . x + b with an analytic gradient.
    struct Affine {
        weights: Vec<f64>,
        offset: f64,
    }

    impl AcquisitionFunction for Affine {
        fn evaluate(&self, _model: &dyn SurrogateModel, x: &[f64]) -> BkResult<f64> {
            Ok(self
                .weights
                .iter()
                .zip(x)
                .map(|(w, v)| w * v)
                .sum::<f64>()
                + self.offset)
        }

        fn has_gradient(&self) -> bool {
            true
        }

        fn evaluate_with_gradient(
            &self,
            model: &dyn SurrogateModel,
            x: &[f64],
        ) -> BkResult<(f64, Vec<f64>)> {
            Ok((self.evaluate(model, x)?, self.weights.clone()))
        }

        fn name(&self) -> &str {
            "affine"
        }
    }

    struct Failing;

    impl AcquisitionFunction for Failing {
        fn evaluate(&self, _model: &dyn SurrogateModel, _x: &[f64]) -> BkResult<f64> {
            Err(CandidateGenerationError::NoFeasiblePoint { attempts: 1 }.into())
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn affine(weights: &[f64], offset: f64) -> Arc<dyn AcquisitionFunction> {
        Arc::new(Affine {
            weights: weights.to_vec(),
            offset,
        })
    }

    #[test]
    fn sum_adds_terms_and_gradients() {
        let sum = Sum::new(vec![affine(&[1.0, 0.0], 1.0), affine(&[0.0, 2.0], 0.5)]);
        let x = [3.0, 4.0];

        let value = sum.evaluate(&FlatModel, &x).unwrap();
        assert!((value - 12.5).abs() < 1e-12);

        assert!(sum.has_gradient());
        let (with_grad, gradient) = sum.evaluate_with_gradient(&FlatModel, &x).unwrap();
        assert_eq!(with_grad, value);
        assert_eq!(gradient, vec![1.0, 2.0]);
    }

    #[test]
    fn product_follows_the_product_rule() {
        let product = Product::new(vec![affine(&[1.0], 0.0), affine(&[0.0], 3.0)]);
        let x = [2.0];

        let (value, gradient) = product.evaluate_with_gradient(&FlatModel, &x).unwrap();
        assert!((value - 6.0).abs() < 1e-12);
        // d/dx of (x * 3) = 3
        assert!((gradient[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn composition_is_associative() {
        let x = [0.7, -1.3];
        let a = || affine(&[1.0, 2.0], 0.1);
        let b = || affine(&[-0.5, 0.25], 1.0);
        let c = || affine(&[2.0, 0.0], -0.4);

        let left = Sum::new(vec![Arc::new(Sum::new(vec![a(), b()])), c()]);
        let right = Sum::new(vec![a(), Arc::new(Sum::new(vec![b(), c()]))]);
        assert!(
            (left.evaluate(&FlatModel, &x).unwrap() - right.evaluate(&FlatModel, &x).unwrap())
                .abs()
                < 1e-12
        );

        let left = Product::new(vec![Arc::new(Product::new(vec![a(), b()])), c()]);
        let right = Product::new(vec![a(), Arc::new(Product::new(vec![b(), c()]))]);
        assert!(
            (left.evaluate(&FlatModel, &x).unwrap() - right.evaluate(&FlatModel, &x).unwrap())
                .abs()
                < 1e-12
        );
    }

    #[test]
    fn failures_propagate_through_composites() {
        let sum = Sum::new(vec![affine(&[1.0], 0.0), Arc::new(Failing)]);
        assert!(matches!(
            sum.evaluate(&FlatModel, &[0.0]),
            Err(BkError::CandidateGeneration(_))
        ));

        let product = Product::new(vec![Arc::new(Failing), affine(&[1.0], 0.0)]);
        assert!(product.evaluate(&FlatModel, &[0.0]).is_err());
    }

    #[test]
    fn gradient_capability_requires_all_children() {
        let mixed = Sum::new(vec![affine(&[1.0], 0.0), Arc::new(Failing)]);
        assert!(!mixed.has_gradient());

        let err = Failing
            .evaluate_with_gradient(&FlatModel, &[0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            BkError::CandidateGeneration(CandidateGenerationError::GradientUnavailable { .. })
        ));
    }

    #[test]
    fn log_wrapper_takes_logs_and_chains_gradients() {
        let log = LogAcquisition::new(affine(&[0.0], f64::exp(2.0)));
        let value = log.evaluate(&FlatModel, &[0.0]).unwrap();
        assert!((value - 2.0).abs() < 1e-12);

        let log = LogAcquisition::new(affine(&[3.0], 0.0));
        let (value, gradient) = log.evaluate_with_gradient(&FlatModel, &[2.0]).unwrap();
        assert!((value - 6.0_f64.ln()).abs() < 1e-12);
        // d/dx ln(3x) = 1/x
        assert!((gradient[0] - 0.5).abs() < 1e-12);

        // A vanishing inner value stays finite.
        let log = LogAcquisition::new(affine(&[0.0], 0.0));
        let value = log.evaluate(&FlatModel, &[0.0]).unwrap();
        assert!(value.is_finite());
    }
}
