//! The user objective contract for internally driven runs.

use crate::errors::BkResult;
use crate::point::Point;

/// A black-box objective evaluated in batches.
///
/// `evaluate` receives a batch of points and must return one output row per
/// point, in the same order; the first entry of each row is the objective
/// value (minimized), any further entries are auxiliary outputs carried
/// along unchanged.
pub trait ObjectiveFunction {
    /// Evaluate a batch of points. Expensive and allowed to fail.
    fn evaluate(&mut self, points: &[Point]) -> BkResult<Vec<Vec<f64>>>;

    /// Human-readable objective name, used for logging only.
    fn name(&self) -> &str {
        "objective"
    }
}

/// Pointwise closures are objectives: each point maps to a single-output row.
impl<F> ObjectiveFunction for F
where
    F: FnMut(&Point) -> f64,
{
    fn evaluate(&mut self, points: &[Point]) -> BkResult<Vec<Vec<f64>>> {
        Ok(points.iter().map(|p| vec![(*self)(p)]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{BkError, ObjectiveEvaluationError};

    #[test]
    fn closures_are_objectives() {
        let mut objective = |p: &Point| match p.values[0].as_float() {
            Some(v) => (v - 0.3) * (v - 0.3),
            None => f64::NAN,
        };

        let points = vec![Point::from_floats(&[0.3]), Point::from_floats(&[0.8])];
        let rows = objective.evaluate(&points).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0][0].abs() < 1e-12);
        assert!((rows[1][0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn struct_objectives_can_fail() {
        struct Broken;

        impl ObjectiveFunction for Broken {
            fn evaluate(&mut self, _points: &[Point]) -> BkResult<Vec<Vec<f64>>> {
                Err(ObjectiveEvaluationError::Failed {
                    iteration: 0,
                    message: "simulator offline".to_string(),
                }
                .into())
            }

            fn name(&self) -> &str {
                "broken"
            }
        }

        let mut objective = Broken;
        let result = objective.evaluate(&[Point::from_floats(&[0.1])]);
        assert!(matches!(result, Err(BkError::ObjectiveEvaluation(_))));
        assert_eq!(objective.name(), "broken");
    }
}
