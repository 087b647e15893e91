//! Uniform random sampling over a parameter space.
//!
//! [`RandomDesign`] backs seeding, acquisition optimization, and Lipschitz
//! probing. Constraints are handled by rejection sampling with a bounded
//! attempt budget.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use bk_types::{
    BkResult, CandidateGenerationError, ParameterKind, ParameterSpace, ParameterValue, Point,
};

/// Attempts per point before rejection sampling reports the space as
/// infeasible.
const MAX_REJECTION_ATTEMPTS: usize = 100;

/// Draws points uniformly at random from a parameter space.
pub struct RandomDesign {
    space: ParameterSpace,
    rng: ChaCha8Rng,
}

impl RandomDesign {
    /// Validates the space up front; sampling assumes well-formed domains.
    pub fn new(space: ParameterSpace) -> BkResult<Self> {
        space.validate()?;
        Ok(Self {
            space,
            rng: ChaCha8Rng::from_entropy(),
        })
    }

    /// A design with a fixed seed, for reproducible runs.
    pub fn with_seed(space: ParameterSpace, seed: u64) -> BkResult<Self> {
        space.validate()?;
        Ok(Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Draws `count` feasible points.
    pub fn sample(&mut self, count: usize) -> BkResult<Vec<Point>> {
        (0..count)
            .map(|_| sample_point(&self.space, &mut self.rng))
            .collect()
    }

    pub fn sample_one(&mut self) -> BkResult<Point> {
        sample_point(&self.space, &mut self.rng)
    }
}

/// Draws one point satisfying the space's constraints.
pub(crate) fn sample_point(space: &ParameterSpace, rng: &mut ChaCha8Rng) -> BkResult<Point> {
    for _ in 0..MAX_REJECTION_ATTEMPTS {
        let point = sample_unconstrained(space, rng);
        if space.constraints().iter().all(|c| c.is_satisfied(&point)) {
            return Ok(point);
        }
    }
    Err(CandidateGenerationError::NoFeasiblePoint {
        attempts: MAX_REJECTION_ATTEMPTS,
    }
    .into())
}

fn sample_unconstrained(space: &ParameterSpace, rng: &mut ChaCha8Rng) -> Point {
    let values = space
        .parameters
        .iter()
        .map(|parameter| match &parameter.kind {
            ParameterKind::Continuous { low, high } => {
                ParameterValue::Float(rng.gen_range(*low..=*high))
            }
            ParameterKind::Discrete { values } => {
                ParameterValue::Float(values[rng.gen_range(0..values.len())])
            }
            ParameterKind::Categorical { choices } => {
                ParameterValue::Choice(choices[rng.gen_range(0..choices.len())].clone())
            }
        })
        .collect();
    Point::new(values)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bk_types::{BkError, InvalidInputError};

    fn mixed_space() -> ParameterSpace {
        ParameterSpace::new()
            .add_continuous("x", 0.0, 1.0)
            .add_discrete("layers", vec![1.0, 2.0, 4.0])
            .add_categorical("optimizer", &["adam", "sgd"])
    }

    #[test]
    fn samples_stay_inside_the_space() {
        let space = mixed_space();
        let mut design = RandomDesign::with_seed(space.clone(), 7).unwrap();

        for point in design.sample(200).unwrap() {
            space.validate_point(&point).unwrap();
        }
    }

    #[test]
    fn fixed_seed_reproduces_the_sequence() {
        let mut a = RandomDesign::with_seed(mixed_space(), 42).unwrap();
        let mut b = RandomDesign::with_seed(mixed_space(), 42).unwrap();

        assert_eq!(a.sample(25).unwrap(), b.sample(25).unwrap());
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = RandomDesign::with_seed(mixed_space(), 1).unwrap();
        let mut b = RandomDesign::with_seed(mixed_space(), 2).unwrap();

        assert_ne!(a.sample(25).unwrap(), b.sample(25).unwrap());
    }

    #[test]
    fn constraints_filter_samples() {
        let space = ParameterSpace::new()
            .add_continuous("x", 0.0, 1.0)
            .with_constraint("upper_half", |p: &Point| {
                p.values[0].as_float().is_some_and(|x| x >= 0.5)
            });
        let mut design = RandomDesign::with_seed(space, 11).unwrap();

        for point in design.sample(100).unwrap() {
            let x = point.values[0].as_float().unwrap();
            assert!(x >= 0.5, "constraint violated by {x}");
        }
    }

    #[test]
    fn infeasible_constraint_exhausts_attempts() {
        let space = ParameterSpace::new()
            .add_continuous("x", 0.0, 1.0)
            .with_constraint("never", |_: &Point| false);
        let mut design = RandomDesign::with_seed(space, 3).unwrap();

        let err = design.sample_one().unwrap_err();
        assert!(matches!(
            err,
            BkError::CandidateGeneration(CandidateGenerationError::NoFeasiblePoint { .. })
        ));
    }

    #[test]
    fn degenerate_bounds_collapse_to_a_single_value() {
        let space = ParameterSpace::new().add_continuous("fixed", 0.25, 0.25);
        let mut design = RandomDesign::with_seed(space, 9).unwrap();

        let point = design.sample_one().unwrap();
        assert_eq!(point, Point::from_floats(&[0.25]));
    }

    #[test]
    fn invalid_spaces_are_rejected_at_construction() {
        let inverted = ParameterSpace::new().add_continuous("x", 1.0, 0.0);
        let err = RandomDesign::with_seed(inverted, 5).err().unwrap();
        assert!(matches!(
            err,
            BkError::InvalidInput(InvalidInputError::InvalidBounds { .. })
        ));

        let hollow = ParameterSpace::new().add_discrete("level", vec![]);
        assert!(RandomDesign::new(hollow).is_err());
    }
}
