//! Loop state: the bookkeeping record of one optimization run.

use serde::{Deserialize, Serialize};

use bk_types::{
    BkResult, DuplicatePendingError, InvalidInputError, Observation, ParameterSpace, Point,
    UnknownPendingError,
};

/// All observations and pending evaluations for a run, plus the iteration
/// counter and the per-iteration best-value history.
///
/// Exclusively owned by one engine. Every mutator validates before it
/// writes, so a failed call never leaves partial state behind. The pending
/// set and the observed input set stay disjoint at all times: a point is
/// either in flight or resolved, never both. Re-evaluating a resolved
/// input is done by appending a fresh observation, not by marking it
/// pending again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopState {
    observations: Vec<Observation>,
    pending: Vec<Point>,
    iteration: usize,
    best_history: Vec<f64>,
}

impl LoopState {
    /// Seeds the state with an initial design. The space itself is
    /// validated first, then every seed point and output row.
    pub fn initialize(space: &ParameterSpace, x: &[Point], y: &[Vec<f64>]) -> BkResult<Self> {
        space.validate()?;
        if x.is_empty() {
            return Err(InvalidInputError::Empty {
                what: "seed inputs".to_string(),
            }
            .into());
        }
        if y.is_empty() {
            return Err(InvalidInputError::Empty {
                what: "seed outputs".to_string(),
            }
            .into());
        }
        if x.len() != y.len() {
            return Err(InvalidInputError::LengthMismatch {
                inputs: x.len(),
                outputs: y.len(),
            }
            .into());
        }
        for point in x {
            space.validate_point(point)?;
        }
        for (row, outputs) in y.iter().enumerate() {
            validate_outputs(row, outputs)?;
        }

        let observations: Vec<Observation> = x
            .iter()
            .zip(y)
            .map(|(point, outputs)| Observation::with_outputs(point.clone(), outputs.clone()))
            .collect();
        let seed_best = observations
            .iter()
            .map(Observation::objective)
            .fold(f64::INFINITY, f64::min);

        Ok(Self {
            observations,
            pending: Vec::new(),
            iteration: 0,
            best_history: vec![seed_best],
        })
    }

    /// Appends a resolved observation directly. This is the only way the
    /// observation list grows and the path by which an already-resolved
    /// input may be evaluated again. Fails if the point is currently
    /// pending; such points must go through [`resolve_pending`](Self::resolve_pending).
    pub fn append(&mut self, observation: Observation) -> BkResult<()> {
        validate_outputs(0, &observation.outputs)?;
        if self.is_pending(&observation.point) {
            return Err(DuplicatePendingError {
                point: observation.point,
            }
            .into());
        }
        self.observations.push(observation);
        Ok(())
    }

    /// Registers points as in flight. Nothing is registered unless every
    /// point passes: duplicates within the call or against the pending set
    /// fail with `DuplicatePendingError`, and points equal to an observed
    /// input are rejected to keep pending and resolved disjoint.
    pub fn mark_pending(&mut self, points: &[Point]) -> BkResult<()> {
        for (i, point) in points.iter().enumerate() {
            if self.is_pending(point) || points[..i].contains(point) {
                return Err(DuplicatePendingError {
                    point: point.clone(),
                }
                .into());
            }
            if self.is_observed(point) {
                return Err(InvalidInputError::AlreadyObserved {
                    point: point.clone(),
                }
                .into());
            }
        }
        self.pending.extend_from_slice(points);
        Ok(())
    }

    /// Promotes a pending point to an observation in one atomic step.
    pub fn resolve_pending(&mut self, point: &Point, outputs: Vec<f64>) -> BkResult<()> {
        validate_outputs(0, &outputs)?;
        let position = self
            .pending
            .iter()
            .position(|p| p == point)
            .ok_or_else(|| UnknownPendingError {
                point: point.clone(),
            })?;
        let resolved = self.pending.remove(position);
        self.observations
            .push(Observation::with_outputs(resolved, outputs));
        Ok(())
    }

    /// Resolves a whole submission atomically: every result must reference
    /// a distinct pending point and carry valid outputs, otherwise nothing
    /// is applied.
    pub fn resolve_batch(&mut self, results: &[Observation]) -> BkResult<()> {
        for (i, result) in results.iter().enumerate() {
            if !self.is_pending(&result.point)
                || results[..i].iter().any(|r| r.point == result.point)
            {
                return Err(UnknownPendingError {
                    point: result.point.clone(),
                }
                .into());
            }
            validate_outputs(i, &result.outputs)?;
        }
        for result in results {
            self.resolve_pending(&result.point, result.outputs.clone())?;
        }
        Ok(())
    }

    /// Closes one loop iteration: bumps the counter and records the best
    /// objective seen so far, which keeps convergence checks pure.
    pub fn advance_iteration(&mut self) {
        self.iteration += 1;
        self.best_history
            .push(self.best_objective().unwrap_or(f64::INFINITY));
    }

    // ---- read accessors ----

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn pending(&self) -> &[Point] {
        &self.pending
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    pub fn is_pending(&self, point: &Point) -> bool {
        self.pending.contains(point)
    }

    pub fn is_observed(&self, point: &Point) -> bool {
        self.observations.iter().any(|obs| &obs.point == point)
    }

    /// The observation with the lowest objective value.
    pub fn best_observation(&self) -> Option<&Observation> {
        self.observations
            .iter()
            .min_by(|a, b| a.objective().total_cmp(&b.objective()))
    }

    pub fn best_objective(&self) -> Option<f64> {
        self.best_observation().map(Observation::objective)
    }

    /// Best objective after the seed and after each completed iteration.
    pub fn best_history(&self) -> &[f64] {
        &self.best_history
    }

    pub fn snapshot(&self) -> LoopStateSnapshot {
        LoopStateSnapshot {
            iteration: self.iteration,
            observation_count: self.observations.len(),
            pending_count: self.pending.len(),
            best: self.best_observation().cloned(),
        }
    }
}

/// A cloned summary for the reporting layer; reading it never touches the
/// live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStateSnapshot {
    pub iteration: usize,
    pub observation_count: usize,
    pub pending_count: usize,
    pub best: Option<Observation>,
}

fn validate_outputs(row: usize, outputs: &[f64]) -> BkResult<()> {
    if outputs.is_empty() {
        return Err(InvalidInputError::EmptyOutputs.into());
    }
    for value in outputs {
        if !value.is_finite() {
            return Err(InvalidInputError::NonFiniteOutput {
                row,
                value: *value,
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bk_types::BkError;

    fn unit_space() -> ParameterSpace {
        ParameterSpace::new().add_continuous("x", 0.0, 1.0)
    }

    fn seeded_state() -> LoopState {
        let x = vec![
            Point::from_floats(&[0.1]),
            Point::from_floats(&[0.6]),
            Point::from_floats(&[0.9]),
        ];
        let y = vec![vec![1.0], vec![0.5], vec![2.0]];
        LoopState::initialize(&unit_space(), &x, &y).unwrap()
    }

    fn assert_disjoint(state: &LoopState) {
        for pending in state.pending() {
            assert!(
                !state.is_observed(pending),
                "point {} is both pending and resolved",
                pending
            );
        }
    }

    #[test]
    fn seed_round_trip() {
        let state = seeded_state();
        assert_eq!(state.observation_count(), 3);
        assert_eq!(state.iteration(), 0);
        assert_eq!(state.observations()[0].point, Point::from_floats(&[0.1]));
        assert_eq!(state.observations()[1].outputs, vec![0.5]);
        assert_eq!(state.best_objective(), Some(0.5));
        assert_eq!(state.best_history(), &[0.5]);
    }

    #[test]
    fn initialize_rejects_mismatched_lengths() {
        let x = vec![
            Point::from_floats(&[0.1]),
            Point::from_floats(&[0.2]),
            Point::from_floats(&[0.3]),
        ];
        let y = vec![vec![1.0], vec![2.0]];
        assert!(matches!(
            LoopState::initialize(&unit_space(), &x, &y),
            Err(BkError::InvalidInput(InvalidInputError::LengthMismatch {
                inputs: 3,
                outputs: 2,
            }))
        ));
    }

    #[test]
    fn initialize_rejects_empty_and_invalid_seeds() {
        assert!(matches!(
            LoopState::initialize(&unit_space(), &[], &[]),
            Err(BkError::InvalidInput(InvalidInputError::Empty { .. }))
        ));

        let outside = vec![Point::from_floats(&[1.4])];
        assert!(matches!(
            LoopState::initialize(&unit_space(), &outside, &[vec![1.0]]),
            Err(BkError::InvalidInput(InvalidInputError::OutOfBounds { .. }))
        ));

        let bad_space = ParameterSpace::new().add_continuous("x", 1.0, 0.0);
        assert!(LoopState::initialize(
            &bad_space,
            &[Point::from_floats(&[0.5])],
            &[vec![1.0]]
        )
        .is_err());
    }

    #[test]
    fn pending_and_resolved_stay_disjoint() {
        let mut state = seeded_state();
        let a = Point::from_floats(&[0.2]);
        let b = Point::from_floats(&[0.3]);

        state.mark_pending(&[a.clone(), b.clone()]).unwrap();
        assert_disjoint(&state);
        assert_eq!(state.pending().len(), 2);

        state.resolve_pending(&a, vec![0.7]).unwrap();
        assert_disjoint(&state);
        assert_eq!(state.pending().len(), 1);
        assert!(state.is_observed(&a));

        state.resolve_pending(&b, vec![0.8]).unwrap();
        assert_disjoint(&state);
        assert!(state.pending().is_empty());
        assert_eq!(state.observation_count(), 5);
    }

    #[test]
    fn mark_pending_is_atomic() {
        let mut state = seeded_state();
        let a = Point::from_floats(&[0.2]);
        let b = Point::from_floats(&[0.3]);

        state.mark_pending(&[a.clone()]).unwrap();
        let result = state.mark_pending(&[b.clone(), a.clone()]);
        assert!(matches!(result, Err(BkError::DuplicatePending(_))));
        // The valid point in the failed call must not have been registered.
        assert!(!state.is_pending(&b));
        assert_eq!(state.pending().len(), 1);
    }

    #[test]
    fn mark_pending_rejects_duplicates_within_one_call() {
        let mut state = seeded_state();
        let a = Point::from_floats(&[0.2]);
        assert!(matches!(
            state.mark_pending(&[a.clone(), a.clone()]),
            Err(BkError::DuplicatePending(_))
        ));
        assert!(state.pending().is_empty());
    }

    #[test]
    fn mark_pending_rejects_observed_inputs() {
        let mut state = seeded_state();
        let seen = Point::from_floats(&[0.1]);
        assert!(matches!(
            state.mark_pending(&[seen]),
            Err(BkError::InvalidInput(InvalidInputError::AlreadyObserved { .. }))
        ));
    }

    #[test]
    fn resolve_unknown_point_fails_without_changes() {
        let mut state = seeded_state();
        let stranger = Point::from_floats(&[0.42]);

        let before_observations = state.observation_count();
        let err = state.resolve_pending(&stranger, vec![1.0]).unwrap_err();
        match err {
            BkError::UnknownPending(inner) => assert_eq!(inner.point, stranger),
            other => panic!("expected UnknownPending, got {other}"),
        }
        assert_eq!(state.observation_count(), before_observations);
        assert!(state.pending().is_empty());
    }

    #[test]
    fn resolve_batch_applies_nothing_on_partial_failure() {
        let mut state = seeded_state();
        let known = Point::from_floats(&[0.2]);
        let stranger = Point::from_floats(&[0.42]);
        state.mark_pending(&[known.clone()]).unwrap();

        let results = vec![
            Observation::new(known.clone(), 0.5),
            Observation::new(stranger, 0.9),
        ];
        let err = state.resolve_batch(&results).unwrap_err();
        assert!(matches!(err, BkError::UnknownPending(_)));
        // The first, valid result must not have been applied.
        assert_eq!(state.observation_count(), 3);
        assert_eq!(state.pending(), &[known.clone()]);

        state.resolve_batch(&[Observation::new(known, 0.5)]).unwrap();
        assert_eq!(state.observation_count(), 4);
        assert!(state.pending().is_empty());
    }

    #[test]
    fn append_rejects_pending_points_but_allows_reevaluation() {
        let mut state = seeded_state();
        let p = Point::from_floats(&[0.2]);

        state.mark_pending(&[p.clone()]).unwrap();
        assert!(matches!(
            state.append(Observation::new(p.clone(), 1.0)),
            Err(BkError::DuplicatePending(_))
        ));

        state.resolve_pending(&p, vec![1.0]).unwrap();
        // A resolved input may be measured again as a fresh observation.
        state.append(Observation::new(p.clone(), 1.1)).unwrap();
        let repeats = state
            .observations()
            .iter()
            .filter(|obs| obs.point == p)
            .count();
        assert_eq!(repeats, 2);
    }

    #[test]
    fn output_rows_are_validated() {
        let mut state = seeded_state();
        let p = Point::from_floats(&[0.2]);
        state.mark_pending(&[p.clone()]).unwrap();

        assert!(matches!(
            state.resolve_pending(&p, vec![]),
            Err(BkError::InvalidInput(InvalidInputError::EmptyOutputs))
        ));
        assert!(matches!(
            state.resolve_pending(&p, vec![f64::NAN]),
            Err(BkError::InvalidInput(InvalidInputError::NonFiniteOutput { .. }))
        ));
        // Still pending after the failed resolutions.
        assert!(state.is_pending(&p));
    }

    #[test]
    fn advance_iteration_tracks_best_history() {
        let mut state = seeded_state();
        assert_eq!(state.best_history(), &[0.5]);

        state.append(Observation::new(Point::from_floats(&[0.3]), 0.2)).unwrap();
        state.advance_iteration();
        state.append(Observation::new(Point::from_floats(&[0.4]), 0.9)).unwrap();
        state.advance_iteration();

        assert_eq!(state.iteration(), 2);
        assert_eq!(state.best_history(), &[0.5, 0.2, 0.2]);
    }

    #[test]
    fn snapshot_is_serializable() {
        let mut state = seeded_state();
        state
            .mark_pending(&[Point::from_floats(&[0.25])])
            .unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.observation_count, 3);
        assert_eq!(snapshot.pending_count, 1);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"pending_count\":1"));
    }
}
