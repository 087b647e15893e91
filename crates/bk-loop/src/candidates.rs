//! Candidate point calculators.
//!
//! [`LocalPenalizationCalculator`] builds diverse batches greedily: each
//! slot maximizes the log acquisition plus a penalty surface centered on
//! pending points and batch members selected so far. The penalty radius
//! comes from a Lipschitz constant re-derived for every batch.
//! [`SequentialCalculator`] is the single-point case; it reaches for the
//! penalty machinery only to escape duplicates.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use bk_acquisition::{AcquisitionFunction, LocalPenalization, LogAcquisition, Sum};
use bk_models::SurrogateModel;
use bk_types::{
    BkResult, CandidateGenerationError, InvalidInputError, ModelFitError, ParameterSpace, Point,
};

use crate::design::sample_point;
use crate::optimizer::AcquisitionOptimizer;
use crate::state::LoopState;

/// Retry budget per batch slot when the optimizer keeps returning points
/// that are already tracked.
pub const MAX_DEDUP_RETRIES: usize = 5;
/// Random probes used to estimate the Lipschitz constant.
const LIPSCHITZ_SAMPLE_COUNT: usize = 500;
/// Smallest accepted Lipschitz estimate.
const MIN_LIPSCHITZ: f64 = 1e-7;
/// Stand-in constant when the posterior mean is flat and the estimate
/// collapses below the minimum.
const FALLBACK_LIPSCHITZ: f64 = 10.0;
/// Relative step for the central difference through the posterior mean.
const GRADIENT_STEP: f64 = 1e-4;

/// Produces the next batch of evaluation candidates.
pub trait CandidatePointCalculator: Send + Sync {
    /// Returns exactly `batch_size` points, distinct from one another and
    /// from every point the loop state already tracks.
    fn compute_next_points(
        &mut self,
        model: &dyn SurrogateModel,
        state: &LoopState,
        batch_size: usize,
    ) -> BkResult<Vec<Point>>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Local penalization batches
// ---------------------------------------------------------------------------

/// Greedy batch construction with local penalization.
pub struct LocalPenalizationCalculator {
    space: ParameterSpace,
    acquisition: Arc<dyn AcquisitionFunction>,
    optimizer: Box<dyn AcquisitionOptimizer>,
    rng: ChaCha8Rng,
}

impl LocalPenalizationCalculator {
    pub fn new(
        space: ParameterSpace,
        acquisition: Arc<dyn AcquisitionFunction>,
        optimizer: Box<dyn AcquisitionOptimizer>,
    ) -> Self {
        Self {
            space,
            acquisition,
            optimizer,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Seeds the Lipschitz probe stream, for reproducible runs.
    pub fn with_seed(
        space: ParameterSpace,
        acquisition: Arc<dyn AcquisitionFunction>,
        optimizer: Box<dyn AcquisitionOptimizer>,
        seed: u64,
    ) -> Self {
        Self {
            space,
            acquisition,
            optimizer,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl CandidatePointCalculator for LocalPenalizationCalculator {
    fn compute_next_points(
        &mut self,
        model: &dyn SurrogateModel,
        state: &LoopState,
        batch_size: usize,
    ) -> BkResult<Vec<Point>> {
        if batch_size == 0 {
            return Err(InvalidInputError::ZeroBatchSize.into());
        }
        build_batch(
            &self.space,
            &self.acquisition,
            self.optimizer.as_mut(),
            &mut self.rng,
            model,
            state,
            batch_size,
        )
    }

    fn name(&self) -> &str {
        "local_penalization"
    }
}

// ---------------------------------------------------------------------------
// Sequential single-point selection
// ---------------------------------------------------------------------------

/// One point per iteration; rejects any other batch size.
pub struct SequentialCalculator {
    space: ParameterSpace,
    acquisition: Arc<dyn AcquisitionFunction>,
    optimizer: Box<dyn AcquisitionOptimizer>,
    rng: ChaCha8Rng,
}

impl SequentialCalculator {
    pub fn new(
        space: ParameterSpace,
        acquisition: Arc<dyn AcquisitionFunction>,
        optimizer: Box<dyn AcquisitionOptimizer>,
    ) -> Self {
        Self {
            space,
            acquisition,
            optimizer,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn with_seed(
        space: ParameterSpace,
        acquisition: Arc<dyn AcquisitionFunction>,
        optimizer: Box<dyn AcquisitionOptimizer>,
        seed: u64,
    ) -> Self {
        Self {
            space,
            acquisition,
            optimizer,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl CandidatePointCalculator for SequentialCalculator {
    fn compute_next_points(
        &mut self,
        model: &dyn SurrogateModel,
        state: &LoopState,
        batch_size: usize,
    ) -> BkResult<Vec<Point>> {
        if batch_size != 1 {
            return Err(CandidateGenerationError::UnsupportedBatchSize {
                expected: 1,
                actual: batch_size,
            }
            .into());
        }
        build_batch(
            &self.space,
            &self.acquisition,
            self.optimizer.as_mut(),
            &mut self.rng,
            model,
            state,
            1,
        )
    }

    fn name(&self) -> &str {
        "sequential"
    }
}

// ---------------------------------------------------------------------------
// Shared batch construction
// ---------------------------------------------------------------------------

/// Fills a batch slot by slot. Penalty centers start as the pending set and
/// grow with every selected point; a slot whose optimizer result is already
/// tracked gets that location penalized and retried, up to
/// [`MAX_DEDUP_RETRIES`] times.
///
/// The Lipschitz constant is derived at most once per call, the first time
/// a penalty surface is actually built, and never carried across batches.
fn build_batch(
    space: &ParameterSpace,
    base: &Arc<dyn AcquisitionFunction>,
    optimizer: &mut dyn AcquisitionOptimizer,
    rng: &mut ChaCha8Rng,
    model: &dyn SurrogateModel,
    state: &LoopState,
    batch_size: usize,
) -> BkResult<Vec<Point>> {
    let mut centers = encode_all(space, state.pending())?;
    let mut lipschitz: Option<f64> = None;
    let mut batch: Vec<Point> = Vec::with_capacity(batch_size);

    for _ in 0..batch_size {
        let mut attempts = 0;
        let point = loop {
            let candidate = if centers.is_empty() {
                optimizer.maximize(base.as_ref(), model, space)?
            } else {
                let constant = match lipschitz {
                    Some(value) => value,
                    None => {
                        let value = estimate_lipschitz_constant(space, model, rng)?;
                        debug!(lipschitz = value, "derived lipschitz constant for batch");
                        lipschitz = Some(value);
                        value
                    }
                };
                let best = model.best_target().ok_or(ModelFitError::NotFitted)?;
                let penalty = LocalPenalization::new(model, &centers, constant, best)?;
                let scored = Sum::new(vec![
                    Arc::new(LogAcquisition::new(Arc::clone(base))),
                    Arc::new(penalty),
                ]);
                optimizer.maximize(&scored, model, space)?
            };

            let tracked = batch.contains(&candidate)
                || state.is_pending(&candidate)
                || state.is_observed(&candidate);
            if !tracked {
                break candidate;
            }

            attempts += 1;
            if attempts > MAX_DEDUP_RETRIES {
                return Err(CandidateGenerationError::RetriesExhausted {
                    requested: batch_size,
                    produced: batch.len(),
                    attempts: MAX_DEDUP_RETRIES,
                }
                .into());
            }
            warn!(
                candidate = %candidate,
                attempts,
                "optimizer returned a tracked point, penalizing and retrying"
            );
            centers.push(space.encode(&candidate)?);
        };

        centers.push(space.encode(&point)?);
        batch.push(point);
    }
    Ok(batch)
}

fn encode_all(space: &ParameterSpace, points: &[Point]) -> BkResult<Vec<Vec<f64>>> {
    points.iter().map(|point| space.encode(point)).collect()
}

// ---------------------------------------------------------------------------
// Lipschitz estimation
// ---------------------------------------------------------------------------

/// Estimates a Lipschitz constant for the objective as the largest gradient
/// norm of the posterior mean, probed at random points plus the training
/// inputs. Flat posteriors fall back to a fixed constant so penalty radii
/// stay finite.
pub(crate) fn estimate_lipschitz_constant(
    space: &ParameterSpace,
    model: &dyn SurrogateModel,
    rng: &mut ChaCha8Rng,
) -> BkResult<f64> {
    let mut probes = Vec::with_capacity(LIPSCHITZ_SAMPLE_COUNT + model.training_size());
    for _ in 0..LIPSCHITZ_SAMPLE_COUNT {
        let point = sample_point(space, rng)?;
        probes.push(space.encode(&point)?);
    }
    probes.extend(model.training_inputs().iter().cloned());

    let norms = probes
        .par_iter()
        .map(|x| mean_gradient_norm(model, x))
        .collect::<BkResult<Vec<f64>>>()?;
    let steepest = norms.into_iter().fold(0.0_f64, f64::max);

    if steepest < MIN_LIPSCHITZ {
        debug!(steepest, "posterior mean is flat, using fallback lipschitz constant");
        return Ok(FALLBACK_LIPSCHITZ);
    }
    Ok(steepest)
}

/// Central-difference gradient norm of the posterior mean at one point.
fn mean_gradient_norm(model: &dyn SurrogateModel, x: &[f64]) -> BkResult<f64> {
    let mut probe = x.to_vec();
    let mut norm_squared = 0.0;
    for i in 0..x.len() {
        let step = GRADIENT_STEP * x[i].abs().max(1.0);
        probe[i] = x[i] + step;
        let upper = model.predict(&probe)?.mean;
        probe[i] = x[i] - step;
        let lower = model.predict(&probe)?.mean;
        probe[i] = x[i];
        let slope = (upper - lower) / (2.0 * step);
        norm_squared += slope * slope;
    }
    Ok(norm_squared.sqrt())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
