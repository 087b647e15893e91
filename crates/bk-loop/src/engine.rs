//! The optimization loop engine.
//!
//! [`LoopEngine`] coordinates a surrogate model, a candidate calculator,
//! and the loop state through the `READY -> RUNNING -> STOPPED | FAILED`
//! lifecycle. Internal mode ([`run`](LoopEngine::run)) drives a supplied
//! objective to completion; external mode
//! ([`get_next_points`](LoopEngine::get_next_points)) hands candidates out
//! and takes results back, leaving evaluation and the stopping decision to
//! the caller. Both modes share the same refit schedule, so a run produces
//! the same observations whichever way it is driven.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bk_acquisition::{AcquisitionFunction, ExpectedImprovement};
use bk_models::{GaussianProcess, SurrogateModel};
use bk_types::{
    BkError, BkResult, EngineError, InvalidInputError, Observation, ObjectiveEvaluationError,
    ObjectiveFunction, ParameterSpace, Point, UnknownPendingError,
};

use crate::candidates::{CandidatePointCalculator, LocalPenalizationCalculator};
use crate::events::{emit, LoopEvent};
use crate::optimizer::RandomSearchOptimizer;
use crate::state::{LoopState, LoopStateSnapshot};
use crate::stopping::StoppingCondition;

// ---------------------------------------------------------------------------
// Lifecycle types
// ---------------------------------------------------------------------------

/// Engine lifecycle. `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Ready,
    Running,
    Stopped,
    Failed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EngineState::Ready => "ready",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
            EngineState::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Points proposed per iteration.
    pub batch_size: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { batch_size: 1 }
    }
}

/// Summary of a run, available at any point in the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: EngineState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub iterations: usize,
    pub observation_count: usize,
    pub best: Option<Observation>,
    pub stop_reason: Option<String>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`LoopEngine`]. Model, acquisition, and calculator default
/// to a Gaussian process, expected improvement, and local penalization;
/// a fixed seed makes the whole run reproducible.
pub struct LoopEngineBuilder {
    space: ParameterSpace,
    config: LoopConfig,
    seed: Option<u64>,
    model: Option<Box<dyn SurrogateModel>>,
    acquisition: Option<Arc<dyn AcquisitionFunction>>,
    calculator: Option<Box<dyn CandidatePointCalculator>>,
    event_sender: Option<Sender<LoopEvent>>,
}

impl LoopEngineBuilder {
    fn new(space: ParameterSpace) -> Self {
        Self {
            space,
            config: LoopConfig::default(),
            seed: None,
            model: None,
            acquisition: None,
            calculator: None,
            event_sender: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn model(mut self, model: Box<dyn SurrogateModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Base acquisition used by the default calculator. Ignored when an
    /// explicit calculator is supplied.
    pub fn acquisition(mut self, acquisition: Arc<dyn AcquisitionFunction>) -> Self {
        self.acquisition = Some(acquisition);
        self
    }

    pub fn calculator(mut self, calculator: Box<dyn CandidatePointCalculator>) -> Self {
        self.calculator = Some(calculator);
        self
    }

    pub fn event_sender(mut self, sender: Sender<LoopEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Validates the seed data and produces an engine in `READY` state.
    /// The model is not fitted yet; that happens when the run starts.
    pub fn build(self, seed_x: &[Point], seed_y: &[Vec<f64>]) -> BkResult<LoopEngine> {
        if self.config.batch_size == 0 {
            return Err(InvalidInputError::ZeroBatchSize.into());
        }
        let state = LoopState::initialize(&self.space, seed_x, seed_y)?;

        let model = self
            .model
            .unwrap_or_else(|| Box::new(GaussianProcess::default()));
        let acquisition = self
            .acquisition
            .unwrap_or_else(|| Arc::new(ExpectedImprovement::new()));
        let calculator = match self.calculator {
            Some(calculator) => calculator,
            None => {
                let calculator = match self.seed {
                    Some(seed) => LocalPenalizationCalculator::with_seed(
                        self.space.clone(),
                        acquisition,
                        Box::new(RandomSearchOptimizer::with_seed(seed)),
                        seed,
                    ),
                    None => LocalPenalizationCalculator::new(
                        self.space.clone(),
                        acquisition,
                        Box::new(RandomSearchOptimizer::new()),
                    ),
                };
                Box::new(calculator)
            }
        };

        Ok(LoopEngine {
            run_id: Uuid::new_v4(),
            space: self.space,
            config: self.config,
            model,
            calculator,
            state,
            engine_state: EngineState::Ready,
            event_sender: self.event_sender,
            started_at: None,
            finished_at: None,
            stop_reason: None,
            error: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct LoopEngine {
    run_id: Uuid,
    space: ParameterSpace,
    config: LoopConfig,
    model: Box<dyn SurrogateModel>,
    calculator: Box<dyn CandidatePointCalculator>,
    state: LoopState,
    engine_state: EngineState,
    event_sender: Option<Sender<LoopEvent>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    stop_reason: Option<String>,
    error: Option<String>,
}

impl LoopEngine {
    pub fn builder(space: ParameterSpace) -> LoopEngineBuilder {
        LoopEngineBuilder::new(space)
    }

    // ---- internal mode ----

    /// Runs the loop to completion: each iteration computes a candidate
    /// batch, evaluates the objective on it, appends the results, and
    /// refits the model, until the stopping condition fires. Any failure
    /// transitions the engine to `FAILED` and surfaces the error.
    pub fn run(
        &mut self,
        objective: &mut dyn ObjectiveFunction,
        stopping: &dyn StoppingCondition,
    ) -> BkResult<RunReport> {
        if self.engine_state != EngineState::Ready {
            return Err(self.invalid_state("run"));
        }
        self.mark_running();

        match self.run_to_stop(objective, stopping) {
            Ok(()) => {
                self.mark_stopped(format!("stopping condition '{}' fired", stopping.name()));
                Ok(self.report())
            }
            Err(error) => {
                self.mark_failed(&error);
                Err(error)
            }
        }
    }

    fn run_to_stop(
        &mut self,
        objective: &mut dyn ObjectiveFunction,
        stopping: &dyn StoppingCondition,
    ) -> BkResult<()> {
        // Fit on the seed data before the first batch; a degenerate initial
        // design fails here, before any candidate is computed.
        self.refit_model()?;

        while !stopping.should_stop(&self.state) {
            self.run_iteration(objective)?;
        }
        Ok(())
    }

    fn run_iteration(&mut self, objective: &mut dyn ObjectiveFunction) -> BkResult<()> {
        let iteration = self.state.iteration() + 1;

        // 1. Compute the next batch against the current model.
        let points =
            self.calculator
                .compute_next_points(self.model.as_ref(), &self.state, self.config.batch_size)?;

        // 2. Promise the batch before evaluating, exactly as external mode
        //    would see it.
        self.state.mark_pending(&points)?;

        // 3. Evaluate the objective on the whole batch.
        let rows = match objective.evaluate(&points) {
            Ok(rows) => rows,
            Err(BkError::ObjectiveEvaluation(inner)) => return Err(inner.into()),
            Err(other) => {
                return Err(ObjectiveEvaluationError::Failed {
                    iteration,
                    message: other.to_string(),
                }
                .into())
            }
        };
        if rows.len() != points.len() {
            return Err(ObjectiveEvaluationError::RowCountMismatch {
                expected: points.len(),
                actual: rows.len(),
                iteration,
            }
            .into());
        }

        // 4. Resolve the results and close the iteration.
        for (point, outputs) in points.iter().zip(rows) {
            self.state.resolve_pending(point, outputs)?;
        }
        self.state.advance_iteration();

        // 5. Refit on the full observation set before the next batch.
        self.refit_model()?;

        info!(
            iteration = self.state.iteration(),
            observations = self.state.observation_count(),
            best = ?self.state.best_objective(),
            "iteration completed"
        );
        self.emit_iteration_completed();
        Ok(())
    }

    // ---- external mode ----

    /// Accepts results for previously issued points and returns the next
    /// batch. `results` is empty on the very first call; afterwards each
    /// result must match a pending point (matching is by point identity,
    /// not arrival order). A submission that fails validation leaves the
    /// engine unchanged; model or candidate failures are terminal.
    pub fn get_next_points(&mut self, results: &[Observation]) -> BkResult<Vec<Point>> {
        match self.engine_state {
            EngineState::Ready => {
                // No batch has been issued yet, so a submitted result
                // cannot match a pending point. Reject it before the seed
                // fit so the engine stays READY and emits nothing.
                if let Some(result) = results.first() {
                    return Err(UnknownPendingError {
                        point: result.point.clone(),
                    }
                    .into());
                }
                // First call: fit the seed. On failure the engine stays
                // READY and only the call fails.
                self.refit_model()?;
                self.mark_running();
            }
            EngineState::Running => {}
            EngineState::Stopped | EngineState::Failed => {
                return Err(self.invalid_state("get_next_points"));
            }
        }

        if !results.is_empty() {
            // All-or-nothing: the submission is validated as a whole
            // before any observation lands.
            self.state.resolve_batch(results)?;
            self.state.advance_iteration();

            if let Err(error) = self.refit_model() {
                self.mark_failed(&error);
                return Err(error);
            }
            info!(
                iteration = self.state.iteration(),
                results = results.len(),
                best = ?self.state.best_objective(),
                "external results resolved"
            );
            self.emit_iteration_completed();
        }

        let points = match self.calculator.compute_next_points(
            self.model.as_ref(),
            &self.state,
            self.config.batch_size,
        ) {
            Ok(points) => points,
            Err(error) => {
                self.mark_failed(&error);
                return Err(error);
            }
        };
        self.state.mark_pending(&points)?;
        debug!(count = points.len(), "candidates issued");
        Ok(points)
    }

    /// Ends an external-mode run. Terminal states cannot be stopped again.
    pub fn stop(&mut self, reason: impl Into<String>) -> BkResult<RunReport> {
        match self.engine_state {
            EngineState::Ready | EngineState::Running => {
                self.mark_stopped(reason.into());
                Ok(self.report())
            }
            EngineState::Stopped | EngineState::Failed => Err(self.invalid_state("stop")),
        }
    }

    // ---- accessors ----

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> EngineState {
        self.engine_state
    }

    pub fn loop_state(&self) -> &LoopState {
        &self.state
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn best_observation(&self) -> Option<&Observation> {
        self.state.best_observation()
    }

    pub fn snapshot(&self) -> LoopStateSnapshot {
        self.state.snapshot()
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id,
            state: self.engine_state,
            started_at: self.started_at,
            finished_at: self.finished_at,
            iterations: self.state.iteration(),
            observation_count: self.state.observation_count(),
            best: self.state.best_observation().cloned(),
            stop_reason: self.stop_reason.clone(),
            error: self.error.clone(),
        }
    }

    // ---- internals ----

    fn refit_model(&mut self) -> BkResult<()> {
        let mut x = Vec::with_capacity(self.state.observation_count());
        let mut y = Vec::with_capacity(self.state.observation_count());
        for observation in self.state.observations() {
            x.push(self.space.encode(&observation.point)?);
            y.push(observation.objective());
        }
        self.model.update(&x, &y)
    }

    fn invalid_state(&self, operation: &str) -> BkError {
        EngineError::InvalidState {
            operation: operation.to_string(),
            state: self.engine_state.to_string(),
        }
        .into()
    }

    fn mark_running(&mut self) {
        self.engine_state = EngineState::Running;
        self.started_at = Some(Utc::now());
        info!(
            run_id = %self.run_id,
            observations = self.state.observation_count(),
            batch_size = self.config.batch_size,
            "optimization run started"
        );
        emit(
            &self.event_sender,
            LoopEvent::RunStarted {
                run_id: self.run_id,
                observation_count: self.state.observation_count(),
            },
        );
    }

    fn mark_stopped(&mut self, reason: String) {
        self.engine_state = EngineState::Stopped;
        self.finished_at = Some(Utc::now());
        info!(
            run_id = %self.run_id,
            iterations = self.state.iteration(),
            best = ?self.state.best_objective(),
            reason = %reason,
            "optimization run stopped"
        );
        self.stop_reason = Some(reason);
        emit(
            &self.event_sender,
            LoopEvent::RunFinished {
                run_id: self.run_id,
                iterations: self.state.iteration(),
                best: self.state.best_observation().cloned(),
            },
        );
    }

    fn mark_failed(&mut self, error: &BkError) {
        self.engine_state = EngineState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.to_string());
        warn!(run_id = %self.run_id, error = %error, "optimization run failed");
        emit(
            &self.event_sender,
            LoopEvent::RunFailed {
                run_id: self.run_id,
                error: error.to_string(),
            },
        );
    }

    fn emit_iteration_completed(&self) {
        emit(
            &self.event_sender,
            LoopEvent::IterationCompleted {
                run_id: self.run_id,
                iteration: self.state.iteration(),
                observation_count: self.state.observation_count(),
                best_objective: self.state.best_objective().unwrap_or(f64::INFINITY),
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
