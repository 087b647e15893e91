//! Stopping conditions.
//!
//! Conditions are pure predicates over [`LoopState`]: checking one never
//! mutates anything, so repeated checks on unchanged state always agree.
//! Combine them with [`AllOf`] and [`AnyOf`].

use std::time::{Duration, Instant};

use crate::state::LoopState;

/// Decides whether the optimization loop should stop.
pub trait StoppingCondition: Send + Sync {
    fn should_stop(&self, state: &LoopState) -> bool;

    fn name(&self) -> &str {
        "stopping_condition"
    }
}

// ---------------------------------------------------------------------------
// Basic conditions
// ---------------------------------------------------------------------------

/// Stops after a fixed number of completed iterations.
#[derive(Debug, Clone, Copy)]
pub struct FixedIterationsStoppingCondition {
    max_iterations: usize,
}

impl FixedIterationsStoppingCondition {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl StoppingCondition for FixedIterationsStoppingCondition {
    fn should_stop(&self, state: &LoopState) -> bool {
        state.iteration() >= self.max_iterations
    }

    fn name(&self) -> &str {
        "fixed_iterations"
    }
}

/// Stops when the best observed value has improved by at most `epsilon`
/// over the last `patience` completed iterations.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceStoppingCondition {
    epsilon: f64,
    patience: usize,
}

impl ConvergenceStoppingCondition {
    pub fn new(epsilon: f64, patience: usize) -> Self {
        Self {
            epsilon,
            patience: patience.max(1),
        }
    }
}

impl StoppingCondition for ConvergenceStoppingCondition {
    fn should_stop(&self, state: &LoopState) -> bool {
        let history = state.best_history();
        if history.len() <= self.patience {
            return false;
        }
        let newest = history[history.len() - 1];
        let reference = history[history.len() - 1 - self.patience];
        reference - newest <= self.epsilon
    }

    fn name(&self) -> &str {
        "convergence"
    }
}

/// Stops once a wall-clock budget, fixed at construction, has elapsed.
#[derive(Debug, Clone, Copy)]
pub struct WallClockStoppingCondition {
    deadline: Instant,
}

impl WallClockStoppingCondition {
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }
}

impl StoppingCondition for WallClockStoppingCondition {
    fn should_stop(&self, _state: &LoopState) -> bool {
        Instant::now() >= self.deadline
    }

    fn name(&self) -> &str {
        "wall_clock"
    }
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// Fires only when every inner condition fires.
pub struct AllOf {
    conditions: Vec<Box<dyn StoppingCondition>>,
}

impl AllOf {
    pub fn new(conditions: Vec<Box<dyn StoppingCondition>>) -> Self {
        Self { conditions }
    }
}

impl StoppingCondition for AllOf {
    fn should_stop(&self, state: &LoopState) -> bool {
        self.conditions.iter().all(|c| c.should_stop(state))
    }

    fn name(&self) -> &str {
        "all_of"
    }
}

/// Fires as soon as any inner condition fires.
pub struct AnyOf {
    conditions: Vec<Box<dyn StoppingCondition>>,
}

impl AnyOf {
    pub fn new(conditions: Vec<Box<dyn StoppingCondition>>) -> Self {
        Self { conditions }
    }
}

impl StoppingCondition for AnyOf {
    fn should_stop(&self, state: &LoopState) -> bool {
        self.conditions.iter().any(|c| c.should_stop(state))
    }

    fn name(&self) -> &str {
        "any_of"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
