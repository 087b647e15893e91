//! The BayesKit optimization loop.
//!
//! Provides:
//! - Loop state bookkeeping: observed vs. pending evaluations, iteration
//!   counter, best-so-far history
//! - The [`LoopEngine`] driving internal (library-evaluated) and external
//!   (caller-evaluated) runs through the same refit schedule
//! - Candidate calculators with local-penalization batch diversification
//! - Random-search acquisition optimization and random designs
//! - Pluggable stopping conditions and a lossy run-event feed

pub mod candidates;
pub mod design;
pub mod engine;
pub mod events;
pub mod optimizer;
pub mod state;
pub mod stopping;

pub use candidates::{
    CandidatePointCalculator, LocalPenalizationCalculator, SequentialCalculator,
    MAX_DEDUP_RETRIES,
};
pub use design::RandomDesign;
pub use engine::{EngineState, LoopConfig, LoopEngine, LoopEngineBuilder, RunReport};
pub use events::LoopEvent;
pub use optimizer::{AcquisitionOptimizer, RandomSearchOptimizer};
pub use state::{LoopState, LoopStateSnapshot};
pub use stopping::{
    AllOf, AnyOf, ConvergenceStoppingCondition, FixedIterationsStoppingCondition,
    StoppingCondition, WallClockStoppingCondition,
};
