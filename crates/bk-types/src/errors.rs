use thiserror::Error;

use crate::point::Point;

/// Main error type for the BayesKit system
#[derive(Error, Debug)]
pub enum BkError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    #[error("Duplicate pending point: {0}")]
    DuplicatePending(#[from] DuplicatePendingError),

    #[error("Unknown pending point: {0}")]
    UnknownPending(#[from] UnknownPendingError),

    #[error("Model fit error: {0}")]
    ModelFit(#[from] ModelFitError),

    #[error("Candidate generation error: {0}")]
    CandidateGeneration(#[from] CandidateGenerationError),

    #[error("Objective evaluation error: {0}")]
    ObjectiveEvaluation(#[from] ObjectiveEvaluationError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while validating seed data, points, or parameter spaces
#[derive(Error, Debug)]
pub enum InvalidInputError {
    #[error("input and output counts differ: {inputs} inputs, {outputs} outputs")]
    LengthMismatch { inputs: usize, outputs: usize },

    #[error("{what} must not be empty")]
    Empty { what: String },

    #[error("point has {actual} values but the space has {expected} parameters")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("value {value} for parameter {name} is outside [{low}, {high}]")]
    OutOfBounds {
        name: String,
        value: f64,
        low: f64,
        high: f64,
    },

    #[error("value {value} for parameter {name} is not one of its allowed values")]
    NotInValueSet { name: String, value: f64 },

    #[error("choice '{choice}' is not valid for parameter {name}")]
    UnknownChoice { name: String, choice: String },

    #[error("value for parameter {name} has the wrong kind: expected {expected}")]
    KindMismatch { name: String, expected: String },

    #[error("non-finite value {value} for parameter {name}")]
    NonFinite { name: String, value: f64 },

    #[error("point {point} violates constraint '{constraint}'")]
    ConstraintViolated { constraint: String, point: Point },

    #[error("duplicate parameter name: {name}")]
    DuplicateParameterName { name: String },

    #[error("invalid bounds for parameter {name}: lower {low} is above upper {high}")]
    InvalidBounds { name: String, low: f64, high: f64 },

    #[error("parameter {name} has no allowed values")]
    EmptyDomain { name: String },

    #[error("duplicate allowed value for parameter {name}")]
    DuplicateDomainValue { name: String },

    #[error("point {point} is already resolved; re-evaluation needs a fresh observation")]
    AlreadyObserved { point: Point },

    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("observation outputs must not be empty")]
    EmptyOutputs,

    #[error("non-finite output {value} in output row {row}")]
    NonFiniteOutput { row: usize, value: f64 },
}

/// A point was marked pending while already pending
#[derive(Error, Debug)]
#[error("point {point} is already pending evaluation")]
pub struct DuplicatePendingError {
    pub point: Point,
}

/// A result was submitted for a point that is not pending
#[derive(Error, Debug)]
#[error("point {point} is not pending evaluation")]
pub struct UnknownPendingError {
    pub point: Point,
}

/// Errors raised while fitting or querying a surrogate model
#[derive(Error, Debug)]
pub enum ModelFitError {
    #[error("cannot fit a model on an empty training set")]
    EmptyTrainingSet,

    #[error("training row {row} has {actual} values, expected {expected}")]
    InconsistentDimensions {
        expected: usize,
        actual: usize,
        row: usize,
    },

    #[error("degenerate training data: {message}")]
    DegenerateData { message: String },

    #[error("covariance matrix is not positive definite ({n_points} training points)")]
    SingularCovariance { n_points: usize },

    #[error("model has not been fitted yet")]
    NotFitted,
}

/// Errors raised while computing the next candidate batch
#[derive(Error, Debug)]
pub enum CandidateGenerationError {
    #[error(
        "requested {requested} distinct points but found {produced} after {attempts} retries"
    )]
    RetriesExhausted {
        requested: usize,
        produced: usize,
        attempts: usize,
    },

    #[error("no feasible point found after {attempts} samples")]
    NoFeasiblePoint { attempts: usize },

    #[error("acquisition '{acquisition}' does not provide gradients")]
    GradientUnavailable { acquisition: String },

    #[error("this calculator only supports batches of {expected}, got {actual}")]
    UnsupportedBatchSize { expected: usize, actual: usize },
}

/// Errors raised by the user objective during internal-mode evaluation
#[derive(Error, Debug)]
pub enum ObjectiveEvaluationError {
    #[error("objective evaluation failed at iteration {iteration}: {message}")]
    Failed { iteration: usize, message: String },

    #[error("objective returned {actual} output rows for {expected} points at iteration {iteration}")]
    RowCountMismatch {
        expected: usize,
        actual: usize,
        iteration: usize,
    },
}

/// Loop engine lifecycle misuse
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("operation '{operation}' is not allowed in state {state}")]
    InvalidState { operation: String, state: String },
}

/// Result type alias for BayesKit operations
pub type BkResult<T> = Result<T, BkError>;

/// Helper trait for converting string errors
pub trait IntoBkError {
    fn into_bk_error(self) -> BkError;
}

impl IntoBkError for String {
    fn into_bk_error(self) -> BkError {
        BkError::Internal(self)
    }
}

impl IntoBkError for &str {
    fn into_bk_error(self) -> BkError {
        BkError::Internal(self.to_string())
    }
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::errors::BkError::Internal(format!($($arg)*))
    };
}
