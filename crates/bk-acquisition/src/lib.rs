//! # bk-acquisition
//!
//! Acquisition functions for BayesKit: the scoring contract the candidate
//! calculators maximize, algebraic composites (sum, product, log), Expected
//! Improvement, and the local-penalization batch penalizer.

mod acquisition;
mod expected_improvement;
mod local_penalization;
mod math;

pub use acquisition::{AcquisitionFunction, LogAcquisition, Product, Sum};
pub use expected_improvement::ExpectedImprovement;
pub use local_penalization::LocalPenalization;
