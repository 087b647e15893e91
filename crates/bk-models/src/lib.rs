//! # bk-models
//!
//! Surrogate models for BayesKit: the [`SurrogateModel`] contract the loop
//! engine drives, and a Gaussian process implementation of it.

mod gaussian_process;
mod surrogate;

pub use gaussian_process::{GaussianProcess, GaussianProcessConfig};
pub use surrogate::{Prediction, SurrogateModel};
