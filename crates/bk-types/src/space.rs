//! Parameter space definitions: typed dimensions, bounds, and constraints.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{BkResult, InvalidInputError};
use crate::point::{ParameterValue, Point};

/// A single parameter dimension in the optimization domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Human-readable parameter name (e.g. "learning_rate").
    pub name: String,
    /// The kind of domain this parameter ranges over.
    pub kind: ParameterKind,
}

/// Describes the domain of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous range [low, high].
    Continuous { low: f64, high: f64 },
    /// Finite set of allowed numeric values.
    Discrete { values: Vec<f64> },
    /// Categorical choices.
    Categorical { choices: Vec<String> },
}

impl ParameterKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ParameterKind::Continuous { .. } => "continuous",
            ParameterKind::Discrete { .. } => "discrete",
            ParameterKind::Categorical { .. } => "categorical",
        }
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// A named predicate over full points. Points failing any constraint are
/// rejected at validation time and by the sampling layer.
#[derive(Clone)]
pub struct Constraint {
    name: String,
    predicate: Arc<dyn Fn(&Point) -> bool + Send + Sync>,
}

impl Constraint {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&Point) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_satisfied(&self, point: &Point) -> bool {
        (self.predicate)(point)
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Parameter space
// ---------------------------------------------------------------------------

/// The full optimization domain: an ordered list of parameter definitions
/// plus zero or more constraints. Constructed once and read-only for the
/// life of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub parameters: Vec<Parameter>,
    #[serde(skip)]
    constraints: Vec<Constraint>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn add_continuous(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            kind: ParameterKind::Continuous { low, high },
        });
        self
    }

    pub fn add_discrete(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            kind: ParameterKind::Discrete { values },
        });
        self
    }

    pub fn add_categorical(mut self, name: impl Into<String>, choices: &[&str]) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            kind: ParameterKind::Categorical {
                choices: choices.iter().map(|c| c.to_string()).collect(),
            },
        });
        self
    }

    pub fn with_constraint(
        mut self,
        name: impl Into<String>,
        predicate: impl Fn(&Point) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.constraints.push(Constraint::new(name, predicate));
        self
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Checks the structural invariants of the space itself: at least one
    /// parameter, unique names, ordered bounds, non-empty duplicate-free
    /// value sets.
    pub fn validate(&self) -> BkResult<()> {
        if self.parameters.is_empty() {
            return Err(InvalidInputError::Empty {
                what: "parameter space".to_string(),
            }
            .into());
        }

        let mut seen_names: Vec<&str> = Vec::new();
        for param in &self.parameters {
            if seen_names.contains(&param.name.as_str()) {
                return Err(InvalidInputError::DuplicateParameterName {
                    name: param.name.clone(),
                }
                .into());
            }
            seen_names.push(&param.name);

            match &param.kind {
                ParameterKind::Continuous { low, high } => {
                    if !low.is_finite() || !high.is_finite() || low > high {
                        return Err(InvalidInputError::InvalidBounds {
                            name: param.name.clone(),
                            low: *low,
                            high: *high,
                        }
                        .into());
                    }
                }
                ParameterKind::Discrete { values } => {
                    if values.is_empty() {
                        return Err(InvalidInputError::EmptyDomain {
                            name: param.name.clone(),
                        }
                        .into());
                    }
                    let mut seen = std::collections::HashSet::new();
                    for value in values {
                        if !value.is_finite() {
                            return Err(InvalidInputError::NonFinite {
                                name: param.name.clone(),
                                value: *value,
                            }
                            .into());
                        }
                        if !seen.insert(value.to_bits()) {
                            return Err(InvalidInputError::DuplicateDomainValue {
                                name: param.name.clone(),
                            }
                            .into());
                        }
                    }
                }
                ParameterKind::Categorical { choices } => {
                    if choices.is_empty() {
                        return Err(InvalidInputError::EmptyDomain {
                            name: param.name.clone(),
                        }
                        .into());
                    }
                    let mut seen = std::collections::HashSet::new();
                    for choice in choices {
                        if !seen.insert(choice.as_str()) {
                            return Err(InvalidInputError::DuplicateDomainValue {
                                name: param.name.clone(),
                            }
                            .into());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks that a point is a member of this space: right dimension, each
    /// slot of the right kind and within its domain, all constraints
    /// satisfied.
    pub fn validate_point(&self, point: &Point) -> BkResult<()> {
        if point.len() != self.parameters.len() {
            return Err(InvalidInputError::DimensionMismatch {
                expected: self.parameters.len(),
                actual: point.len(),
            }
            .into());
        }

        for (param, value) in self.parameters.iter().zip(&point.values) {
            match (&param.kind, value) {
                (ParameterKind::Continuous { low, high }, ParameterValue::Float(v)) => {
                    if !v.is_finite() {
                        return Err(InvalidInputError::NonFinite {
                            name: param.name.clone(),
                            value: *v,
                        }
                        .into());
                    }
                    if v < low || v > high {
                        return Err(InvalidInputError::OutOfBounds {
                            name: param.name.clone(),
                            value: *v,
                            low: *low,
                            high: *high,
                        }
                        .into());
                    }
                }
                (ParameterKind::Discrete { values }, ParameterValue::Float(v)) => {
                    if !v.is_finite() {
                        return Err(InvalidInputError::NonFinite {
                            name: param.name.clone(),
                            value: *v,
                        }
                        .into());
                    }
                    if !values.iter().any(|allowed| allowed.to_bits() == v.to_bits()) {
                        return Err(InvalidInputError::NotInValueSet {
                            name: param.name.clone(),
                            value: *v,
                        }
                        .into());
                    }
                }
                (ParameterKind::Categorical { choices }, ParameterValue::Choice(c)) => {
                    if !choices.contains(c) {
                        return Err(InvalidInputError::UnknownChoice {
                            name: param.name.clone(),
                            choice: c.clone(),
                        }
                        .into());
                    }
                }
                (kind, _) => {
                    return Err(InvalidInputError::KindMismatch {
                        name: param.name.clone(),
                        expected: kind.describe().to_string(),
                    }
                    .into());
                }
            }
        }

        for constraint in &self.constraints {
            if !constraint.is_satisfied(point) {
                return Err(InvalidInputError::ConstraintViolated {
                    constraint: constraint.name().to_string(),
                    point: point.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.validate_point(point).is_ok()
    }

    /// Numeric encoding of a point, in space order: continuous and discrete
    /// slots pass through, categorical slots become their choice index.
    pub fn encode(&self, point: &Point) -> BkResult<Vec<f64>> {
        if point.len() != self.parameters.len() {
            return Err(InvalidInputError::DimensionMismatch {
                expected: self.parameters.len(),
                actual: point.len(),
            }
            .into());
        }

        let mut encoded = Vec::with_capacity(point.len());
        for (param, value) in self.parameters.iter().zip(&point.values) {
            match (&param.kind, value) {
                (ParameterKind::Continuous { .. }, ParameterValue::Float(v))
                | (ParameterKind::Discrete { .. }, ParameterValue::Float(v)) => encoded.push(*v),
                (ParameterKind::Categorical { choices }, ParameterValue::Choice(c)) => {
                    let index = choices.iter().position(|choice| choice == c).ok_or_else(|| {
                        InvalidInputError::UnknownChoice {
                            name: param.name.clone(),
                            choice: c.clone(),
                        }
                    })?;
                    encoded.push(index as f64);
                }
                (kind, _) => {
                    return Err(InvalidInputError::KindMismatch {
                        name: param.name.clone(),
                        expected: kind.describe().to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(encoded)
    }
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self::new()
    }
}
