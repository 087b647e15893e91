use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A single slot of a point: one value for one parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Choice(String),
}

impl ParameterValue {
    /// Numeric payload, if this slot holds one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Choice(_) => None,
        }
    }
}

// Identity is exact: float slots compare and hash by bit pattern. Non-finite
// values never survive space validation, so reflexivity holds for any value
// that reaches loop state.
impl PartialEq for ParameterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParameterValue::Float(a), ParameterValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ParameterValue::Choice(a), ParameterValue::Choice(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParameterValue {}

impl Hash for ParameterValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            ParameterValue::Float(v) => v.to_bits().hash(state),
            ParameterValue::Choice(c) => c.hash(state),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Choice(c) => write!(f, "{}", c),
        }
    }
}

/// One value per parameter, in parameter-space order.
///
/// Points are hashable so pending bookkeeping can match submitted results
/// back to previously issued candidates by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub values: Vec<ParameterValue>,
}

impl Point {
    pub fn new(values: Vec<ParameterValue>) -> Self {
        Self { values }
    }

    /// Builds a point of float slots, for all-numeric spaces.
    pub fn from_floats(values: &[f64]) -> Self {
        Self {
            values: values.iter().map(|v| ParameterValue::Float(*v)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}

/// A resolved evaluation: the point and the outputs it produced.
///
/// `outputs` holds the objective first, followed by any auxiliary values
/// (constraint measurements, secondary metrics). Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub point: Point,
    pub outputs: Vec<f64>,
}

impl Observation {
    /// Single-output observation.
    pub fn new(point: Point, objective: f64) -> Self {
        Self {
            point,
            outputs: vec![objective],
        }
    }

    pub fn with_outputs(point: Point, outputs: Vec<f64>) -> Self {
        Self { point, outputs }
    }

    /// The objective value (first output).
    pub fn objective(&self) -> f64 {
        self.outputs.first().copied().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f({}) = {}", self.point, self.objective())
    }
}
