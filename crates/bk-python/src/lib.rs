use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use bk_loop::{FixedIterationsStoppingCondition, LoopEngine};
use bk_types::{
    internal_error, BkError, BkResult, Observation, ObjectiveFunction, ParameterKind,
    ParameterSpace, ParameterValue, Point,
};

/// BayesKit Python module
#[pymodule]
fn bayeskit(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_class::<PyParameterSpace>()?;
    m.add_class::<PyLoopEngine>()?;
    Ok(())
}

fn to_py_err(error: BkError) -> PyErr {
    match &error {
        BkError::InvalidInput(_) | BkError::DuplicatePending(_) | BkError::UnknownPending(_) => {
            PyValueError::new_err(error.to_string())
        }
        _ => PyRuntimeError::new_err(error.to_string()),
    }
}

/// Decodes one numeric row into a point. Categorical parameters travel as
/// choice indices.
fn row_to_point(space: &ParameterSpace, row: &[f64]) -> PyResult<Point> {
    if row.len() != space.len() {
        return Err(PyValueError::new_err(format!(
            "expected {} values per point, got {}",
            space.len(),
            row.len()
        )));
    }
    let mut values = Vec::with_capacity(row.len());
    for (value, parameter) in row.iter().zip(&space.parameters) {
        match &parameter.kind {
            ParameterKind::Continuous { .. } | ParameterKind::Discrete { .. } => {
                values.push(ParameterValue::Float(*value));
            }
            ParameterKind::Categorical { choices } => {
                let index = value.round();
                if index < 0.0 || index >= choices.len() as f64 {
                    return Err(PyValueError::new_err(format!(
                        "choice index {value} is out of range for parameter '{}'",
                        parameter.name
                    )));
                }
                values.push(ParameterValue::Choice(choices[index as usize].clone()));
            }
        }
    }
    Ok(Point::new(values))
}

fn point_to_row(space: &ParameterSpace, point: &Point) -> PyResult<Vec<f64>> {
    space.encode(point).map_err(to_py_err)
}

/// Python wrapper for ParameterSpace
#[pyclass]
struct PyParameterSpace {
    inner: ParameterSpace,
}

#[pymethods]
impl PyParameterSpace {
    #[new]
    fn new() -> Self {
        Self {
            inner: ParameterSpace::new(),
        }
    }

    fn add_continuous(&mut self, name: &str, low: f64, high: f64) {
        self.inner = self.inner.clone().add_continuous(name, low, high);
    }

    fn add_discrete(&mut self, name: &str, values: Vec<f64>) {
        self.inner = self.inner.clone().add_discrete(name, values);
    }

    fn add_categorical(&mut self, name: &str, choices: Vec<String>) {
        let borrowed: Vec<&str> = choices.iter().map(String::as_str).collect();
        self.inner = self.inner.clone().add_categorical(name, &borrowed);
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        let names: Vec<&str> = self
            .inner
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        format!("ParameterSpace({})", names.join(", "))
    }
}

/// Calls back into a Python objective, one point at a time.
struct PyObjective {
    callable: Py<PyAny>,
    space: ParameterSpace,
}

impl ObjectiveFunction for PyObjective {
    fn evaluate(&mut self, points: &[Point]) -> BkResult<Vec<Vec<f64>>> {
        Python::with_gil(|py| {
            let mut rows = Vec::with_capacity(points.len());
            for point in points {
                let row = self.space.encode(point)?;
                let value = self
                    .callable
                    .call1(py, (row,))
                    .and_then(|result| result.extract::<f64>(py))
                    .map_err(|err| internal_error!("python objective raised: {err}"))?;
                rows.push(vec![value]);
            }
            Ok(rows)
        })
    }

    fn name(&self) -> &str {
        "python_objective"
    }
}

/// Python wrapper for the optimization loop engine
#[pyclass]
struct PyLoopEngine {
    engine: LoopEngine,
    space: ParameterSpace,
}

#[pymethods]
impl PyLoopEngine {
    #[new]
    #[pyo3(signature = (space, seed_x, seed_y, batch_size=1, seed=None))]
    fn new(
        space: &PyParameterSpace,
        seed_x: Vec<Vec<f64>>,
        seed_y: Vec<Vec<f64>>,
        batch_size: usize,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        let inner = space.inner.clone();
        let points = seed_x
            .iter()
            .map(|row| row_to_point(&inner, row))
            .collect::<PyResult<Vec<Point>>>()?;

        let mut builder = LoopEngine::builder(inner.clone()).batch_size(batch_size);
        if let Some(seed) = seed {
            builder = builder.seed(seed);
        }
        let engine = builder.build(&points, &seed_y).map_err(to_py_err)?;
        Ok(Self {
            engine,
            space: inner,
        })
    }

    /// Submit results for previously issued points and receive the next
    /// batch, as rows of encoded values.
    #[pyo3(signature = (results_x=Vec::new(), results_y=Vec::new()))]
    fn get_next_points(
        &mut self,
        results_x: Vec<Vec<f64>>,
        results_y: Vec<Vec<f64>>,
    ) -> PyResult<Vec<Vec<f64>>> {
        if results_x.len() != results_y.len() {
            return Err(PyValueError::new_err(format!(
                "{} result points but {} output rows",
                results_x.len(),
                results_y.len()
            )));
        }
        let results = results_x
            .iter()
            .zip(results_y)
            .map(|(row, outputs)| {
                Ok(Observation::with_outputs(
                    row_to_point(&self.space, row)?,
                    outputs,
                ))
            })
            .collect::<PyResult<Vec<Observation>>>()?;

        let points = self.engine.get_next_points(&results).map_err(to_py_err)?;
        points
            .iter()
            .map(|point| point_to_row(&self.space, point))
            .collect()
    }

    /// Drive the loop internally against a Python callable for a fixed
    /// number of iterations. Returns the run report as JSON.
    fn run(&mut self, objective: Py<PyAny>, max_iterations: usize) -> PyResult<String> {
        let mut objective = PyObjective {
            callable: objective,
            space: self.space.clone(),
        };
        let report = self
            .engine
            .run(
                &mut objective,
                &FixedIterationsStoppingCondition::new(max_iterations),
            )
            .map_err(to_py_err)?;
        serde_json::to_string(&report).map_err(|err| PyRuntimeError::new_err(err.to_string()))
    }

    /// End an externally driven run. Returns the run report as JSON.
    fn stop(&mut self, reason: &str) -> PyResult<String> {
        let report = self.engine.stop(reason).map_err(to_py_err)?;
        serde_json::to_string(&report).map_err(|err| PyRuntimeError::new_err(err.to_string()))
    }

    #[getter]
    fn state(&self) -> String {
        self.engine.state().to_string()
    }

    #[getter]
    fn iteration(&self) -> usize {
        self.engine.loop_state().iteration()
    }

    #[getter]
    fn observation_count(&self) -> usize {
        self.engine.loop_state().observation_count()
    }

    /// Best observation so far as `(point_row, objective)`.
    fn best(&self) -> PyResult<Option<(Vec<f64>, f64)>> {
        match self.engine.best_observation() {
            Some(observation) => {
                let row = point_to_row(&self.space, &observation.point)?;
                Ok(Some((row, observation.objective())))
            }
            None => Ok(None),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "LoopEngine(state='{}', iteration={}, observations={})",
            self.engine.state(),
            self.engine.loop_state().iteration(),
            self.engine.loop_state().observation_count()
        )
    }
}
