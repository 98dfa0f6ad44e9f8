// src/stages/read_value.rs

//! `read_value` stage: extract the measured values for one attempt from the
//! test's output artifact.
//!
//! A pending reader waits for its `run_test` dependency. Once the test has
//! completed, the results file is fetched from the artifact store and parsed
//! according to the read mode. The reader then completes in one step, either
//! with values or with a structured error.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::predicates::{task_state_in, task_type_is};
use crate::engine::{
    Action, Context, DispatchByEventType, Evaluator, Event, EventType, FilteringEvaluator,
};
use crate::errors::{BisectError, Result};
use crate::graph::{
    Change, Dimension, ErrorMessage, GraphJsonOptions, ReadOptions, ReadValuePayload, Task,
    TaskId, TaskPayload, TaskState, TaskType, TaskView, TraceUrl,
};
use crate::services::ArtifactStore;
use crate::stages::histogram::{self, HistogramSet};
use crate::types::ReadMode;

/// Failures while reading a results file. Each maps to the `reason` of the
/// error recorded on the task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadValueError {
    #[error("results file '{0}' is not present in the test output")]
    NoFile(String),

    #[error("no histogram matched ({0})")]
    NotFound(String),

    #[error("matching histograms carry no values")]
    NoValues,

    #[error("chart '{0}' not found")]
    ChartNotFound(String),

    #[error("trace '{0}' not found")]
    TraceNotFound(String),

    #[error("invalid results file: {0}")]
    InvalidJson(String),

    #[error("fetching test output failed: {0}")]
    ArtifactFetch(String),
}

impl ReadValueError {
    pub fn reason(&self) -> &'static str {
        match self {
            ReadValueError::NoFile(_) => "ReadValueNoFile",
            ReadValueError::NotFound(_) => "ReadValueNotFound",
            ReadValueError::NoValues => "ReadValueNoValues",
            ReadValueError::ChartNotFound(_) => "ReadValueChartNotFound",
            ReadValueError::TraceNotFound(_) => "ReadValueTraceNotFound",
            ReadValueError::InvalidJson(_) => "ReadValueInvalidJson",
            ReadValueError::ArtifactFetch(_) => "ArtifactFetchFailed",
        }
    }

    pub fn to_error_message(&self) -> ErrorMessage {
        ErrorMessage::new(self.reason(), self.to_string())
    }
}

pub fn task_id(change: &Change, attempt: u32) -> TaskId {
    format!("read_value_{}_{}", change.id_string(), attempt)
}

/// Path of the results file inside the test output. Windows bots use
/// backslash separators.
pub fn results_path(read: &ReadOptions, dimensions: &[Dimension]) -> String {
    let windows = dimensions
        .iter()
        .any(|d| d.key == "os" && d.value.starts_with("Win"));
    let separator = if windows { "\\" } else { "/" };
    if read.benchmark.is_empty() {
        read.results_filename.clone()
    } else {
        format!("{}{}{}", read.benchmark, separator, read.results_filename)
    }
}

/// The `read_value` evaluator: pending readers on initiate and update events.
pub fn evaluator(artifacts: Arc<dyn ArtifactStore>) -> impl Evaluator {
    let reader = ReadValueEvaluator { artifacts };
    let of_type = task_type_is(TaskType::ReadValue);
    let pending = task_state_in([TaskState::Pending]);
    FilteringEvaluator::new(
        move |task: &Task, event: &Event, context: &Context| {
            of_type(task, event, context) && pending(task, event, context)
        },
        DispatchByEventType::new()
            .register(EventType::Initiate, reader.clone())
            .register(EventType::Update, reader),
    )
}

#[derive(Clone)]
struct ReadValueEvaluator {
    artifacts: Arc<dyn ArtifactStore>,
}

impl Evaluator for ReadValueEvaluator {
    fn evaluate(&self, task: &Task, _event: &Event, context: &mut Context) -> Result<Vec<Action>> {
        let payload = task
            .payload
            .as_read_value()
            .ok_or_else(|| BisectError::evaluator(&task.id, "expected a read_value payload"))?;
        let Some(dep_id) = task.dependencies.first() else {
            return Err(BisectError::evaluator(&task.id, "read_value task has no run_test dependency"));
        };
        let Some(dep) = context.get(dep_id) else {
            return Err(BisectError::evaluator(
                &task.id,
                format!("dependency '{dep_id}' missing from context"),
            ));
        };

        match dep.state {
            TaskState::Pending | TaskState::Ongoing => Ok(Vec::new()),
            TaskState::Failed => Ok(vec![Action::fail(
                &task.id,
                task.payload.clone(),
                ErrorMessage::new(
                    "DependencyFailed",
                    format!("Task dependency \"{dep_id}\" ended in failed state."),
                ),
            )]),
            TaskState::Completed => Ok(vec![self.read(task, payload, dep)]),
        }
    }
}

impl ReadValueEvaluator {
    fn read(&self, task: &Task, payload: &ReadValuePayload, dep: &TaskView) -> Action {
        let mut next = payload.clone();
        match self.read_values(payload, dep) {
            Ok((values, trace_urls)) => {
                debug!(task = %task.id, values = values.len(), "read result values");
                next.output.result_values = values;
                next.output.trace_urls = trace_urls;
                Action::update(&task.id, TaskState::Completed, TaskPayload::ReadValue(next))
            }
            Err(e) => {
                warn!(task = %task.id, reason = e.reason(), error = %e, "reading results failed");
                Action::fail(&task.id, TaskPayload::ReadValue(next), e.to_error_message())
            }
        }
    }

    fn read_values(
        &self,
        payload: &ReadValuePayload,
        dep: &TaskView,
    ) -> std::result::Result<(Vec<f64>, Vec<TraceUrl>), ReadValueError> {
        let output = dep
            .payload
            .as_run_test()
            .and_then(|p| p.output.output.as_ref())
            .ok_or_else(|| ReadValueError::ArtifactFetch("test produced no output artifact".to_string()))?;

        let files = self
            .artifacts
            .files(output)
            .map_err(|e| ReadValueError::ArtifactFetch(e.to_string()))?;

        let path = &payload.input.results_path;
        let content = files
            .get(path)
            .or_else(|| files.get(&path.replace('\\', "/")))
            .ok_or_else(|| ReadValueError::NoFile(path.clone()))?;

        let data: Value =
            serde_json::from_str(content).map_err(|e| ReadValueError::InvalidJson(e.to_string()))?;

        match payload.input.read.mode {
            ReadMode::HistogramSets => {
                let set = HistogramSet::from_json(&data)?;
                let values = histogram::extract_values(&set, &payload.input.read.histogram)?;
                Ok((values, set.trace_urls()))
            }
            ReadMode::GraphJson => {
                let values = graph_json_values(&data, &payload.input.read.graph_json)?;
                Ok((values, Vec::new()))
            }
        }
    }
}

/// `data[chart].traces[trace][0]`; nothing is read unless both are named.
pub fn graph_json_values(
    data: &Value,
    options: &GraphJsonOptions,
) -> std::result::Result<Vec<f64>, ReadValueError> {
    let (Some(chart), Some(trace)) = (options.chart.as_deref(), options.trace.as_deref()) else {
        return Ok(Vec::new());
    };
    let chart_data = data
        .get(chart)
        .ok_or_else(|| ReadValueError::ChartNotFound(chart.to_string()))?;
    let first = chart_data
        .get("traces")
        .and_then(|t| t.get(trace))
        .ok_or_else(|| ReadValueError::TraceNotFound(trace.to_string()))?
        .get(0)
        .ok_or_else(|| ReadValueError::InvalidJson(format!("trace '{trace}' is empty")))?;

    let value = match first {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ReadValueError::InvalidJson(format!("trace '{trace}' value is not numeric")))?;
    Ok(vec![value])
}
