// src/graph/payload.rs

//! Typed task payloads.
//!
//! Every payload has the same outer shape: a per-type `input` fixed at
//! creation, a per-type `output` filled in by the evaluators, and a list of
//! structured `errors`. On the wire the union is tagged by `"type"`.

use serde::{Deserialize, Serialize};

use crate::graph::change::Change;
use crate::graph::task::TaskType;
use crate::types::{ReadMode, Statistic};

/// Structured, domain-level failure attached to a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub reason: String,
    pub message: String,
}

impl ErrorMessage {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Reference to a build or test artifact held by the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub server: String,
    pub digest: String,
}

impl ArtifactRef {
    pub fn new(server: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            digest: digest.into(),
        }
    }
}

/// Capability requirement for the test worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Per-job templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub builder: String,
    pub target: String,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOptions {
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    pub execution_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistogramOptions {
    #[serde(default)]
    pub histogram_name: Option<String>,
    #[serde(default)]
    pub grouping_label: Option<String>,
    #[serde(default)]
    pub story: Option<String>,
    #[serde(default)]
    pub statistic: Option<Statistic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphJsonOptions {
    #[serde(default)]
    pub chart: Option<String>,
    #[serde(default)]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    pub benchmark: String,
    pub mode: ReadMode,
    pub results_filename: String,
    #[serde(default)]
    pub histogram: HistogramOptions,
    #[serde(default)]
    pub graph_json: GraphJsonOptions,
}

/// Statistical confidence policy for the bisection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub comparison_magnitude: f64,
    pub min_attempts: u32,
    pub max_attempts: u32,
}

pub const DEFAULT_COMPARISON_MAGNITUDE: f64 = 1.0;
pub const DEFAULT_MIN_ATTEMPTS: u32 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

impl AnalysisOptions {
    /// Replace zero values with defaults and keep `max_attempts >= min_attempts`.
    pub fn normalized(&self) -> Self {
        let comparison_magnitude = if self.comparison_magnitude > 0.0 {
            self.comparison_magnitude
        } else {
            DEFAULT_COMPARISON_MAGNITUDE
        };
        let min_attempts = if self.min_attempts == 0 {
            DEFAULT_MIN_ATTEMPTS
        } else {
            self.min_attempts
        };
        let max_attempts = if self.max_attempts == 0 {
            DEFAULT_MAX_ATTEMPTS
        } else {
            self.max_attempts
        };
        Self {
            comparison_magnitude,
            min_attempts,
            max_attempts: max_attempts.max(min_attempts),
        }
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            comparison_magnitude: DEFAULT_COMPARISON_MAGNITUDE,
            min_attempts: DEFAULT_MIN_ATTEMPTS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

// ---------------------------------------------------------------------------
// find_isolate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindIsolateInput {
    pub change: Change,
    pub build: BuildOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FindIsolateOutput {
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub build_url: Option<String>,
    #[serde(default)]
    pub artifact: Option<ArtifactRef>,
    #[serde(default)]
    pub tries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindIsolatePayload {
    pub input: FindIsolateInput,
    #[serde(default)]
    pub output: FindIsolateOutput,
    #[serde(default)]
    pub errors: Vec<ErrorMessage>,
}

// ---------------------------------------------------------------------------
// run_test
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTestInput {
    pub change: Change,
    pub attempt: u32,
    pub test: TestOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunTestOutput {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub output: Option<ArtifactRef>,
    #[serde(default)]
    pub tries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTestPayload {
    pub input: RunTestInput,
    #[serde(default)]
    pub output: RunTestOutput,
    #[serde(default)]
    pub errors: Vec<ErrorMessage>,
}

// ---------------------------------------------------------------------------
// read_value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadValueInput {
    pub change: Change,
    pub attempt: u32,
    pub read: ReadOptions,
    /// Location of the results file inside the test output artifact.
    pub results_path: String,
}

/// A trace link recorded by the benchmark harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceUrl {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReadValueOutput {
    #[serde(default)]
    pub result_values: Vec<f64>,
    #[serde(default)]
    pub trace_urls: Vec<TraceUrl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadValuePayload {
    pub input: ReadValueInput,
    #[serde(default)]
    pub output: ReadValueOutput,
    #[serde(default)]
    pub errors: Vec<ErrorMessage>,
}

// ---------------------------------------------------------------------------
// find_culprit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindCulpritInput {
    pub start_change: Change,
    pub end_change: Change,
    pub analysis: AnalysisOptions,
    pub build: BuildOptions,
    pub test: TestOptions,
    pub read: ReadOptions,
}

/// Outcome of comparing the samples of two adjacent changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Same,
    Different,
    Unknown,
    Pending,
}

impl Verdict {
    /// Same and Different are final; the others may change with more data.
    pub fn is_resolved(self) -> bool {
        matches!(self, Verdict::Same | Verdict::Different)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairVerdict {
    pub from: Change,
    pub to: Change,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CulpritRange {
    pub from: Change,
    pub to: Change,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub change: Change,
    pub result_values: Vec<f64>,
    pub attempts: u32,
    pub failed_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindCulpritOutput {
    /// Every change between the endpoints, oldest first.
    #[serde(default)]
    pub commit_range: Vec<Change>,
    #[serde(default)]
    pub change_results: Vec<ChangeResult>,
    #[serde(default)]
    pub verdicts: Vec<PairVerdict>,
    #[serde(default)]
    pub culprits: Vec<CulpritRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindCulpritPayload {
    pub input: FindCulpritInput,
    #[serde(default)]
    pub output: FindCulpritOutput,
    #[serde(default)]
    pub errors: Vec<ErrorMessage>,
}

// ---------------------------------------------------------------------------
// Union
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    FindIsolate(FindIsolatePayload),
    RunTest(RunTestPayload),
    ReadValue(ReadValuePayload),
    FindCulprit(FindCulpritPayload),
}

impl TaskPayload {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskPayload::FindIsolate(_) => TaskType::FindIsolate,
            TaskPayload::RunTest(_) => TaskType::RunTest,
            TaskPayload::ReadValue(_) => TaskType::ReadValue,
            TaskPayload::FindCulprit(_) => TaskType::FindCulprit,
        }
    }

    pub fn errors(&self) -> &[ErrorMessage] {
        match self {
            TaskPayload::FindIsolate(p) => &p.errors,
            TaskPayload::RunTest(p) => &p.errors,
            TaskPayload::ReadValue(p) => &p.errors,
            TaskPayload::FindCulprit(p) => &p.errors,
        }
    }

    /// Append an error regardless of the payload type.
    pub fn push_error(&mut self, error: ErrorMessage) {
        match self {
            TaskPayload::FindIsolate(p) => p.errors.push(error),
            TaskPayload::RunTest(p) => p.errors.push(error),
            TaskPayload::ReadValue(p) => p.errors.push(error),
            TaskPayload::FindCulprit(p) => p.errors.push(error),
        }
    }

    pub fn clear_errors(&mut self) {
        match self {
            TaskPayload::FindIsolate(p) => p.errors.clear(),
            TaskPayload::RunTest(p) => p.errors.clear(),
            TaskPayload::ReadValue(p) => p.errors.clear(),
            TaskPayload::FindCulprit(p) => p.errors.clear(),
        }
    }

    /// The change a worker-stage payload belongs to.
    pub fn change(&self) -> Option<&Change> {
        match self {
            TaskPayload::FindIsolate(p) => Some(&p.input.change),
            TaskPayload::RunTest(p) => Some(&p.input.change),
            TaskPayload::ReadValue(p) => Some(&p.input.change),
            TaskPayload::FindCulprit(_) => None,
        }
    }

    pub fn as_find_isolate(&self) -> Option<&FindIsolatePayload> {
        match self {
            TaskPayload::FindIsolate(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_run_test(&self) -> Option<&RunTestPayload> {
        match self {
            TaskPayload::RunTest(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_read_value(&self) -> Option<&ReadValuePayload> {
        match self {
            TaskPayload::ReadValue(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_find_culprit(&self) -> Option<&FindCulpritPayload> {
        match self {
            TaskPayload::FindCulprit(p) => Some(p),
            _ => None,
        }
    }
}
