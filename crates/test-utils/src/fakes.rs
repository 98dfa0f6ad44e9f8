#![allow(dead_code)]

//! In-process fakes for the external collaborators, plus fake stage
//! evaluators that let the culprit finder run without any backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use perfbisect::bisect::culprit_finder;
use perfbisect::engine::{
    Action, Context, DispatchByTaskType, Evaluator, Event, SequenceEvaluator,
    TaskPayloadLiftingEvaluator,
};
use perfbisect::errors::Result;
use perfbisect::graph::{ArtifactRef, Change, ErrorMessage, Task, TaskPayload, TaskState, TaskType};
use perfbisect::services::{
    ArtifactStore, BuildBackend, BuildHandle, BuildRequest, BuildStatus, CodeHistory, CommitInfo,
    ServiceError, ServiceResult, Services, TestBackend, TestHandle, TestRequest, TestStatus,
};

use crate::builders::{commit_hash, histogram_results};

// ---------------------------------------------------------------------------
// Code history
// ---------------------------------------------------------------------------

/// Linear history `commit_0 .. commit_<n-1>` in one repository.
#[derive(Debug, Clone)]
pub struct FakeCodeHistory {
    commits: Vec<String>,
    fail_with: Option<ServiceError>,
}

impl FakeCodeHistory {
    pub fn new(len: usize) -> Self {
        Self {
            commits: (0..len).map(commit_hash).collect(),
            fail_with: None,
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            commits: Vec::new(),
            fail_with: Some(error),
        }
    }

    fn position(&self, hash: &str) -> ServiceResult<usize> {
        self.commits
            .iter()
            .position(|c| c == hash)
            .ok_or_else(|| ServiceError::NotFound(format!("commit {hash}")))
    }
}

impl CodeHistory for FakeCodeHistory {
    fn commit_info(&self, _repository: &str, git_hash: &str) -> ServiceResult<CommitInfo> {
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }
        self.position(git_hash).map(|_| CommitInfo::new(git_hash))
    }

    fn commit_range(&self, _repository: &str, from: &str, to: &str) -> ServiceResult<Vec<CommitInfo>> {
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }
        let (lo, hi) = (self.position(from)?, self.position(to)?);
        if hi < lo {
            return Err(ServiceError::InvalidResponse(format!("{to} precedes {from}")));
        }
        Ok(self.commits[lo + 1..=hi].iter().map(CommitInfo::new).collect())
    }
}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

/// Build backend that never has cached artifacts and answers every poll
/// with the configured status (success by default).
#[derive(Debug, Default)]
pub struct FakeBuildBackend {
    status: Mutex<Option<BuildStatus>>,
    existing: bool,
    requests: Mutex<Vec<BuildRequest>>,
    polls: Mutex<Vec<String>>,
}

impl FakeBuildBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lookup finds an artifact, so no build is ever requested.
    pub fn with_existing_artifacts() -> Self {
        Self {
            existing: true,
            ..Self::default()
        }
    }

    pub fn set_status(&self, status: BuildStatus) {
        *self.status.lock().expect("lock") = Some(status);
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().expect("lock").clone()
    }

    pub fn polls(&self) -> Vec<String> {
        self.polls.lock().expect("lock").clone()
    }

    fn artifact_for(change: &Change) -> ArtifactRef {
        ArtifactRef::new("fake-cas", format!("isolate-{}", change.id_string()))
    }
}

impl BuildBackend for FakeBuildBackend {
    fn lookup_artifact(&self, request: &BuildRequest) -> ServiceResult<Option<ArtifactRef>> {
        Ok(self.existing.then(|| Self::artifact_for(&request.change)))
    }

    fn request_build(&self, request: &BuildRequest) -> ServiceResult<BuildHandle> {
        self.requests.lock().expect("lock").push(request.clone());
        Ok(BuildHandle {
            id: format!("build-{}", request.change.id_string()),
            url: None,
        })
    }

    fn poll_build(&self, build_id: &str) -> ServiceResult<BuildStatus> {
        self.polls.lock().expect("lock").push(build_id.to_string());
        if let Some(status) = self.status.lock().expect("lock").clone() {
            return Ok(status);
        }
        let change = build_id.trim_start_matches("build-");
        Ok(BuildStatus::Succeeded {
            artifact: Some(ArtifactRef::new("fake-cas", format!("isolate-{change}"))),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Test backend whose runs produce an output artifact named after the
/// input artifact, `<isolate digest>-run<n>`.
#[derive(Debug, Default)]
pub struct FakeTestBackend {
    status: Mutex<Option<TestStatus>>,
    runs: Mutex<BTreeMap<String, TestRequest>>,
}

impl FakeTestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: TestStatus) {
        *self.status.lock().expect("lock") = Some(status);
    }

    pub fn scheduled(&self) -> Vec<TestRequest> {
        self.runs.lock().expect("lock").values().cloned().collect()
    }
}

impl TestBackend for FakeTestBackend {
    fn schedule_test(&self, request: &TestRequest) -> ServiceResult<TestHandle> {
        let mut runs = self.runs.lock().expect("lock");
        let run_id = format!("{}-run{}", request.artifact.digest, runs.len());
        runs.insert(run_id.clone(), request.clone());
        Ok(TestHandle { run_id })
    }

    fn poll_test(&self, run_id: &str) -> ServiceResult<TestStatus> {
        if let Some(status) = self.status.lock().expect("lock").clone() {
            return Ok(status);
        }
        if !self.runs.lock().expect("lock").contains_key(run_id) {
            return Err(ServiceError::NotFound(format!("run {run_id}")));
        }
        Ok(TestStatus::Succeeded {
            output: ArtifactRef::new("fake-cas", run_id),
        })
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Serves one histogram-set results file per test output. The value is
/// looked up by the commit hash embedded in the output digest.
#[derive(Debug, Clone)]
pub struct FakeArtifactStore {
    results_path: String,
    histogram: String,
    values: HashMap<String, f64>,
    files: HashMap<String, BTreeMap<String, String>>,
}

impl FakeArtifactStore {
    pub fn new(results_path: &str, histogram: &str) -> Self {
        Self {
            results_path: results_path.to_string(),
            histogram: histogram.to_string(),
            values: HashMap::new(),
            files: HashMap::new(),
        }
    }

    /// `values[i]` is the measurement of `commit_i`.
    pub fn with_values(mut self, values: &[f64]) -> Self {
        self.values = values
            .iter()
            .enumerate()
            .map(|(i, v)| (commit_hash(i), *v))
            .collect();
        self
    }

    /// Serve exactly these files for `digest`.
    pub fn with_files(mut self, digest: &str, files: BTreeMap<String, String>) -> Self {
        self.files.insert(digest.to_string(), files);
        self
    }

    fn value_for(&self, digest: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(hash, _)| digest.contains(&format!("@{hash}-")))
            .map(|(_, v)| *v)
    }
}

impl ArtifactStore for FakeArtifactStore {
    fn files(&self, artifact: &ArtifactRef) -> ServiceResult<BTreeMap<String, String>> {
        if let Some(files) = self.files.get(&artifact.digest) {
            return Ok(files.clone());
        }
        let value = self
            .value_for(&artifact.digest)
            .ok_or_else(|| ServiceError::NotFound(format!("artifact {}", artifact.digest)))?;
        let mut files = BTreeMap::new();
        files.insert(self.results_path.clone(), histogram_results(&self.histogram, &[value]));
        Ok(files)
    }
}

/// Services wired to fakes over `commit_0 .. commit_<values.len()-1>`.
pub fn fake_services(values: &[f64]) -> (Services, Arc<FakeBuildBackend>, Arc<FakeTestBackend>) {
    let builds = Arc::new(FakeBuildBackend::new());
    let tests = Arc::new(FakeTestBackend::new());
    let services = Services {
        code_history: Arc::new(FakeCodeHistory::new(values.len())),
        builds: builds.clone(),
        tests: tests.clone(),
        artifacts: Arc::new(
            FakeArtifactStore::new("speedometer2/perf_results.json", "RunsPerMinute").with_values(values),
        ),
    };
    (services, builds, tests)
}

// ---------------------------------------------------------------------------
// Fake stage evaluators
// ---------------------------------------------------------------------------

/// Completes every pending task it sees, without touching the payload.
pub fn complete_pending() -> impl Evaluator {
    |task: &Task, _event: &Event, _context: &mut Context| -> Result<Vec<Action>> {
        if task.state == TaskState::Pending {
            Ok(vec![Action::update_state(&task.id, TaskState::Completed)])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Finishes pending `read_value` tasks with whatever `read` returns for the
/// task's change and attempt.
pub fn fake_read_value<F>(read: F) -> impl Evaluator
where
    F: Fn(&Change, u32) -> std::result::Result<Vec<f64>, ErrorMessage> + 'static,
{
    move |task: &Task, _event: &Event, _context: &mut Context| -> Result<Vec<Action>> {
        if task.state != TaskState::Pending {
            return Ok(Vec::new());
        }
        let Some(payload) = task.payload.as_read_value() else {
            return Ok(Vec::new());
        };
        let mut next = payload.clone();
        match read(&payload.input.change, payload.input.attempt) {
            Ok(values) => {
                next.output.result_values = values;
                Ok(vec![Action::update(&task.id, TaskState::Completed, TaskPayload::ReadValue(next))])
            }
            Err(error) => Ok(vec![Action::fail(&task.id, TaskPayload::ReadValue(next), error)]),
        }
    }
}

/// Constant per-commit values: `commit_i` always measures `values[i]`.
pub fn value_by_commit(
    values: Vec<f64>,
) -> impl Fn(&Change, u32) -> std::result::Result<Vec<f64>, ErrorMessage> + 'static {
    move |change: &Change, _attempt: u32| {
        let hash = change
            .base_commit()
            .map(|c| c.git_hash.clone())
            .unwrap_or_default();
        let index = hash
            .trim_start_matches("commit_")
            .parse::<usize>()
            .map_err(|_| ErrorMessage::new("ReadValueNotFound", format!("unknown change {change}")))?;
        values
            .get(index)
            .map(|v| vec![*v])
            .ok_or_else(|| ErrorMessage::new("ReadValueNotFound", format!("no value for {change}")))
    }
}

/// The real culprit finder over fake worker stages: builds and tests
/// complete immediately and reads come from `read`.
pub fn fake_bisection_evaluator<F>(history: Arc<dyn CodeHistory>, read: F) -> SequenceEvaluator
where
    F: Fn(&Change, u32) -> std::result::Result<Vec<f64>, ErrorMessage> + 'static,
{
    SequenceEvaluator::new()
        .then(
            DispatchByTaskType::new()
                .register(TaskType::FindIsolate, complete_pending())
                .register(TaskType::RunTest, complete_pending())
                .register(TaskType::ReadValue, fake_read_value(read))
                .register(TaskType::FindCulprit, culprit_finder::evaluator(history)),
        )
        .then(TaskPayloadLiftingEvaluator::new())
}
