// src/graph/task.rs

//! Task vertices, their lifecycle, and the read-only view handed to evaluators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::graph::payload::TaskPayload;

/// Stable, deterministic task identifier (unique within one job).
pub type TaskId = String;

/// Closed set of task kinds a job graph can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    FindIsolate,
    RunTest,
    ReadValue,
    FindCulprit,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::FindIsolate => "find_isolate",
            TaskType::RunTest => "run_test",
            TaskType::ReadValue => "read_value",
            TaskType::FindCulprit => "find_culprit",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "find_isolate" => Ok(TaskType::FindIsolate),
            "run_test" => Ok(TaskType::RunTest),
            "read_value" => Ok(TaskType::ReadValue),
            "find_culprit" => Ok(TaskType::FindCulprit),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Lifecycle state of a task.
///
/// `Pending -> Ongoing -> {Completed | Failed}`; a pending task may also
/// finish directly. Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Ongoing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Whether a stored task in `self` may be moved to `next`.
    ///
    /// Staying in the same state is always allowed (payload-only update),
    /// except that terminal payloads are frozen too.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Pending, _) => true,
            (Ongoing, Ongoing | Completed | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Ongoing => "ongoing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A stored task vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    pub payload: TaskPayload,
    /// Ids of the tasks this one depends on.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Bumped on every stored update; the compare-and-set token.
    #[serde(default)]
    pub revision: u64,
}

impl Task {
    pub fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            state: self.state,
            payload: self.payload.clone(),
        }
    }
}

/// A vertex about to be added to a graph. New vertices always start pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskVertex {
    pub id: TaskId,
    pub payload: TaskPayload,
}

impl TaskVertex {
    pub fn new(id: impl Into<TaskId>, payload: TaskPayload) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }

    pub fn into_task(self) -> Task {
        Task {
            id: self.id,
            state: TaskState::Pending,
            payload: self.payload,
            dependencies: Vec::new(),
            revision: 0,
        }
    }
}

/// Edge `from -> to`: `from` depends on `to`, so `to` is evaluated first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    pub from: TaskId,
    pub to: TaskId,
}

impl Dependency {
    pub fn new(from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// What evaluators and callers see of a task during one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub state: TaskState,
    pub payload: TaskPayload,
}

impl TaskView {
    pub fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        task.view()
    }
}
