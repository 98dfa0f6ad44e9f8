// src/store/mod.rs

//! Task Store: persistence of job graphs.
//!
//! All operations are scoped to one job. Updates are compare-and-set on the
//! task revision so concurrent evaluations of the same job cannot silently
//! overwrite each other.

pub mod file;
pub mod memory;

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{BisectError, Result};
use crate::graph::{Amendment, Dependency, Task, TaskGraph, TaskUpdate, TaskVertex};
use crate::types::StoreMode;

pub use file::FileTaskStore;
pub use memory::MemoryTaskStore;

static JOB_ID_RE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$"));

/// Opaque handle namespacing all tasks of one bisection run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Accepts ids safe to use as file names.
    pub fn parse(raw: &str) -> Result<Self> {
        let re = JOB_ID_RE
            .as_ref()
            .map_err(|e| BisectError::Other(anyhow::anyhow!("job id pattern: {e}")))?;
        if re.is_match(raw) {
            Ok(JobId(raw.to_string()))
        } else {
            Err(BisectError::ConfigError(format!(
                "invalid job id '{raw}' (letters, digits, '.', '_' and '-' only)"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage contract for job graphs.
pub trait TaskStore: Send + Sync {
    /// Load the whole graph of a job.
    fn load(&self, job: &JobId) -> Result<TaskGraph>;

    /// First write of a job's graph. Fails if the job already exists.
    fn populate(&self, job: &JobId, graph: TaskGraph) -> Result<()>;

    /// Atomic conditional update of one task.
    fn update(&self, job: &JobId, update: TaskUpdate) -> Result<Task>;

    /// Append vertices and edges to an existing job.
    fn add_tasks(
        &self,
        job: &JobId,
        vertices: Vec<TaskVertex>,
        edges: Vec<Dependency>,
    ) -> Result<Amendment>;

    /// Force a task back to pending, even from a terminal state.
    fn reopen(&self, job: &JobId, task_id: &str) -> Result<Task>;
}

/// Open the store selected by `mode`. `dir` is only used by the file store.
pub fn open(mode: StoreMode, dir: &Path) -> Result<Box<dyn TaskStore>> {
    match mode {
        StoreMode::File => Ok(Box::new(FileTaskStore::open(dir)?)),
        StoreMode::Memory => Ok(Box::new(MemoryTaskStore::new())),
    }
}
