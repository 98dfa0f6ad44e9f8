// src/store/memory.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::errors::{BisectError, Result};
use crate::graph::{Amendment, Dependency, Task, TaskGraph, TaskUpdate, TaskVertex};
use crate::store::{JobId, TaskStore};

/// Keeps job graphs in memory only (lost on exit).
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    jobs: Mutex<HashMap<JobId, TaskGraph>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> Result<MutexGuard<'_, HashMap<JobId, TaskGraph>>> {
        self.jobs
            .lock()
            .map_err(|_| BisectError::Other(anyhow::anyhow!("memory task store lock poisoned")))
    }
}

impl TaskStore for MemoryTaskStore {
    fn load(&self, job: &JobId) -> Result<TaskGraph> {
        self.jobs()?
            .get(job)
            .cloned()
            .ok_or_else(|| BisectError::JobNotFound(job.to_string()))
    }

    fn populate(&self, job: &JobId, graph: TaskGraph) -> Result<()> {
        graph.validate()?;
        let mut jobs = self.jobs()?;
        if jobs.contains_key(job) {
            return Err(BisectError::JobAlreadyPopulated(job.to_string()));
        }
        info!(job = %job, tasks = graph.len(), "populated job (memory)");
        jobs.insert(job.clone(), graph);
        Ok(())
    }

    fn update(&self, job: &JobId, update: TaskUpdate) -> Result<Task> {
        let mut jobs = self.jobs()?;
        let graph = jobs
            .get_mut(job)
            .ok_or_else(|| BisectError::JobNotFound(job.to_string()))?;
        let task = graph.apply_update(&update)?;
        debug!(job = %job, task = %task.id, state = %task.state, revision = task.revision, "updated task (memory)");
        Ok(task)
    }

    fn add_tasks(
        &self,
        job: &JobId,
        vertices: Vec<TaskVertex>,
        edges: Vec<Dependency>,
    ) -> Result<Amendment> {
        let mut jobs = self.jobs()?;
        let graph = jobs
            .get_mut(job)
            .ok_or_else(|| BisectError::JobNotFound(job.to_string()))?;
        graph.extend(vertices, edges)
    }

    fn reopen(&self, job: &JobId, task_id: &str) -> Result<Task> {
        let mut jobs = self.jobs()?;
        let graph = jobs
            .get_mut(job)
            .ok_or_else(|| BisectError::JobNotFound(job.to_string()))?;
        let task = graph.reopen(task_id)?;
        info!(job = %job, task = %task.id, "reopened task (memory)");
        Ok(task)
    }
}
