// src/store/file.rs

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::errors::{BisectError, Result};
use crate::graph::{Amendment, Dependency, Task, TaskGraph, TaskUpdate, TaskVertex};
use crate::store::{JobId, TaskStore};

/// Directory (under the store root) holding one document per job.
pub const JOBS_DIR: &str = "jobs";

/// Stores each job graph as `<root>/jobs/<job>.json`.
///
/// Read-modify-write cycles are serialized across processes with an
/// exclusive OS lock on `<job>.lock`. The lock file itself is never removed;
/// the lock dies with the process holding it. Documents are replaced by
/// writing a temporary file and renaming it over the old one.
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    root: PathBuf,
}

impl FileTaskStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(JOBS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_path(&self, job: &JobId) -> PathBuf {
        self.root.join(JOBS_DIR).join(format!("{job}.json"))
    }

    fn lock_path(&self, job: &JobId) -> PathBuf {
        self.root.join(JOBS_DIR).join(format!("{job}.lock"))
    }

    /// Run `f` on the stored graph under the job lock and persist the result.
    fn modify<T>(&self, job: &JobId, f: impl FnOnce(&mut TaskGraph) -> Result<T>) -> Result<T> {
        let _lock = JobLock::acquire(self.lock_path(job))?;
        let path = self.job_path(job);
        let mut graph = read_graph(&path)?.ok_or_else(|| BisectError::JobNotFound(job.to_string()))?;
        let out = f(&mut graph)?;
        write_graph(&path, &graph)?;
        Ok(out)
    }
}

impl TaskStore for FileTaskStore {
    fn load(&self, job: &JobId) -> Result<TaskGraph> {
        read_graph(&self.job_path(job))?.ok_or_else(|| BisectError::JobNotFound(job.to_string()))
    }

    fn populate(&self, job: &JobId, graph: TaskGraph) -> Result<()> {
        graph.validate()?;
        let _lock = JobLock::acquire(self.lock_path(job))?;
        let path = self.job_path(job);
        if path.exists() {
            return Err(BisectError::JobAlreadyPopulated(job.to_string()));
        }
        write_graph(&path, &graph)?;
        info!(job = %job, tasks = graph.len(), path = ?path, "populated job (file)");
        Ok(())
    }

    fn update(&self, job: &JobId, update: TaskUpdate) -> Result<Task> {
        let task = self.modify(job, |graph| graph.apply_update(&update))?;
        debug!(job = %job, task = %task.id, state = %task.state, revision = task.revision, "updated task (file)");
        Ok(task)
    }

    fn add_tasks(
        &self,
        job: &JobId,
        vertices: Vec<TaskVertex>,
        edges: Vec<Dependency>,
    ) -> Result<Amendment> {
        self.modify(job, |graph| graph.extend(vertices, edges))
    }

    fn reopen(&self, job: &JobId, task_id: &str) -> Result<Task> {
        let task = self.modify(job, |graph| graph.reopen(task_id))?;
        info!(job = %job, task = %task.id, "reopened task (file)");
        Ok(task)
    }
}

fn read_graph(path: &Path) -> Result<Option<TaskGraph>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let graph: TaskGraph = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(graph))
}

fn write_graph(path: &Path, graph: &TaskGraph) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp)
            .with_context(|| format!("creating temporary job file at {:?}", tmp))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, graph)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("replacing job file at {:?}", path))?;
    Ok(())
}

/// Exclusive advisory lock on a job's lock file, released on drop.
struct JobLock {
    file: File,
    path: PathBuf,
}

impl JobLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("opening job lock {:?}", path))?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                debug!(path = ?path, "job lock busy, waiting");
                file.lock()?;
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        Ok(Self { file, path })
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = ?self.path, error = %e, "failed to release job lock");
        }
    }
}
