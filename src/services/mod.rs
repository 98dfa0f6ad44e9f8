// src/services/mod.rs

//! External collaborators consumed by the worker-stage evaluators.
//!
//! Each is a narrow, synchronous trait so tests can substitute fakes and
//! deployments can wire in real clients. Failures are `ServiceError`s; the
//! evaluators translate them into structured task errors.

pub mod artifacts;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::graph::{ArtifactRef, Change, Dimension};

pub use artifacts::DirectoryArtifactStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

// ---------------------------------------------------------------------------
// Code history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub git_hash: String,
    pub author: Option<String>,
    pub subject: Option<String>,
}

impl CommitInfo {
    pub fn new(git_hash: impl Into<String>) -> Self {
        Self {
            git_hash: git_hash.into(),
            author: None,
            subject: None,
        }
    }
}

pub trait CodeHistory: Send + Sync {
    fn commit_info(&self, repository: &str, git_hash: &str) -> ServiceResult<CommitInfo>;

    /// Commits after `from` up to and including `to`, oldest first.
    fn commit_range(&self, repository: &str, from: &str, to: &str) -> ServiceResult<Vec<CommitInfo>>;
}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub builder: String,
    pub target: String,
    pub bucket: String,
    pub change: Change,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildHandle {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    InProgress,
    /// Finished; `artifact` is `None` when the build did not upload one.
    Succeeded { artifact: Option<ArtifactRef> },
    Failed { message: String },
    Cancelled,
    TimedOut,
}

pub trait BuildBackend: Send + Sync {
    /// An artifact already built for this request, if any.
    fn lookup_artifact(&self, request: &BuildRequest) -> ServiceResult<Option<ArtifactRef>>;

    fn request_build(&self, request: &BuildRequest) -> ServiceResult<BuildHandle>;

    fn poll_build(&self, build_id: &str) -> ServiceResult<BuildStatus>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRequest {
    pub artifact: ArtifactRef,
    pub dimensions: Vec<Dimension>,
    pub extra_args: Vec<String>,
    pub execution_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestHandle {
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestStatus {
    InProgress,
    Succeeded { output: ArtifactRef },
    Failed { diagnostic: String },
    TimedOut,
}

pub trait TestBackend: Send + Sync {
    fn schedule_test(&self, request: &TestRequest) -> ServiceResult<TestHandle>;

    fn poll_test(&self, run_id: &str) -> ServiceResult<TestStatus>;
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

pub trait ArtifactStore: Send + Sync {
    /// Result files of an artifact: relative path -> content.
    fn files(&self, artifact: &ArtifactRef) -> ServiceResult<BTreeMap<String, String>>;
}

/// The full set of collaborators a bisection job needs.
#[derive(Clone)]
pub struct Services {
    pub code_history: Arc<dyn CodeHistory>,
    pub builds: Arc<dyn BuildBackend>,
    pub tests: Arc<dyn TestBackend>,
    pub artifacts: Arc<dyn ArtifactStore>,
}
