// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::graph::TaskState;

#[derive(Error, Debug)]
pub enum BisectError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job already populated: {0}")]
    JobAlreadyPopulated(String),

    #[error("Malformed task graph: {0}")]
    MalformedGraph(String),

    #[error("Invalid transition for task '{task}': {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("Lost update on task '{task}': expected revision {expected}, found {found}")]
    Conflict {
        task: String,
        expected: u64,
        found: u64,
    },

    #[error("Invalid graph amendment: {0}")]
    InvalidAmendment(String),

    #[error("Evaluator failed on task '{task}': {message}")]
    Evaluator { task: String, message: String },

    #[error("Evaluator produced actions for task '{0}' during a select event")]
    SelectMutation(String),

    #[error("Evaluation did not reach a fixpoint within {0} passes")]
    IterationLimit(usize),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BisectError {
    /// Shorthand for a fatal evaluator error on `task`.
    pub fn evaluator(task: impl Into<String>, message: impl Into<String>) -> Self {
        BisectError::Evaluator {
            task: task.into(),
            message: message.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BisectError>;
