// src/graph/mod.rs

//! Task & graph model.
//!
//! - `change`: points in history a task is about.
//! - `payload`: typed per-task inputs/outputs/errors.
//! - `task`: task vertices, states and the view handed to evaluators.
//! - `graph`: the per-job DAG arena, ordering and mutation rules.

pub mod change;
pub mod graph;
pub mod payload;
pub mod task;

pub use change::{Change, Commit};
pub use graph::{Amendment, TaskGraph, TaskUpdate};
pub use payload::*;
pub use task::{Dependency, Task, TaskId, TaskState, TaskType, TaskVertex, TaskView};
