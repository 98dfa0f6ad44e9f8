// src/engine/action.rs

use crate::graph::{Dependency, ErrorMessage, TaskId, TaskPayload, TaskState, TaskVertex};

/// Deferred mutation requested by an evaluator.
///
/// Actions are plain data; the engine applies them through the Task Store
/// right after the evaluator call that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Change the state and/or payload of one task.
    UpdateTask {
        task_id: TaskId,
        new_state: Option<TaskState>,
        payload: Option<TaskPayload>,
    },
    /// Append vertices and edges to the job graph.
    ExtendGraph {
        vertices: Vec<TaskVertex>,
        edges: Vec<Dependency>,
    },
}

impl Action {
    pub fn update_state(task_id: impl Into<TaskId>, state: TaskState) -> Self {
        Action::UpdateTask {
            task_id: task_id.into(),
            new_state: Some(state),
            payload: None,
        }
    }

    pub fn update_payload(task_id: impl Into<TaskId>, payload: TaskPayload) -> Self {
        Action::UpdateTask {
            task_id: task_id.into(),
            new_state: None,
            payload: Some(payload),
        }
    }

    pub fn update(task_id: impl Into<TaskId>, state: TaskState, payload: TaskPayload) -> Self {
        Action::UpdateTask {
            task_id: task_id.into(),
            new_state: Some(state),
            payload: Some(payload),
        }
    }

    /// Fail a task, appending `error` to its payload.
    pub fn fail(task_id: impl Into<TaskId>, mut payload: TaskPayload, error: ErrorMessage) -> Self {
        payload.push_error(error);
        Action::update(task_id, TaskState::Failed, payload)
    }

    pub fn extend_graph(vertices: Vec<TaskVertex>, edges: Vec<Dependency>) -> Self {
        Action::ExtendGraph { vertices, edges }
    }
}
