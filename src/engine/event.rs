// src/engine/event.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::TaskId;

/// What kind of stimulus triggered an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Seed a freshly populated graph.
    Initiate,
    /// News about one task (usually from a worker callback or a poll).
    Update,
    /// Read-only query; evaluators must not produce actions.
    Select,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Initiate => "initiate",
            EventType::Update => "update",
            EventType::Select => "select",
        };
        f.write_str(s)
    }
}

/// Backend notification carried by an update event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    #[default]
    Empty,
    BuildUpdate {
        build_id: String,
    },
    TestUpdate {
        run_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    #[serde(default)]
    pub target_task: Option<TaskId>,
    #[serde(default)]
    pub payload: EventPayload,
}

impl Event {
    pub fn initiate() -> Self {
        Self {
            event_type: EventType::Initiate,
            target_task: None,
            payload: EventPayload::Empty,
        }
    }

    pub fn update(target_task: impl Into<TaskId>) -> Self {
        Self {
            event_type: EventType::Update,
            target_task: Some(target_task.into()),
            payload: EventPayload::Empty,
        }
    }

    pub fn select() -> Self {
        Self {
            event_type: EventType::Select,
            target_task: None,
            payload: EventPayload::Empty,
        }
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_select(&self) -> bool {
        self.event_type == EventType::Select
    }

    /// Whether this event is addressed to `task_id`.
    pub fn targets(&self, task_id: &str) -> bool {
        self.target_task.as_deref() == Some(task_id)
    }
}
