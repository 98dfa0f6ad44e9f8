// src/graph/graph.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

use crate::errors::{BisectError, Result};
use crate::graph::payload::TaskPayload;
use crate::graph::task::{Dependency, Task, TaskId, TaskState, TaskType, TaskVertex};

/// The task DAG of one job.
///
/// Stored as an arena keyed by task id; each task carries its own dependency
/// list, which is the only adjacency information persisted. Dependents are
/// derived on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskId, Task>,
}

/// Conditional update of one stored task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    /// Revision the caller last observed; the update fails if it moved on.
    pub expected_revision: u64,
    pub new_state: Option<TaskState>,
    pub payload: Option<TaskPayload>,
}

/// What an amendment actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Amendment {
    pub vertices_added: usize,
    pub edges_added: usize,
}

impl Amendment {
    pub fn is_empty(&self) -> bool {
        self.vertices_added == 0 && self.edges_added == 0
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from fresh vertices and edges, rejecting duplicates,
    /// dangling edges and cycles.
    pub fn from_parts(vertices: Vec<TaskVertex>, edges: Vec<Dependency>) -> Result<Self> {
        let mut graph = TaskGraph::new();
        for vertex in vertices {
            if graph.tasks.contains_key(&vertex.id) {
                return Err(BisectError::MalformedGraph(format!(
                    "duplicate task id '{}'",
                    vertex.id
                )));
            }
            graph.tasks.insert(vertex.id.clone(), vertex.into_task());
        }
        for edge in edges {
            graph
                .insert_edge(&edge)
                .map_err(BisectError::MalformedGraph)?;
        }
        graph.validate()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn tasks_of_type(&self, task_type: TaskType) -> impl Iterator<Item = &Task> {
        self.tasks
            .values()
            .filter(move |t| t.task_type() == task_type)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Direct dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.tasks
            .get(id)
            .map(|t| t.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Direct dependents of a task (tasks that list it as a dependency).
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.tasks
            .values()
            .filter(|t| t.dependencies.iter().any(|d| d == id))
            .map(|t| t.id.as_str())
            .collect()
    }

    /// All edges, in a stable order.
    pub fn edges(&self) -> Vec<Dependency> {
        self.tasks
            .values()
            .flat_map(|t| {
                t.dependencies
                    .iter()
                    .map(move |d| Dependency::new(t.id.clone(), d.clone()))
            })
            .collect()
    }

    pub fn into_tasks(self) -> BTreeMap<TaskId, Task> {
        self.tasks
    }

    /// Task ids ordered so every dependency precedes its dependents.
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        // Edge direction: dependency -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for id in self.tasks.keys() {
            graph.add_node(id.as_str());
        }

        for task in self.tasks.values() {
            for dep in &task.dependencies {
                graph.add_edge(dep.as_str(), task.id.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(BisectError::MalformedGraph(format!(
                "cycle detected in task graph involving task '{}'",
                cycle.node_id()
            ))),
        }
    }

    /// Check that every edge points at a known task and the graph is acyclic.
    pub fn validate(&self) -> Result<()> {
        for task in self.tasks.values() {
            for dep in &task.dependencies {
                if !self.tasks.contains_key(dep) {
                    return Err(BisectError::MalformedGraph(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.id, dep
                    )));
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Apply a compare-and-set update and return the stored task.
    pub fn apply_update(&mut self, update: &TaskUpdate) -> Result<Task> {
        let task = self
            .tasks
            .get_mut(&update.task_id)
            .ok_or_else(|| BisectError::TaskNotFound(update.task_id.clone()))?;

        if task.revision != update.expected_revision {
            return Err(BisectError::Conflict {
                task: task.id.clone(),
                expected: update.expected_revision,
                found: task.revision,
            });
        }

        let next_state = update.new_state.unwrap_or(task.state);
        if !task.state.can_transition_to(next_state) {
            return Err(BisectError::InvalidTransition {
                task: task.id.clone(),
                from: task.state,
                to: next_state,
            });
        }

        if let Some(payload) = &update.payload {
            if payload.task_type() != task.task_type() {
                return Err(BisectError::InvalidAmendment(format!(
                    "payload of type {} cannot replace {} payload of task '{}'",
                    payload.task_type(),
                    task.task_type(),
                    task.id
                )));
            }
            task.payload = payload.clone();
        }
        task.state = next_state;
        task.revision += 1;
        Ok(task.clone())
    }

    /// Append vertices and edges.
    ///
    /// Re-adding an existing vertex of the same type, or an existing edge,
    /// is a no-op. The amendment is all-or-nothing.
    pub fn extend(&mut self, vertices: Vec<TaskVertex>, edges: Vec<Dependency>) -> Result<Amendment> {
        let mut next = self.clone();
        let mut amendment = Amendment::default();

        for vertex in vertices {
            match next.tasks.get(&vertex.id) {
                Some(existing) if existing.task_type() == vertex.task_type() => {}
                Some(existing) => {
                    return Err(BisectError::InvalidAmendment(format!(
                        "task '{}' already exists with type {} (new vertex has type {})",
                        vertex.id,
                        existing.task_type(),
                        vertex.task_type()
                    )));
                }
                None => {
                    next.tasks.insert(vertex.id.clone(), vertex.into_task());
                    amendment.vertices_added += 1;
                }
            }
        }

        for edge in edges {
            if next.dependencies_of(&edge.from).contains(&edge.to) {
                continue;
            }
            next.insert_edge(&edge)
                .map_err(BisectError::InvalidAmendment)?;
            amendment.edges_added += 1;
        }

        next.topological_order()
            .map_err(|e| BisectError::InvalidAmendment(e.to_string()))?;

        *self = next;
        Ok(amendment)
    }

    /// Force a task back to pending. Recorded errors are dropped; inputs
    /// and outputs are kept.
    pub fn reopen(&mut self, id: &str) -> Result<Task> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| BisectError::TaskNotFound(id.to_string()))?;
        task.state = TaskState::Pending;
        task.payload.clear_errors();
        task.revision += 1;
        Ok(task.clone())
    }

    fn insert_edge(&mut self, edge: &Dependency) -> std::result::Result<(), String> {
        if !self.tasks.contains_key(&edge.to) {
            return Err(format!(
                "edge {} -> {} points at unknown task '{}'",
                edge.from, edge.to, edge.to
            ));
        }
        let from = self
            .tasks
            .get_mut(&edge.from)
            .ok_or_else(|| format!("edge {} -> {} starts at unknown task", edge.from, edge.to))?;
        if !from.dependencies.contains(&edge.to) {
            from.dependencies.push(edge.to.clone());
        }
        Ok(())
    }
}
