// src/engine/evaluator.rs

use std::collections::BTreeMap;

use crate::engine::action::Action;
use crate::engine::event::Event;
use crate::errors::Result;
use crate::graph::{Task, TaskId, TaskView};

/// In-pass context: task id -> view, filled progressively during one
/// `evaluate_graph` call and discarded afterwards.
pub type Context = BTreeMap<TaskId, TaskView>;

/// Computes the next mutation(s) for one task.
///
/// Returning `Err` is reserved for programming errors (malformed graph,
/// impossible payloads); domain failures are expressed as actions that move
/// the task to `failed` with structured errors.
pub trait Evaluator {
    fn evaluate(&self, task: &Task, event: &Event, context: &mut Context) -> Result<Vec<Action>>;
}

impl<F> Evaluator for F
where
    F: Fn(&Task, &Event, &mut Context) -> Result<Vec<Action>>,
{
    fn evaluate(&self, task: &Task, event: &Event, context: &mut Context) -> Result<Vec<Action>> {
        self(task, event, context)
    }
}

/// Pins a closure to the evaluator signature so its reference arguments
/// are inferred as higher-ranked.
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&Task, &Event, &mut Context) -> Result<Vec<Action>>,
{
    f
}

/// Evaluator that never acts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvaluator;

impl Evaluator for NoopEvaluator {
    fn evaluate(&self, _task: &Task, _event: &Event, _context: &mut Context) -> Result<Vec<Action>> {
        Ok(Vec::new())
    }
}
