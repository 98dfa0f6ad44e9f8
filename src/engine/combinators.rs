// src/engine/combinators.rs

//! Composable evaluators.
//!
//! Domain evaluators are assembled from these instead of one large match:
//! a type dispatch at the top, filters on state/event below it, and a
//! payload lifter at the end of a sequence so dependents can read
//! dependency views from the context.

use std::collections::BTreeMap;

use tracing::trace;

use crate::engine::action::Action;
use crate::engine::event::{Event, EventType};
use crate::engine::evaluator::{Context, Evaluator};
use crate::engine::predicates::Predicate;
use crate::errors::Result;
use crate::graph::{Task, TaskType};

/// Tries each evaluator in order and returns the first non-empty action list.
#[derive(Default)]
pub struct SequenceEvaluator {
    evaluators: Vec<Box<dyn Evaluator>>,
}

impl SequenceEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluators.push(Box::new(evaluator));
        self
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl Evaluator for SequenceEvaluator {
    fn evaluate(&self, task: &Task, event: &Event, context: &mut Context) -> Result<Vec<Action>> {
        for evaluator in &self.evaluators {
            let actions = evaluator.evaluate(task, event, context)?;
            if !actions.is_empty() {
                return Ok(actions);
            }
        }
        Ok(Vec::new())
    }
}

/// Delegates only when the predicate holds; otherwise runs the alternative,
/// if any.
pub struct FilteringEvaluator {
    predicate: Predicate,
    delegate: Box<dyn Evaluator>,
    alternative: Option<Box<dyn Evaluator>>,
}

impl FilteringEvaluator {
    pub fn new<P>(predicate: P, delegate: impl Evaluator + 'static) -> Self
    where
        P: Fn(&Task, &Event, &Context) -> bool + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            delegate: Box::new(delegate),
            alternative: None,
        }
    }

    pub fn with_alternative(mut self, alternative: impl Evaluator + 'static) -> Self {
        self.alternative = Some(Box::new(alternative));
        self
    }
}

impl Evaluator for FilteringEvaluator {
    fn evaluate(&self, task: &Task, event: &Event, context: &mut Context) -> Result<Vec<Action>> {
        if (self.predicate)(task, event, context) {
            self.delegate.evaluate(task, event, context)
        } else if let Some(alternative) = &self.alternative {
            alternative.evaluate(task, event, context)
        } else {
            Ok(Vec::new())
        }
    }
}

/// Routes a task to the evaluator registered for its type.
#[derive(Default)]
pub struct DispatchByTaskType {
    table: BTreeMap<TaskType, Box<dyn Evaluator>>,
}

impl DispatchByTaskType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the evaluator for `task_type`.
    pub fn register(mut self, task_type: TaskType, evaluator: impl Evaluator + 'static) -> Self {
        self.table.insert(task_type, Box::new(evaluator));
        self
    }

    pub fn handles(&self, task_type: TaskType) -> bool {
        self.table.contains_key(&task_type)
    }
}

impl Evaluator for DispatchByTaskType {
    fn evaluate(&self, task: &Task, event: &Event, context: &mut Context) -> Result<Vec<Action>> {
        match self.table.get(&task.task_type()) {
            Some(evaluator) => evaluator.evaluate(task, event, context),
            None => {
                trace!(task = %task.id, task_type = %task.task_type(), "no evaluator registered");
                Ok(Vec::new())
            }
        }
    }
}

/// Routes by event type.
#[derive(Default)]
pub struct DispatchByEventType {
    table: BTreeMap<EventType, Box<dyn Evaluator>>,
}

impl DispatchByEventType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, event_type: EventType, evaluator: impl Evaluator + 'static) -> Self {
        self.table.insert(event_type, Box::new(evaluator));
        self
    }
}

impl Evaluator for DispatchByEventType {
    fn evaluate(&self, task: &Task, event: &Event, context: &mut Context) -> Result<Vec<Action>> {
        match self.table.get(&event.event_type) {
            Some(evaluator) => evaluator.evaluate(task, event, context),
            None => Ok(Vec::new()),
        }
    }
}

/// Copies the task's current view into the context so tasks evaluated
/// later in the pass (its dependents) can read it. Never produces actions.
#[derive(Debug, Clone, Default)]
pub struct TaskPayloadLiftingEvaluator {
    exclude_event_types: Vec<EventType>,
}

impl TaskPayloadLiftingEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn excluding_event_types(mut self, event_types: &[EventType]) -> Self {
        self.exclude_event_types.extend_from_slice(event_types);
        self
    }
}

impl Evaluator for TaskPayloadLiftingEvaluator {
    fn evaluate(&self, task: &Task, event: &Event, context: &mut Context) -> Result<Vec<Action>> {
        if !self.exclude_event_types.contains(&event.event_type) {
            context.insert(task.id.clone(), task.view());
        }
        Ok(Vec::new())
    }
}

/// Read-only query: puts every matching task into the context.
///
/// A task matches when any configured matcher (task type, event type,
/// predicate) matches. A selector with no matchers selects nothing.
#[derive(Default)]
pub struct Selector {
    task_type: Option<TaskType>,
    event_type: Option<EventType>,
    predicate: Option<Predicate>,
}

impl Selector {
    pub fn for_task_type(task_type: TaskType) -> Self {
        Self {
            task_type: Some(task_type),
            ..Self::default()
        }
    }

    pub fn for_event_type(event_type: EventType) -> Self {
        Self {
            event_type: Some(event_type),
            ..Self::default()
        }
    }

    pub fn matching<P>(predicate: P) -> Self
    where
        P: Fn(&Task, &Event, &Context) -> bool + 'static,
    {
        Self {
            predicate: Some(Box::new(predicate)),
            ..Self::default()
        }
    }

    fn matches(&self, task: &Task, event: &Event, context: &Context) -> bool {
        self.task_type.is_some_and(|t| t == task.task_type())
            || self.event_type.is_some_and(|e| e == event.event_type)
            || self
                .predicate
                .as_ref()
                .is_some_and(|p| p(task, event, context))
    }
}

impl Evaluator for Selector {
    fn evaluate(&self, task: &Task, event: &Event, context: &mut Context) -> Result<Vec<Action>> {
        if self.matches(task, event, context) {
            context.insert(task.id.clone(), task.view());
        }
        Ok(Vec::new())
    }
}
