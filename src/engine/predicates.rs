// src/engine/predicates.rs

//! Small predicate helpers for `FilteringEvaluator` and `Selector`.

use crate::engine::event::Event;
use crate::engine::evaluator::Context;
use crate::graph::{Task, TaskState, TaskType};

pub type Predicate = Box<dyn Fn(&Task, &Event, &Context) -> bool>;

pub fn task_type_is(task_type: TaskType) -> impl Fn(&Task, &Event, &Context) -> bool {
    move |task, _, _| task.task_type() == task_type
}

pub fn task_state_in<const N: usize>(
    states: [TaskState; N],
) -> impl Fn(&Task, &Event, &Context) -> bool {
    move |task, _, _| states.contains(&task.state)
}

/// True when the event is addressed to the task being evaluated.
pub fn is_target() -> impl Fn(&Task, &Event, &Context) -> bool {
    |task, event, _| event.targets(&task.id)
}

pub fn not<P>(predicate: P) -> impl Fn(&Task, &Event, &Context) -> bool
where
    P: Fn(&Task, &Event, &Context) -> bool,
{
    move |task, event, context| !predicate(task, event, context)
}

pub fn all(predicates: Vec<Predicate>) -> impl Fn(&Task, &Event, &Context) -> bool {
    move |task, event, context| predicates.iter().all(|p| p(task, event, context))
}
