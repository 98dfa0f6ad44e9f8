// src/engine/mod.rs

//! Event-driven evaluation engine.
//!
//! Layout:
//! - `event`: the stimulus that triggers an evaluation.
//! - `action`: deferred mutations returned by evaluators.
//! - `evaluator`: the evaluator protocol and the in-pass context.
//! - `predicates` / `combinators`: building blocks for domain evaluators.
//! - `evaluate`: `evaluate_graph`, the fixpoint driver.
//!
//! The engine owns no threads. One call to `evaluate_graph` handles one
//! external stimulus; waiting on remote work is represented by tasks being
//! `ongoing` until a later `update` event arrives.

pub mod action;
pub mod combinators;
pub mod evaluate;
pub mod evaluator;
pub mod event;
pub mod predicates;

pub use action::Action;
pub use combinators::{
    DispatchByEventType, DispatchByTaskType, FilteringEvaluator, Selector, SequenceEvaluator,
    TaskPayloadLiftingEvaluator,
};
pub use evaluate::{
    DEFAULT_MAX_PASSES, TaskGraphLoader, evaluate_graph, evaluate_graph_with_limit,
};
pub use evaluator::{Context, Evaluator, NoopEvaluator, from_fn};
pub use event::{Event, EventPayload, EventType};
pub use predicates::Predicate;
