// src/bisect/mod.rs

//! Performance bisection on top of the evaluation engine.
//!
//! - `plan`: initial graph and per-change subgraphs.
//! - `compare`: statistical comparison of two samples.
//! - `exploration`: midpoint selection and speculation.
//! - `culprit_finder`: the aggregator evaluator driving the search.

pub mod compare;
pub mod culprit_finder;
pub mod exploration;
pub mod plan;

use crate::engine::{DispatchByTaskType, SequenceEvaluator, TaskPayloadLiftingEvaluator};
use crate::graph::TaskType;
use crate::services::Services;
use crate::stages::{find_isolate, read_value, run_test};

pub use compare::{Comparison, compare};
pub use culprit_finder::FindCulpritEvaluator;
pub use plan::{BisectionOptions, FIND_CULPRIT_TASK_ID, change_subgraph, create_graph};

/// The full evaluator for bisection jobs.
///
/// Every task is routed to its stage; when the stage does nothing, the task's
/// view is lifted into the context for its dependents.
pub fn bisection_evaluator(services: &Services) -> SequenceEvaluator {
    SequenceEvaluator::new()
        .then(
            DispatchByTaskType::new()
                .register(TaskType::FindIsolate, find_isolate::evaluator(services.builds.clone()))
                .register(TaskType::RunTest, run_test::evaluator(services.tests.clone()))
                .register(TaskType::ReadValue, read_value::evaluator(services.artifacts.clone()))
                .register(
                    TaskType::FindCulprit,
                    culprit_finder::evaluator(services.code_history.clone()),
                ),
        )
        .then(TaskPayloadLiftingEvaluator::new())
}
