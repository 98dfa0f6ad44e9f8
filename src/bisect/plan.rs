// src/bisect/plan.rs

//! Graph construction for bisection jobs.

use std::ops::Range;

use crate::errors::Result;
use crate::graph::{
    Change, Dependency, FindCulpritInput, FindCulpritPayload, FindIsolateInput,
    FindIsolateOutput, FindIsolatePayload, FindCulpritOutput, ReadValueInput, ReadValueOutput,
    ReadValuePayload, RunTestInput, RunTestOutput, RunTestPayload, TaskGraph, TaskId, TaskPayload,
    TaskVertex,
};
use crate::stages::{find_isolate, read_value, run_test};

/// Id of the aggregator task of every bisection job.
pub const FIND_CULPRIT_TASK_ID: &str = "performance_bisection";

/// Everything a bisection job is created from.
pub type BisectionOptions = FindCulpritInput;

/// Initial job graph: the aggregator plus `min_attempts` attempts for each
/// endpoint of the range.
pub fn create_graph(options: &BisectionOptions) -> Result<TaskGraph> {
    let attempts = 0..options.analysis.normalized().min_attempts;

    let mut vertices = vec![TaskVertex::new(
        FIND_CULPRIT_TASK_ID,
        TaskPayload::FindCulprit(FindCulpritPayload {
            input: options.clone(),
            output: FindCulpritOutput::default(),
            errors: Vec::new(),
        }),
    )];
    let mut edges = Vec::new();

    for change in [&options.start_change, &options.end_change] {
        let (v, e) = change_subgraph(FIND_CULPRIT_TASK_ID, options, change, attempts.clone());
        vertices.extend(v);
        edges.extend(e);
    }

    TaskGraph::from_parts(vertices, edges)
}

/// Vertices and edges exploring `change` with the given attempt indices:
///
/// - one `find_isolate` task per change
/// - one `run_test` and one `read_value` task per attempt
/// - the aggregator depends on every `read_value`
///
/// The `find_isolate` vertex is always included so a subgraph can be added
/// to a graph that already explores the change.
pub fn change_subgraph(
    aggregator_id: &str,
    options: &BisectionOptions,
    change: &Change,
    attempts: Range<u32>,
) -> (Vec<TaskVertex>, Vec<Dependency>) {
    let isolate_id = find_isolate::task_id(change);
    let mut vertices = vec![TaskVertex::new(
        isolate_id.clone(),
        TaskPayload::FindIsolate(FindIsolatePayload {
            input: FindIsolateInput {
                change: change.clone(),
                build: options.build.clone(),
            },
            output: FindIsolateOutput::default(),
            errors: Vec::new(),
        }),
    )];
    let mut edges = Vec::new();
    let results_path = read_value::results_path(&options.read, &options.test.dimensions);

    for attempt in attempts {
        let test_id: TaskId = run_test::task_id(change, attempt);
        let read_id: TaskId = read_value::task_id(change, attempt);

        vertices.push(TaskVertex::new(
            test_id.clone(),
            TaskPayload::RunTest(RunTestPayload {
                input: RunTestInput {
                    change: change.clone(),
                    attempt,
                    test: options.test.clone(),
                },
                output: RunTestOutput::default(),
                errors: Vec::new(),
            }),
        ));
        vertices.push(TaskVertex::new(
            read_id.clone(),
            TaskPayload::ReadValue(ReadValuePayload {
                input: ReadValueInput {
                    change: change.clone(),
                    attempt,
                    read: options.read.clone(),
                    results_path: results_path.clone(),
                },
                output: ReadValueOutput::default(),
                errors: Vec::new(),
            }),
        ));

        edges.push(Dependency::new(test_id.clone(), isolate_id.clone()));
        edges.push(Dependency::new(read_id.clone(), test_id));
        edges.push(Dependency::new(aggregator_id, read_id));
    }

    (vertices, edges)
}
