// tests/bisection_pipeline.rs

use std::error::Error;

use perfbisect::bisect::{FIND_CULPRIT_TASK_ID, bisection_evaluator, create_graph};
use perfbisect::engine::{Event, Selector, SequenceEvaluator, TaskGraphLoader, evaluate_graph};
use perfbisect::graph::{TaskGraph, TaskState, TaskType};
use perfbisect::services::BuildStatus;
use perfbisect::store::{JobId, MemoryTaskStore, TaskStore};
use perfbisect_test_utils::builders::{BisectionOptionsBuilder, change, populated_store};
use perfbisect_test_utils::fakes::fake_services;
use perfbisect_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const MAX_ROUNDS: usize = 50;

/// Initiate the job, then keep answering every ongoing build and test with
/// an update event until the aggregator finishes.
fn drive(store: &MemoryTaskStore, job: &JobId, evaluator: &SequenceEvaluator) -> Result<TaskGraph, Box<dyn Error>> {
    let loader = TaskGraphLoader::new(store, job.clone());
    evaluate_graph(&Event::initiate(), evaluator, &loader)?;

    for _ in 0..MAX_ROUNDS {
        let graph = store.load(job)?;
        if graph
            .task(FIND_CULPRIT_TASK_ID)
            .is_some_and(|t| t.state.is_terminal())
        {
            return Ok(graph);
        }

        let ongoing: Vec<String> = graph
            .tasks()
            .filter(|t| t.state == TaskState::Ongoing)
            .filter(|t| matches!(t.task_type(), TaskType::FindIsolate | TaskType::RunTest))
            .map(|t| t.id.clone())
            .collect();
        if ongoing.is_empty() {
            return Err("bisection stalled without outstanding work".into());
        }
        for id in ongoing {
            evaluate_graph(&Event::update(id), evaluator, &loader)?;
        }
    }
    Err("bisection did not finish".into())
}

#[test]
fn end_to_end_bisection_finds_the_regressing_commit() -> TestResult {
    init_tracing();
    let (services, builds, tests) = fake_services(&[0.0, 0.0, 10.0, 10.0, 10.0, 10.0]);
    let evaluator = bisection_evaluator(&services);
    let (store, job) = populated_store(create_graph(&BisectionOptionsBuilder::new(0, 5).build())?);

    let graph = drive(&store, &job, &evaluator)?;
    let finder = graph.task(FIND_CULPRIT_TASK_ID).expect("aggregator");
    assert_eq!(finder.state, TaskState::Completed);

    let payload = finder.payload.as_find_culprit().expect("find_culprit payload");
    let culprits: Vec<_> = payload
        .output
        .culprits
        .iter()
        .map(|c| (c.from.clone(), c.to.clone()))
        .collect();
    assert_eq!(culprits, vec![(change(1), change(2))]);

    // One build per explored change and min_attempts test runs each.
    assert_eq!(builds.requests().len(), 6);
    assert_eq!(tests.scheduled().len(), 60);
    assert!(
        graph
            .tasks()
            .filter(|t| t.task_type() != TaskType::FindCulprit)
            .all(|t| t.state == TaskState::Completed)
    );
    Ok(())
}

#[test]
fn failing_builds_fail_the_bisection() -> TestResult {
    init_tracing();
    let (services, builds, _tests) = fake_services(&[1.0; 6]);
    builds.set_status(BuildStatus::Failed {
        message: "toolchain missing".to_string(),
    });
    let evaluator = bisection_evaluator(&services);
    let (store, job) = populated_store(create_graph(&BisectionOptionsBuilder::new(0, 5).build())?);

    let graph = drive(&store, &job, &evaluator)?;
    let finder = graph.task(FIND_CULPRIT_TASK_ID).expect("aggregator");
    assert_eq!(finder.state, TaskState::Failed);
    let reasons: Vec<&str> = finder
        .payload
        .errors()
        .iter()
        .map(|e| e.reason.as_str())
        .collect();
    assert_eq!(reasons.last(), Some(&"BisectionFailed"));
    assert!(reasons.contains(&"DependencyFailed"));
    Ok(())
}

#[test]
fn select_reports_progress_without_mutating() -> TestResult {
    init_tracing();
    let (services, _builds, _tests) = fake_services(&[1.0; 6]);
    let evaluator = bisection_evaluator(&services);
    let (store, job) = populated_store(create_graph(&BisectionOptionsBuilder::new(0, 5).build())?);
    let loader = TaskGraphLoader::new(&store, job.clone());

    evaluate_graph(&Event::initiate(), &evaluator, &loader)?;
    let before = store.load(&job)?;

    let context = evaluate_graph(
        &Event::select(),
        &Selector::for_task_type(TaskType::FindIsolate),
        &loader,
    )?;
    assert_eq!(context.len(), 2);
    assert!(context.values().all(|v| v.state == TaskState::Ongoing));

    let finder = evaluate_graph(
        &Event::select(),
        &Selector::for_task_type(TaskType::FindCulprit),
        &loader,
    )?;
    let view = finder.get(FIND_CULPRIT_TASK_ID).expect("aggregator selected");
    assert_eq!(view.state, TaskState::Ongoing);
    let range = &view.payload.as_find_culprit().expect("payload").output.commit_range;
    assert_eq!(range.len(), 6);

    assert_eq!(store.load(&job)?, before);
    Ok(())
}
