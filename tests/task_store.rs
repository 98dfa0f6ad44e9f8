// tests/task_store.rs

use std::error::Error;

use perfbisect::errors::BisectError;
use perfbisect::graph::{
    Dependency, ErrorMessage, RunTestInput, RunTestOutput, RunTestPayload, TaskPayload, TaskState,
    TaskUpdate, TaskVertex, TestOptions,
};
use perfbisect::store::{FileTaskStore, JobId, MemoryTaskStore, TaskStore};
use perfbisect_test_utils::builders::{
    GraphBuilder, change, plain_payload, plain_vertex, two_attempt_bisection_graph,
};
use perfbisect_test_utils::init_tracing;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn job() -> JobId {
    JobId::parse("job-1").expect("valid job id")
}

fn stores(dir: &TempDir) -> Vec<(&'static str, Box<dyn TaskStore>)> {
    let memory: Box<dyn TaskStore> = Box::new(MemoryTaskStore::new());
    let file: Box<dyn TaskStore> = Box::new(FileTaskStore::open(dir.path()).expect("file store"));
    vec![("memory", memory), ("file", file)]
}

fn update(task_id: &str, revision: u64, state: TaskState) -> TaskUpdate {
    TaskUpdate {
        task_id: task_id.to_string(),
        expected_revision: revision,
        new_state: Some(state),
        payload: None,
    }
}

fn run_test_vertex(id: &str) -> TaskVertex {
    TaskVertex::new(
        id,
        TaskPayload::RunTest(RunTestPayload {
            input: RunTestInput {
                change: change(0),
                attempt: 0,
                test: TestOptions {
                    dimensions: Vec::new(),
                    extra_args: Vec::new(),
                    execution_timeout_secs: 60,
                },
            },
            output: RunTestOutput::default(),
            errors: Vec::new(),
        }),
    )
}

#[test]
fn populate_then_load_round_trips_the_graph() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        let graph = two_attempt_bisection_graph();
        store.populate(&job(), graph.clone())?;
        assert_eq!(store.load(&job())?, graph, "{name}");
    }
    Ok(())
}

#[test]
fn populating_a_job_twice_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        store.populate(&job(), GraphBuilder::new().task("a").build())?;
        let err = store
            .populate(&job(), GraphBuilder::new().task("b").build())
            .expect_err("second populate");
        assert!(matches!(err, BisectError::JobAlreadyPopulated(_)), "{name}: {err:?}");
        // The first graph is untouched.
        assert!(store.load(&job())?.contains("a"), "{name}");
    }
    Ok(())
}

#[test]
fn unknown_job_is_not_found() -> TestResult {
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        let err = store.load(&job()).expect_err("no job");
        assert!(matches!(err, BisectError::JobNotFound(_)), "{name}: {err:?}");
    }
    Ok(())
}

#[test]
fn update_bumps_revision_and_rejects_stale_writers() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        store.populate(&job(), GraphBuilder::new().task("a").build())?;

        let task = store.update(&job(), update("a", 0, TaskState::Ongoing))?;
        assert_eq!(task.state, TaskState::Ongoing, "{name}");
        assert_eq!(task.revision, 1, "{name}");

        let err = store
            .update(&job(), update("a", 0, TaskState::Completed))
            .expect_err("stale revision");
        match err {
            BisectError::Conflict { task, expected, found } => {
                assert_eq!((task.as_str(), expected, found), ("a", 0, 1), "{name}");
            }
            other => panic!("{name}: expected Conflict, got {other:?}"),
        }
        assert_eq!(store.load(&job())?.task("a").map(|t| t.state), Some(TaskState::Ongoing));
    }
    Ok(())
}

#[test]
fn terminal_states_cannot_be_left() -> TestResult {
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        store.populate(&job(), GraphBuilder::new().task("a").build())?;
        store.update(&job(), update("a", 0, TaskState::Completed))?;

        let err = store
            .update(&job(), update("a", 1, TaskState::Ongoing))
            .expect_err("completed is terminal");
        assert!(
            matches!(
                err,
                BisectError::InvalidTransition {
                    from: TaskState::Completed,
                    to: TaskState::Ongoing,
                    ..
                }
            ),
            "{name}: {err:?}"
        );

        // Payload-only updates of terminal tasks are rejected as well.
        let err = store
            .update(
                &job(),
                TaskUpdate {
                    task_id: "a".to_string(),
                    expected_revision: 1,
                    new_state: None,
                    payload: Some(plain_payload("other")),
                },
            )
            .expect_err("terminal payloads are frozen");
        assert!(matches!(err, BisectError::InvalidTransition { .. }), "{name}: {err:?}");
    }
    Ok(())
}

#[test]
fn update_of_unknown_task_fails() -> TestResult {
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        store.populate(&job(), GraphBuilder::new().task("a").build())?;
        let err = store
            .update(&job(), update("nope", 0, TaskState::Ongoing))
            .expect_err("unknown task");
        assert!(matches!(err, BisectError::TaskNotFound(_)), "{name}: {err:?}");
    }
    Ok(())
}

#[test]
fn payload_type_cannot_change() -> TestResult {
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        store.populate(&job(), GraphBuilder::new().task("a").build())?;
        let err = store
            .update(
                &job(),
                TaskUpdate {
                    task_id: "a".to_string(),
                    expected_revision: 0,
                    new_state: None,
                    payload: run_test_vertex("a").payload.into(),
                },
            )
            .expect_err("type change");
        assert!(matches!(err, BisectError::InvalidAmendment(_)), "{name}: {err:?}");
    }
    Ok(())
}

#[test]
fn add_tasks_is_idempotent() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        store.populate(&job(), GraphBuilder::new().task("root").build())?;
        let (vertices, edges) = GraphBuilder::new()
            .task("leaf")
            .edge("root", "leaf")
            .parts();

        let first = store.add_tasks(&job(), vertices.clone(), edges.clone())?;
        assert_eq!((first.vertices_added, first.edges_added), (1, 1), "{name}");

        let second = store.add_tasks(&job(), vertices, edges)?;
        assert!(second.is_empty(), "{name}");

        let graph = store.load(&job())?;
        assert_eq!(graph.len(), 2, "{name}");
        assert_eq!(graph.dependencies_of("root").len(), 1, "{name}");
        assert_eq!(graph.dependents_of("leaf"), vec!["root"], "{name}");
    }
    Ok(())
}

#[test]
fn added_vertices_keep_existing_state() -> TestResult {
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        store.populate(&job(), GraphBuilder::new().task("a").build())?;
        store.update(&job(), update("a", 0, TaskState::Completed))?;

        store.add_tasks(&job(), vec![plain_vertex("a")], Vec::new())?;
        assert_eq!(
            store.load(&job())?.task("a").map(|t| t.state),
            Some(TaskState::Completed),
            "{name}"
        );
    }
    Ok(())
}

#[test]
fn invalid_amendments_leave_the_graph_untouched() -> TestResult {
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        let graph = GraphBuilder::new().task("a").task("b").edge("b", "a").build();
        store.populate(&job(), graph.clone())?;

        // Same id, different task type.
        let err = store
            .add_tasks(&job(), vec![run_test_vertex("a")], Vec::new())
            .expect_err("type clash");
        assert!(matches!(err, BisectError::InvalidAmendment(_)), "{name}: {err:?}");

        // Dangling edge.
        let err = store
            .add_tasks(&job(), vec![plain_vertex("c")], vec![Dependency::new("c", "missing")])
            .expect_err("dangling edge");
        assert!(matches!(err, BisectError::InvalidAmendment(_)), "{name}: {err:?}");

        // Cycle.
        let err = store
            .add_tasks(&job(), Vec::new(), vec![Dependency::new("a", "b")])
            .expect_err("cycle");
        assert!(matches!(err, BisectError::InvalidAmendment(_)), "{name}: {err:?}");

        assert_eq!(store.load(&job())?, graph, "{name}");
    }
    Ok(())
}

#[test]
fn reopen_moves_terminal_task_back_to_pending() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    for (name, store) in stores(&dir) {
        store.populate(&job(), GraphBuilder::new().task("a").build())?;
        let mut failed = plain_payload("a");
        failed.push_error(ErrorMessage::new("BuildFailed", "toolchain missing"));
        store.update(
            &job(),
            TaskUpdate {
                payload: Some(failed),
                ..update("a", 0, TaskState::Failed)
            },
        )?;

        let task = store.reopen(&job(), "a")?;
        assert_eq!(task.state, TaskState::Pending, "{name}");
        assert_eq!(task.revision, 2, "{name}");
        assert!(task.payload.errors().is_empty(), "{name}");
        assert_eq!(store.load(&job())?.task("a"), Some(&task), "{name}");

        let err = store.reopen(&job(), "nope").expect_err("unknown task");
        assert!(matches!(err, BisectError::TaskNotFound(_)), "{name}: {err:?}");
    }
    Ok(())
}

#[test]
fn file_store_survives_reopening_the_directory() -> TestResult {
    let dir = TempDir::new()?;
    {
        let store = FileTaskStore::open(dir.path())?;
        store.populate(&job(), two_attempt_bisection_graph())?;
        store.update(&job(), update("performance_bisection", 0, TaskState::Ongoing))?;
    }

    let store = FileTaskStore::open(dir.path())?;
    let graph = store.load(&job())?;
    assert_eq!(graph.len(), 11);
    assert_eq!(
        graph.task("performance_bisection").map(|t| (t.state, t.revision)),
        Some((TaskState::Ongoing, 1))
    );
    assert!(dir.path().join("jobs").join("job-1.json").is_file());
    Ok(())
}

#[test]
fn leftover_lock_file_does_not_block_updates() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let store = FileTaskStore::open(dir.path())?;
    store.populate(&job(), GraphBuilder::new().task("a").task("b").build())?;

    // A writer killed mid-update leaves its lock file behind.
    std::fs::write(dir.path().join("jobs").join("job-1.lock"), "")?;

    let task = store.update(&job(), update("a", 0, TaskState::Ongoing))?;
    assert_eq!((task.state, task.revision), (TaskState::Ongoing, 1));
    store.add_tasks(&job(), vec![plain_vertex("c")], vec![Dependency::new("c", "a")])?;
    store.reopen(&job(), "a")?;
    assert_eq!(store.load(&job())?.len(), 3);
    Ok(())
}

#[test]
fn job_ids_must_be_file_name_safe() {
    assert!(JobId::parse("job-0123abcd").is_ok());
    assert!(JobId::parse("a.b_c-d").is_ok());
    for bad in ["", "../escape", "with space", "-leading-dash", "a/b"] {
        assert!(
            matches!(JobId::parse(bad), Err(BisectError::ConfigError(_))),
            "{bad:?} should be rejected"
        );
    }
}
