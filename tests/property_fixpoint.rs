// tests/property_fixpoint.rs

use std::cell::RefCell;
use std::collections::BTreeSet;

use perfbisect::engine::{
    Action, Context, Event, SequenceEvaluator, TaskGraphLoader, TaskPayloadLiftingEvaluator,
    evaluate_graph, from_fn,
};
use perfbisect::errors::Result as BisectResult;
use perfbisect::graph::{Task, TaskGraph, TaskState};
use perfbisect::store::TaskStore;
use perfbisect_test_utils::builders::{GraphBuilder, populated_store};
use proptest::prelude::*;

// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = TaskGraph> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(move |raw_deps| {
            let mut builder = GraphBuilder::new();
            for i in 0..num_tasks {
                builder = builder.task(&format!("t{i}"));
            }
            for (i, potential) in raw_deps.into_iter().enumerate() {
                if i == 0 {
                    continue;
                }
                let deps: BTreeSet<usize> = potential.into_iter().map(|d| d % i).collect();
                for dep in deps {
                    builder = builder.edge(&format!("t{i}"), &format!("t{dep}"));
                }
            }
            builder.build()
        })
    })
}

fn advance_when_ready(task: &Task, _event: &Event, context: &mut Context) -> BisectResult<Vec<Action>> {
    let ready = task
        .dependencies
        .iter()
        .all(|d| context.get(d).is_some_and(|v| v.state == TaskState::Completed));
    let action = match task.state {
        TaskState::Pending if ready => Action::update_state(&task.id, TaskState::Ongoing),
        TaskState::Ongoing => Action::update_state(&task.id, TaskState::Completed),
        _ => return Ok(Vec::new()),
    };
    Ok(vec![action])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn evaluation_reaches_a_fixpoint(graph in dag_strategy(12)) {
        let (store, job) = populated_store(graph);
        let loader = TaskGraphLoader::new(&store, job.clone());
        let evaluator = SequenceEvaluator::new()
            .then(advance_when_ready)
            .then(TaskPayloadLiftingEvaluator::new());

        evaluate_graph(&Event::initiate(), &evaluator, &loader).expect("evaluation");
        let done = store.load(&job).expect("load");
        for task in done.tasks() {
            prop_assert_eq!(task.state, TaskState::Completed, "{}", &task.id);
            // pending -> ongoing -> completed, one stored update each.
            prop_assert_eq!(task.revision, 2, "{}", &task.id);
        }

        evaluate_graph(&Event::initiate(), &evaluator, &loader).expect("second evaluation");
        prop_assert_eq!(store.load(&job).expect("load"), done);
    }

    #[test]
    fn dependencies_are_visited_first(graph in dag_strategy(12)) {
        let edges = graph.edges();
        let (store, job) = populated_store(graph);
        let loader = TaskGraphLoader::new(&store, job);

        let visits = RefCell::new(Vec::new());
        let recorder = from_fn(|task: &Task, _event: &Event, _context: &mut Context| {
            visits.borrow_mut().push(task.id.clone());
            Ok(Vec::new())
        });
        evaluate_graph(&Event::select(), &recorder, &loader).expect("select");

        let visits = visits.borrow().clone();
        for edge in edges {
            let from = visits.iter().position(|id| *id == edge.from);
            let to = visits.iter().position(|id| *id == edge.to);
            prop_assert!(to < from, "{} visited before its dependency {}", edge.from, edge.to);
        }
    }
}
