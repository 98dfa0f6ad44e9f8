// tests/property_bisection.rs

use std::sync::Arc;

use perfbisect::bisect::{FIND_CULPRIT_TASK_ID, create_graph};
use perfbisect::engine::{Event, TaskGraphLoader, evaluate_graph};
use perfbisect::graph::TaskState;
use perfbisect::store::TaskStore;
use perfbisect_test_utils::builders::{BisectionOptionsBuilder, change, populated_store};
use perfbisect_test_utils::fakes::{FakeCodeHistory, fake_bisection_evaluator, value_by_commit};
use proptest::prelude::*;

/// Per-commit measurements: a slow drift that stays well below the
/// comparison magnitude, plus one step of at least 1.5 at `jump_at`.
fn series_strategy() -> impl Strategy<Value = (Vec<f64>, usize)> {
    (3usize..=8).prop_flat_map(|len| {
        (
            proptest::collection::vec(0.0f64..0.1, len),
            1..len,
            1.5f64..3.0,
        )
            .prop_map(|(drift, jump_at, jump)| {
                let mut level = 100.0;
                let values: Vec<f64> = drift
                    .iter()
                    .enumerate()
                    .map(|(i, step)| {
                        level += step;
                        if i >= jump_at { level + jump } else { level }
                    })
                    .collect();
                (values, jump_at)
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn a_single_step_is_always_isolated((values, jump_at) in series_strategy()) {
        let len = values.len();
        let options = BisectionOptionsBuilder::new(0, len - 1)
            .magnitude(1.0)
            .min_attempts(10)
            .max_attempts(20)
            .build();
        let (store, job) = populated_store(create_graph(&options).expect("graph"));
        let loader = TaskGraphLoader::new(&store, job.clone());
        let evaluator = fake_bisection_evaluator(
            Arc::new(FakeCodeHistory::new(len)),
            value_by_commit(values),
        );

        evaluate_graph(&Event::initiate(), &evaluator, &loader).expect("evaluation");

        let graph = store.load(&job).expect("load");
        let finder = graph.task(FIND_CULPRIT_TASK_ID).expect("aggregator");
        prop_assert_eq!(finder.state, TaskState::Completed);
        let culprits: Vec<_> = finder
            .payload
            .as_find_culprit()
            .expect("find_culprit payload")
            .output
            .culprits
            .iter()
            .map(|c| (c.from.clone(), c.to.clone()))
            .collect();
        prop_assert_eq!(culprits, vec![(change(jump_at - 1), change(jump_at))]);
    }
}
