// tests/engine_combinators.rs

use std::error::Error;

use perfbisect::engine::predicates::{all, is_target, not, task_state_in, task_type_is};
use perfbisect::engine::{
    Action, Context, DispatchByEventType, DispatchByTaskType, Evaluator, Event, EventType,
    FilteringEvaluator, NoopEvaluator, Predicate, Selector, SequenceEvaluator,
    TaskPayloadLiftingEvaluator, from_fn,
};
use perfbisect::errors::Result as BisectResult;
use perfbisect::graph::{Task, TaskState, TaskType, TaskVertex};
use perfbisect_test_utils::builders::plain_vertex;

type TestResult = Result<(), Box<dyn Error>>;

fn pending(id: &str) -> Task {
    plain_vertex(id).into_task()
}

fn ongoing(id: &str) -> Task {
    let mut task = pending(id);
    task.state = TaskState::Ongoing;
    task
}

fn complete(task: &Task, _event: &Event, _context: &mut Context) -> BisectResult<Vec<Action>> {
    Ok(vec![Action::update_state(&task.id, TaskState::Completed)])
}

fn fail_state(task: &Task, _event: &Event, _context: &mut Context) -> BisectResult<Vec<Action>> {
    Ok(vec![Action::update_state(&task.id, TaskState::Failed)])
}

#[test]
fn sequence_returns_first_non_empty_result() -> TestResult {
    let sequence = SequenceEvaluator::new()
        .then(NoopEvaluator)
        .then(complete)
        .then(fail_state);
    assert_eq!(sequence.len(), 3);

    let actions = sequence.evaluate(&pending("a"), &Event::initiate(), &mut Context::new())?;
    assert_eq!(actions, vec![Action::update_state("a", TaskState::Completed)]);

    let empty = SequenceEvaluator::new();
    assert!(empty.is_empty());
    assert!(empty.evaluate(&pending("a"), &Event::initiate(), &mut Context::new())?.is_empty());
    Ok(())
}

#[test]
fn filter_delegates_only_when_predicate_holds() -> TestResult {
    let filter = FilteringEvaluator::new(task_state_in([TaskState::Pending]), complete)
        .with_alternative(fail_state);

    let on_pending = filter.evaluate(&pending("a"), &Event::initiate(), &mut Context::new())?;
    assert_eq!(on_pending, vec![Action::update_state("a", TaskState::Completed)]);

    let on_ongoing = filter.evaluate(&ongoing("a"), &Event::initiate(), &mut Context::new())?;
    assert_eq!(on_ongoing, vec![Action::update_state("a", TaskState::Failed)]);

    let without_alternative = FilteringEvaluator::new(task_state_in([TaskState::Pending]), complete);
    assert!(without_alternative
        .evaluate(&ongoing("a"), &Event::initiate(), &mut Context::new())?
        .is_empty());
    Ok(())
}

#[test]
fn dispatch_by_task_type_routes_and_ignores_unregistered_types() -> TestResult {
    let dispatch = DispatchByTaskType::new().register(TaskType::FindIsolate, complete);
    assert!(dispatch.handles(TaskType::FindIsolate));
    assert!(!dispatch.handles(TaskType::ReadValue));

    let actions = dispatch.evaluate(&pending("a"), &Event::initiate(), &mut Context::new())?;
    assert_eq!(actions.len(), 1);

    let other = DispatchByTaskType::new().register(TaskType::RunTest, complete);
    assert!(other.evaluate(&pending("a"), &Event::initiate(), &mut Context::new())?.is_empty());
    Ok(())
}

#[test]
fn dispatch_by_event_type_routes_on_event() -> TestResult {
    let dispatch = DispatchByEventType::new()
        .register(EventType::Initiate, complete)
        .register(EventType::Update, fail_state);

    let task = pending("a");
    let initiate = dispatch.evaluate(&task, &Event::initiate(), &mut Context::new())?;
    let update = dispatch.evaluate(&task, &Event::update("a"), &mut Context::new())?;
    let select = dispatch.evaluate(&task, &Event::select(), &mut Context::new())?;

    assert_eq!(initiate, vec![Action::update_state("a", TaskState::Completed)]);
    assert_eq!(update, vec![Action::update_state("a", TaskState::Failed)]);
    assert!(select.is_empty());
    Ok(())
}

#[test]
fn lifting_evaluator_copies_view_into_context() -> TestResult {
    let lifter = TaskPayloadLiftingEvaluator::new();
    let mut context = Context::new();
    let actions = lifter.evaluate(&ongoing("a"), &Event::initiate(), &mut context)?;

    assert!(actions.is_empty());
    assert_eq!(context.get("a").map(|v| v.state), Some(TaskState::Ongoing));

    let selective = TaskPayloadLiftingEvaluator::new().excluding_event_types(&[EventType::Select]);
    let mut context = Context::new();
    selective.evaluate(&ongoing("a"), &Event::select(), &mut context)?;
    assert!(context.is_empty());
    Ok(())
}

#[test]
fn selector_matches_any_configured_matcher() -> TestResult {
    let task = pending("a");

    let by_type = Selector::for_task_type(TaskType::FindIsolate);
    let mut context = Context::new();
    by_type.evaluate(&task, &Event::select(), &mut context)?;
    assert!(context.contains_key("a"));

    let by_predicate = Selector::matching(|task: &Task, _: &Event, _: &Context| task.id == "b");
    let mut context = Context::new();
    by_predicate.evaluate(&task, &Event::select(), &mut context)?;
    assert!(context.is_empty());

    let nothing = Selector::default();
    let mut context = Context::new();
    let actions = nothing.evaluate(&task, &Event::select(), &mut context)?;
    assert!(actions.is_empty() && context.is_empty());
    Ok(())
}

#[test]
fn predicates_compose() {
    let context = Context::new();
    let task = pending("a");
    let event = Event::update("a");

    assert!(task_type_is(TaskType::FindIsolate)(&task, &event, &context));
    assert!(!task_type_is(TaskType::RunTest)(&task, &event, &context));
    assert!(is_target()(&task, &event, &context));
    assert!(!is_target()(&task, &Event::update("b"), &context));
    assert!(!is_target()(&task, &Event::initiate(), &context));
    assert!(not(task_state_in([TaskState::Completed, TaskState::Failed]))(&task, &event, &context));

    let is_pending: Predicate = Box::new(task_state_in([TaskState::Pending]));
    let targeted: Predicate = Box::new(is_target());
    let both = all(vec![is_pending, targeted]);
    assert!(both(&task, &event, &context));
    assert!(!both(&ongoing("a"), &event, &context));
    assert!(!both(&task, &Event::initiate(), &context));
}

#[test]
fn closures_and_fn_items_are_evaluators() -> TestResult {
    let counter = std::cell::Cell::new(0);
    let counting = from_fn(|task: &Task, _event: &Event, _context: &mut Context| {
        counter.set(counter.get() + 1);
        let child = TaskVertex::new(format!("{}-child", task.id), task.payload.clone());
        Ok(vec![Action::extend_graph(vec![child], Vec::new())])
    });

    let actions = counting.evaluate(&pending("a"), &Event::initiate(), &mut Context::new())?;
    assert_eq!(counter.get(), 1);
    match &actions[..] {
        [Action::ExtendGraph { vertices, edges }] => {
            assert_eq!(vertices[0].id, "a-child");
            assert!(edges.is_empty());
        }
        other => panic!("unexpected actions {other:?}"),
    }
    Ok(())
}
