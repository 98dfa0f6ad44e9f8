// src/engine/evaluate.rs

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::engine::action::Action;
use crate::engine::event::Event;
use crate::engine::evaluator::{Context, Evaluator};
use crate::errors::{BisectError, Result};
use crate::graph::{Task, TaskGraph, TaskId, TaskUpdate};
use crate::store::{JobId, TaskStore};

/// Pass cap for [`evaluate_graph`].
pub const DEFAULT_MAX_PASSES: usize = 1000;

/// Loads (and applies mutations to) the graph of one job.
pub struct TaskGraphLoader<'a> {
    store: &'a dyn TaskStore,
    job: JobId,
}

impl<'a> TaskGraphLoader<'a> {
    pub fn new(store: &'a dyn TaskStore, job: JobId) -> Self {
        Self { store, job }
    }

    pub fn job(&self) -> &JobId {
        &self.job
    }

    pub fn load(&self) -> Result<TaskGraph> {
        self.store.load(&self.job)
    }
}

/// Drive the job graph to a fixpoint under `evaluator`.
///
/// Each pass reloads the graph and visits every task, dependencies first.
/// Actions are applied right after the evaluator call that produced them,
/// and the updated views are merged into the context. The loop stops after
/// the first pass that changes nothing.
///
/// For `select` the whole context is returned. For mutating events only
/// the tasks whose stored state or payload changed during the call are
/// returned, with their latest views.
pub fn evaluate_graph<E>(event: &Event, evaluator: &E, loader: &TaskGraphLoader<'_>) -> Result<Context>
where
    E: Evaluator + ?Sized,
{
    evaluate_graph_with_limit(event, evaluator, loader, DEFAULT_MAX_PASSES)
}

/// Same as [`evaluate_graph`] with an explicit pass cap.
pub fn evaluate_graph_with_limit<E>(
    event: &Event,
    evaluator: &E,
    loader: &TaskGraphLoader<'_>,
    max_passes: usize,
) -> Result<Context>
where
    E: Evaluator + ?Sized,
{
    let mut context = Context::new();
    let mut touched = BTreeSet::new();

    for pass in 1..=max_passes {
        let graph = loader.load()?;
        if graph.is_empty() {
            return Err(BisectError::MalformedGraph(format!(
                "job '{}' has no tasks",
                loader.job()
            )));
        }
        let order = graph.topological_order()?;
        let mut tasks = graph.into_tasks();

        let outcome = run_pass(
            event,
            evaluator,
            loader,
            &order,
            &mut tasks,
            &mut context,
            &mut touched,
        )?;
        debug!(
            job = %loader.job(),
            event = %event.event_type,
            pass,
            changes = outcome.changes,
            interrupted = outcome.interrupted,
            "evaluation pass finished"
        );

        if outcome.changes == 0 && !outcome.interrupted {
            if event.is_select() {
                return Ok(context);
            }
            return Ok(context
                .into_iter()
                .filter(|(id, _)| touched.contains(id))
                .collect());
        }
    }

    Err(BisectError::IterationLimit(max_passes))
}

#[derive(Debug, Default)]
struct PassOutcome {
    changes: usize,
    /// A concurrent writer won a compare-and-set; the pass stopped early.
    interrupted: bool,
}

fn run_pass<E>(
    event: &Event,
    evaluator: &E,
    loader: &TaskGraphLoader<'_>,
    order: &[TaskId],
    tasks: &mut BTreeMap<TaskId, Task>,
    context: &mut Context,
    touched: &mut BTreeSet<TaskId>,
) -> Result<PassOutcome>
where
    E: Evaluator + ?Sized,
{
    let mut outcome = PassOutcome::default();

    for id in order {
        let Some(task) = tasks.get(id).cloned() else {
            continue;
        };

        let actions = evaluator.evaluate(&task, event, context)?;
        if actions.is_empty() {
            continue;
        }
        if event.is_select() {
            return Err(BisectError::SelectMutation(task.id));
        }

        for action in actions {
            match apply_action(loader, tasks, context, touched, action) {
                Ok(true) => outcome.changes += 1,
                Ok(false) => {}
                Err(BisectError::Conflict {
                    task,
                    expected,
                    found,
                }) => {
                    warn!(
                        job = %loader.job(),
                        task = %task,
                        expected,
                        found,
                        "lost compare-and-set race, re-running pass"
                    );
                    outcome.interrupted = true;
                    return Ok(outcome);
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(outcome)
}

/// Apply one action; returns whether anything changed.
fn apply_action(
    loader: &TaskGraphLoader<'_>,
    tasks: &mut BTreeMap<TaskId, Task>,
    context: &mut Context,
    touched: &mut BTreeSet<TaskId>,
    action: Action,
) -> Result<bool> {
    match action {
        Action::UpdateTask {
            task_id,
            new_state,
            payload,
        } => {
            let current = tasks
                .get(&task_id)
                .ok_or_else(|| BisectError::TaskNotFound(task_id.clone()))?;

            let state_unchanged = new_state.is_none_or(|s| s == current.state);
            let payload_unchanged = payload.as_ref().is_none_or(|p| *p == current.payload);
            if state_unchanged && payload_unchanged {
                context.insert(task_id, current.view());
                return Ok(false);
            }

            let update = TaskUpdate {
                task_id: task_id.clone(),
                expected_revision: current.revision,
                new_state,
                payload,
            };
            let previous = current.state;
            let updated = loader.store.update(&loader.job, update)?;
            if updated.state != previous {
                info!(
                    job = %loader.job,
                    task = %updated.id,
                    from = %previous,
                    to = %updated.state,
                    "task transitioned"
                );
            }
            context.insert(task_id.clone(), updated.view());
            touched.insert(task_id.clone());
            tasks.insert(task_id, updated);
            Ok(true)
        }
        Action::ExtendGraph { vertices, edges } => {
            let requested = vertices.len();
            let amendment = loader.store.add_tasks(&loader.job, vertices, edges)?;
            if !amendment.is_empty() {
                info!(
                    job = %loader.job,
                    requested,
                    vertices_added = amendment.vertices_added,
                    edges_added = amendment.edges_added,
                    "extended task graph"
                );
            }
            Ok(!amendment.is_empty())
        }
    }
}
