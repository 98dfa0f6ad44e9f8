// src/stages/find_isolate.rs

//! `find_isolate` stage: obtain a build artifact for a change.
//!
//! - pending: reuse an existing artifact, or request a build and go ongoing.
//! - ongoing: on an update addressed to the task, poll the build.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::engine::predicates::{is_target, task_state_in, task_type_is};
use crate::engine::{
    Action, Context, DispatchByEventType, Evaluator, Event, EventPayload, EventType,
    FilteringEvaluator, SequenceEvaluator,
};
use crate::errors::{BisectError, Result};
use crate::graph::{
    Change, ErrorMessage, FindIsolatePayload, Task, TaskId, TaskPayload, TaskState, TaskType,
};
use crate::services::{BuildBackend, BuildRequest, BuildStatus};

pub fn task_id(change: &Change) -> TaskId {
    format!("find_isolate_{}", change.id_string())
}

/// Composed `find_isolate` evaluator.
pub fn evaluator(builds: Arc<dyn BuildBackend>) -> impl Evaluator {
    let initiate = InitiateBuild {
        builds: Arc::clone(&builds),
    };
    let poll = PollBuild { builds };
    let targeted = is_target();

    FilteringEvaluator::new(
        task_type_is(TaskType::FindIsolate),
        DispatchByEventType::new()
            .register(
                EventType::Initiate,
                FilteringEvaluator::new(task_state_in([TaskState::Pending]), initiate.clone()),
            )
            .register(
                EventType::Update,
                SequenceEvaluator::new()
                    .then(FilteringEvaluator::new(task_state_in([TaskState::Pending]), initiate))
                    .then(FilteringEvaluator::new(
                        move |task: &Task, event: &Event, context: &Context| {
                            task.state == TaskState::Ongoing && targeted(task, event, context)
                        },
                        poll,
                    )),
            ),
    )
}

fn payload_of<'a>(task: &'a Task) -> Result<&'a FindIsolatePayload> {
    task.payload
        .as_find_isolate()
        .ok_or_else(|| BisectError::evaluator(&task.id, "expected a find_isolate payload"))
}

fn build_request(payload: &FindIsolatePayload) -> BuildRequest {
    BuildRequest {
        builder: payload.input.build.builder.clone(),
        target: payload.input.build.target.clone(),
        bucket: payload.input.build.bucket.clone(),
        change: payload.input.change.clone(),
    }
}

fn fail(task: &Task, payload: FindIsolatePayload, reason: &str, message: impl Into<String>) -> Action {
    let error = ErrorMessage::new(reason, message);
    warn!(task = %task.id, reason = %error.reason, message = %error.message, "build failed");
    Action::fail(&task.id, TaskPayload::FindIsolate(payload), error)
}

#[derive(Clone)]
struct InitiateBuild {
    builds: Arc<dyn BuildBackend>,
}

impl Evaluator for InitiateBuild {
    fn evaluate(&self, task: &Task, _event: &Event, _context: &mut Context) -> Result<Vec<Action>> {
        let payload = payload_of(task)?;
        let request = build_request(payload);
        let mut next = payload.clone();

        match self.builds.lookup_artifact(&request) {
            Ok(Some(artifact)) => {
                debug!(task = %task.id, digest = %artifact.digest, "reusing existing build artifact");
                next.output.artifact = Some(artifact);
                return Ok(vec![Action::update(
                    &task.id,
                    TaskState::Completed,
                    TaskPayload::FindIsolate(next),
                )]);
            }
            Ok(None) => {}
            Err(e) => {
                // A failed lookup is not fatal; fall through to a fresh build.
                warn!(task = %task.id, error = %e, "artifact lookup failed");
            }
        }

        match self.builds.request_build(&request) {
            Ok(handle) => {
                info!(task = %task.id, build_id = %handle.id, "requested build");
                next.output.build_id = Some(handle.id);
                next.output.build_url = handle.url;
                next.output.tries += 1;
                Ok(vec![Action::update(
                    &task.id,
                    TaskState::Ongoing,
                    TaskPayload::FindIsolate(next),
                )])
            }
            Err(e) => Ok(vec![fail(task, next, "BuildRequestFailed", e.to_string())]),
        }
    }
}

struct PollBuild {
    builds: Arc<dyn BuildBackend>,
}

impl Evaluator for PollBuild {
    fn evaluate(&self, task: &Task, event: &Event, _context: &mut Context) -> Result<Vec<Action>> {
        let payload = payload_of(task)?;
        let next = payload.clone();

        let Some(build_id) = payload.output.build_id.as_deref() else {
            return Ok(vec![fail(
                task,
                next,
                "MissingBuildId",
                "no build id recorded for an ongoing build",
            )]);
        };

        if let EventPayload::BuildUpdate { build_id: notified } = &event.payload {
            if notified != build_id {
                debug!(task = %task.id, %notified, recorded = %build_id, "ignoring update for another build");
                return Ok(Vec::new());
            }
        }

        let status = match self.builds.poll_build(build_id) {
            Ok(status) => status,
            Err(e) => return Ok(vec![fail(task, next, "BuildRequestFailed", e.to_string())]),
        };

        let action = match status {
            BuildStatus::InProgress => return Ok(Vec::new()),
            BuildStatus::Succeeded { artifact: Some(artifact) } => {
                let mut next = next;
                next.output.artifact = Some(artifact);
                Action::update(&task.id, TaskState::Completed, TaskPayload::FindIsolate(next))
            }
            BuildStatus::Succeeded { artifact: None } => fail(
                task,
                next,
                "BuildIsolateNotFound",
                format!("build {build_id} finished without an artifact"),
            ),
            BuildStatus::Failed { message } => fail(task, next, "BuildFailed", message),
            BuildStatus::Cancelled => fail(task, next, "BuildCancelled", format!("build {build_id} was cancelled")),
            BuildStatus::TimedOut => fail(task, next, "BuildTimeout", format!("build {build_id} timed out")),
        };
        Ok(vec![action])
    }
}
