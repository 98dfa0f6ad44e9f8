// src/bisect/culprit_finder.rs

//! The `find_culprit` aggregator.
//!
//! - pending: expand the start/end changes into the full commit range and
//!   go ongoing.
//! - ongoing: tally the `read_value` dependencies per change, compare
//!   adjacent explored changes, and either extend the graph (midpoints,
//!   more attempts), complete with the culprit ranges, or fail when too
//!   few changes produced data.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bisect::compare::compare;
use crate::bisect::exploration;
use crate::bisect::plan;
use crate::engine::predicates::{task_state_in, task_type_is};
use crate::engine::{
    Action, Context, DispatchByEventType, Evaluator, Event, EventType, FilteringEvaluator,
};
use crate::errors::{BisectError, Result};
use crate::graph::{
    AnalysisOptions, Change, ChangeResult, Commit, CulpritRange, Dependency, ErrorMessage,
    FindCulpritInput, FindCulpritOutput, FindCulpritPayload, PairVerdict, Task, TaskPayload,
    TaskState, TaskType, TaskVertex, Verdict,
};
use crate::services::CodeHistory;

pub const DEFAULT_SPECULATION_LEVELS: usize = 2;

/// Growth factor applied to the attempt count of an inconclusive change.
const ATTEMPT_GROWTH: f64 = 1.5;

/// Aggregator evaluator for `find_culprit` tasks.
#[derive(Clone)]
pub struct FindCulpritEvaluator {
    code_history: Arc<dyn CodeHistory>,
    speculation_levels: usize,
}

/// `find_culprit` tasks that are still running, on initiate and update events.
pub fn evaluator(code_history: Arc<dyn CodeHistory>) -> impl Evaluator {
    let finder = FindCulpritEvaluator::new(code_history);
    FilteringEvaluator::new(
        task_type_is(TaskType::FindCulprit),
        FilteringEvaluator::new(
            task_state_in([TaskState::Pending, TaskState::Ongoing]),
            DispatchByEventType::new()
                .register(EventType::Initiate, finder.clone())
                .register(EventType::Update, finder),
        ),
    )
}

impl FindCulpritEvaluator {
    pub fn new(code_history: Arc<dyn CodeHistory>) -> Self {
        Self {
            code_history,
            speculation_levels: DEFAULT_SPECULATION_LEVELS,
        }
    }

    /// How many midpoint levels to explore per split; at least one.
    pub fn with_speculation_levels(mut self, levels: usize) -> Self {
        self.speculation_levels = levels.max(1);
        self
    }

    /// Full ordered range from `start_change` to `end_change`, both included.
    pub fn expand_range(&self, input: &FindCulpritInput) -> std::result::Result<Vec<Change>, ErrorMessage> {
        let start = &input.start_change;
        let end = &input.end_change;
        let (Some(base), Some(end_base)) = (start.base_commit(), end.base_commit()) else {
            return Err(ErrorMessage::new(
                "InvalidCommitRange",
                "start and end changes must name a base commit",
            ));
        };
        if base.repository != end_base.repository {
            return Err(ErrorMessage::new(
                "InvalidCommitRange",
                format!(
                    "start ({}) and end ({}) are in different repositories",
                    base.repository, end_base.repository
                ),
            ));
        }

        let commits = self
            .code_history
            .commit_range(&base.repository, &base.git_hash, &end_base.git_hash)
            .map_err(|e| ErrorMessage::new("CommitRangeError", e.to_string()))?;

        let mut range = Vec::with_capacity(commits.len() + 1);
        range.push(start.clone());
        range.extend(
            commits
                .into_iter()
                .map(|c| start.with_base_commit(Commit::new(&base.repository, c.git_hash))),
        );
        if range.len() < 2 {
            return Err(ErrorMessage::new(
                "InvalidCommitRange",
                format!("no commits between {start} and {end}"),
            ));
        }
        // Keep the end change exactly as requested, pinned commits included.
        if let Some(last) = range.last_mut() {
            *last = end.clone();
        }
        Ok(range)
    }

    fn prepare(&self, task: &Task, payload: &FindCulpritPayload) -> Vec<Action> {
        let mut next = payload.clone();
        match self.expand_range(&payload.input) {
            Ok(range) => {
                info!(task = %task.id, changes = range.len(), "expanded commit range");
                next.output.commit_range = range;
                vec![Action::update(
                    &task.id,
                    TaskState::Ongoing,
                    TaskPayload::FindCulprit(next),
                )]
            }
            Err(error) => {
                warn!(task = %task.id, reason = %error.reason, message = %error.message, "cannot expand commit range");
                vec![Action::fail(&task.id, TaskPayload::FindCulprit(next), error)]
            }
        }
    }

    fn refine(&self, task: &Task, payload: &FindCulpritPayload, context: &Context) -> Vec<Action> {
        let analysis = payload.input.analysis.normalized();
        let range = &payload.output.commit_range;
        if range.len() < 2 {
            return vec![Action::fail(
                &task.id,
                TaskPayload::FindCulprit(payload.clone()),
                ErrorMessage::new("InvalidCommitRange", "commit range was never expanded"),
            )];
        }

        let observed = tally_dependencies(task, range, context);
        let round = Round::new(range, &observed, &analysis, &payload.output.verdicts);

        let mut extensions: BTreeMap<usize, Range<u32>> = BTreeMap::new();
        for endpoint in [0, range.len() - 1] {
            if !observed.tallies.contains_key(&endpoint) {
                extensions.insert(endpoint, 0..analysis.min_attempts);
            }
        }

        let usable = round.sequence.len();
        if extensions.is_empty() && !observed.any_outstanding() && usable < 2 {
            return vec![self.bisection_failed(task, payload, &observed)];
        }

        let mut explored: BTreeSet<usize> = observed.tallies.keys().copied().collect();
        explored.extend(extensions.keys().copied());

        let mut verdicts = Vec::new();
        let mut culprits = Vec::new();
        for (a, b, verdict) in round.pairs() {
            match verdict {
                Verdict::Different => {
                    let added = exploration::speculate(a, b, &mut explored, self.speculation_levels);
                    if added.is_empty() {
                        culprits.push(CulpritRange {
                            from: range[a].clone(),
                            to: range[b].clone(),
                        });
                    } else {
                        debug!(task = %task.id, from = %range[a], to = %range[b], added = added.len(), "exploring between different changes");
                        for index in added {
                            extensions.entry(index).or_insert(0..analysis.min_attempts);
                        }
                    }
                }
                Verdict::Unknown => {
                    for index in [a, b] {
                        let tally = &observed.tallies[&index];
                        if let Some(more) = tally.growth(&analysis) {
                            extensions.entry(index).or_insert(more);
                        }
                    }
                }
                Verdict::Same | Verdict::Pending => {}
            }
            if verdict.is_resolved() {
                verdicts.push(PairVerdict {
                    from: range[a].clone(),
                    to: range[b].clone(),
                    verdict,
                });
            }
        }

        let mut next = payload.clone();
        next.output = FindCulpritOutput {
            commit_range: range.clone(),
            change_results: observed.change_results(range),
            verdicts,
            culprits,
        };

        if extensions.is_empty() && !observed.any_outstanding() {
            info!(task = %task.id, culprits = next.output.culprits.len(), "bisection finished");
            return vec![Action::update(
                &task.id,
                TaskState::Completed,
                TaskPayload::FindCulprit(next),
            )];
        }

        let mut actions = Vec::new();
        if next != *payload {
            actions.push(Action::update_payload(&task.id, TaskPayload::FindCulprit(next)));
        }
        if !extensions.is_empty() {
            let mut vertices: Vec<TaskVertex> = Vec::new();
            let mut edges: Vec<Dependency> = Vec::new();
            for (index, attempts) in extensions {
                let (v, e) = plan::change_subgraph(&task.id, &payload.input, &range[index], attempts);
                vertices.extend(v);
                edges.extend(e);
            }
            actions.push(Action::extend_graph(vertices, edges));
        }
        actions
    }

    fn bisection_failed(&self, task: &Task, payload: &FindCulpritPayload, observed: &Observed) -> Action {
        let all_failed = observed.tallies.values().all(|t| t.total > 0 && t.failed == t.total);
        let message = if all_failed {
            "All attempts in all dependencies failed."
        } else {
            "Fewer than two changes produced results to compare."
        };
        let mut next = payload.clone();
        next.errors.extend(observed.errors.iter().cloned());
        warn!(task = %task.id, dependency_errors = observed.errors.len(), "{message}");
        Action::fail(
            &task.id,
            TaskPayload::FindCulprit(next),
            ErrorMessage::new("BisectionFailed", message),
        )
    }
}

impl Evaluator for FindCulpritEvaluator {
    fn evaluate(&self, task: &Task, _event: &Event, context: &mut Context) -> Result<Vec<Action>> {
        let payload = task
            .payload
            .as_find_culprit()
            .ok_or_else(|| BisectError::evaluator(&task.id, "expected a find_culprit payload"))?;
        match task.state {
            TaskState::Pending => Ok(self.prepare(task, payload)),
            TaskState::Ongoing => Ok(self.refine(task, payload, context)),
            TaskState::Completed | TaskState::Failed => Ok(Vec::new()),
        }
    }
}

/// What the attempts of one change have produced so far.
#[derive(Debug, Default, Clone)]
struct Tally {
    total: u32,
    pending: u32,
    ongoing: u32,
    failed: u32,
    /// Completed attempts that produced at least one value.
    successful: u32,
    next_attempt: u32,
    samples: Vec<f64>,
}

impl Tally {
    fn outstanding(&self) -> bool {
        self.pending + self.ongoing > 0
    }

    /// Finished without any data: comparisons skip over it.
    fn unusable(&self) -> bool {
        !self.outstanding() && self.samples.is_empty()
    }

    /// Extra attempt indices to run for an inconclusive comparison.
    fn growth(&self, analysis: &AnalysisOptions) -> Option<Range<u32>> {
        let target = ((self.total as f64 * ATTEMPT_GROWTH).ceil() as u32).min(analysis.max_attempts);
        (target > self.total).then(|| self.next_attempt..self.next_attempt + (target - self.total))
    }
}

#[derive(Debug, Default)]
struct Observed {
    /// Keyed by index in the commit range.
    tallies: BTreeMap<usize, Tally>,
    /// Dependencies not (yet) visible in the context.
    unobserved: usize,
    errors: Vec<ErrorMessage>,
}

impl Observed {
    fn any_outstanding(&self) -> bool {
        self.unobserved > 0 || self.tallies.values().any(Tally::outstanding)
    }

    fn change_results(&self, range: &[Change]) -> Vec<ChangeResult> {
        self.tallies
            .iter()
            .map(|(&index, t)| ChangeResult {
                change: range[index].clone(),
                result_values: t.samples.clone(),
                attempts: t.total,
                failed_attempts: t.failed,
            })
            .collect()
    }
}

fn tally_dependencies(task: &Task, range: &[Change], context: &Context) -> Observed {
    let index: BTreeMap<&Change, usize> = range.iter().enumerate().map(|(i, c)| (c, i)).collect();
    let mut observed = Observed::default();

    for dep_id in &task.dependencies {
        let Some(view) = context.get(dep_id) else {
            observed.unobserved += 1;
            continue;
        };
        let Some(reader) = view.payload.as_read_value() else {
            continue;
        };
        let Some(&position) = index.get(&reader.input.change) else {
            debug!(task = %task.id, dependency = %dep_id, "dependency change is outside the commit range");
            continue;
        };

        let tally = observed.tallies.entry(position).or_default();
        tally.total += 1;
        tally.next_attempt = tally.next_attempt.max(reader.input.attempt + 1);
        match view.state {
            TaskState::Pending => tally.pending += 1,
            TaskState::Ongoing => tally.ongoing += 1,
            TaskState::Completed => {
                let values: Vec<f64> = reader
                    .output
                    .result_values
                    .iter()
                    .copied()
                    .filter(|v| v.is_finite())
                    .collect();
                if !values.is_empty() {
                    tally.successful += 1;
                    tally.samples.extend(values);
                }
            }
            TaskState::Failed => {
                tally.failed += 1;
                observed.errors.extend(reader.errors.iter().cloned());
            }
        }
    }

    observed
}

/// Comparison sequence for one evaluation: explored changes that can still
/// contribute data, in range order.
struct Round<'a> {
    range: &'a [Change],
    observed: &'a Observed,
    analysis: &'a AnalysisOptions,
    persisted: &'a [PairVerdict],
    sequence: Vec<usize>,
}

impl<'a> Round<'a> {
    fn new(
        range: &'a [Change],
        observed: &'a Observed,
        analysis: &'a AnalysisOptions,
        persisted: &'a [PairVerdict],
    ) -> Self {
        let sequence = observed
            .tallies
            .iter()
            .filter(|(_, t)| !t.unusable())
            .map(|(&i, _)| i)
            .collect();
        Self {
            range,
            observed,
            analysis,
            persisted,
            sequence,
        }
    }

    fn pairs(&self) -> Vec<(usize, usize, Verdict)> {
        self.sequence
            .windows(2)
            .map(|w| (w[0], w[1], self.verdict(w[0], w[1])))
            .collect()
    }

    fn verdict(&self, a: usize, b: usize) -> Verdict {
        let (from, to) = (&self.range[a], &self.range[b]);
        if let Some(previous) = self
            .persisted
            .iter()
            .find(|v| v.from == *from && v.to == *to && v.verdict.is_resolved())
        {
            return previous.verdict;
        }

        let (ta, tb) = (&self.observed.tallies[&a], &self.observed.tallies[&b]);
        if ta.outstanding() || tb.outstanding() {
            return Verdict::Pending;
        }

        let comparison = compare(&ta.samples, &tb.samples, self.analysis.comparison_magnitude);
        debug!(
            from = %from,
            to = %to,
            p_value = comparison.p_value,
            high_threshold = comparison.high_threshold,
            verdict = ?comparison.verdict,
            "compared changes"
        );
        match comparison.verdict {
            Verdict::Same
                if ta.successful < self.analysis.min_attempts
                    || tb.successful < self.analysis.min_attempts =>
            {
                Verdict::Unknown
            }
            verdict => verdict,
        }
    }
}
