// src/lib.rs

pub mod bisect;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod services;
pub mod stages;
pub mod store;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info};

use crate::bisect::{FIND_CULPRIT_TASK_ID, create_graph};
use crate::cli::{CliArgs, Command};
use crate::config::{JobConfig, default_config_path, load_and_validate};
use crate::engine::{Context, Event, EventType, Selector, TaskGraphLoader, evaluate_graph};
use crate::graph::{TaskGraph, TaskState, TaskType};
use crate::store::{FileTaskStore, JobId, TaskStore};

/// High-level entry point used by `main.rs`.
///
/// - `plan`: load + validate a job file, print the initial graph
/// - `create`: populate the task store with that graph
/// - `status`: run a read-only `select` over a stored job
/// - `reopen`: force a stored task back to pending
pub fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Plan { config } => {
            let cfg = load_and_validate(&config)?;
            let graph = create_graph(&cfg.options)?;
            print_plan(&cfg, &graph);
        }
        Command::Create { config } => {
            let cfg = load_and_validate(&config)?;
            let dir = args.store_dir.unwrap_or_else(|| cfg.store_dir.clone());
            let store = store::open(cfg.store_mode, &dir)?;
            let graph = create_graph(&cfg.options)?;
            let tasks = graph.len();
            store.populate(&cfg.job_id, graph)?;
            info!(job = %cfg.job_id, tasks, store = %dir.display(), "created job");
            println!("{}", cfg.job_id);
        }
        Command::Status { job, task_type } => {
            let store = FileTaskStore::open(store_dir(args.store_dir))?;
            let loader = TaskGraphLoader::new(&store, JobId::parse(&job)?);
            let selector = match task_type {
                Some(t) => Selector::for_task_type(t),
                None => Selector::for_event_type(EventType::Select),
            };
            let context = evaluate_graph(&Event::select(), &selector, &loader)?;
            print_status(loader.job(), &context);
        }
        Command::Reopen { job, task } => {
            let store = FileTaskStore::open(store_dir(args.store_dir))?;
            let reopened = store.reopen(&JobId::parse(&job)?, &task)?;
            info!(job = %job, task = %reopened.id, "reopened task");
            println!("{} -> {}", reopened.id, reopened.state);
        }
    }
    Ok(())
}

/// `--store-dir`, or the default store directory next to the default job file.
fn store_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| {
        let config = default_config_path();
        match load_and_validate(&config) {
            Ok(cfg) => cfg.store_dir,
            Err(e) => {
                debug!(config = %config.display(), error = %e, "no usable default job file, using .perfbisect");
                PathBuf::from(".perfbisect")
            }
        }
    })
}

fn print_plan(cfg: &JobConfig, graph: &TaskGraph) {
    let options = &cfg.options;
    println!("perfbisect plan");
    println!("  job = {}", cfg.job_id);
    println!("  store = {:?} ({})", cfg.store_mode, cfg.store_dir.display());
    println!("  range = {} .. {}", options.start_change, options.end_change);
    println!(
        "  analysis = magnitude {}, attempts {}..={}",
        options.analysis.comparison_magnitude,
        options.analysis.min_attempts,
        options.analysis.max_attempts
    );
    println!();

    println!("tasks ({}):", graph.len());
    for task_type in [
        TaskType::FindCulprit,
        TaskType::FindIsolate,
        TaskType::RunTest,
        TaskType::ReadValue,
    ] {
        for task in graph.tasks_of_type(task_type) {
            println!("  - {} [{}]", task.id, task_type);
            if !task.dependencies.is_empty() && task_type != TaskType::FindCulprit {
                println!("      after: {:?}", task.dependencies);
            }
        }
    }
    println!("edges: {}", graph.edges().len());
}

fn print_status(job: &JobId, context: &Context) {
    println!("job {job}");
    for (id, view) in context {
        let errors = view.payload.errors();
        if errors.is_empty() {
            println!("  {id}: {}", view.state);
        } else {
            let reasons: Vec<&str> = errors.iter().map(|e| e.reason.as_str()).collect();
            println!("  {id}: {} ({})", view.state, reasons.join(", "));
        }
    }

    let Some(finder) = context
        .get(FIND_CULPRIT_TASK_ID)
        .and_then(|v| v.payload.as_find_culprit().map(|p| (v.state, p)))
    else {
        return;
    };
    let (state, payload) = finder;
    println!();
    match state {
        TaskState::Completed if payload.output.culprits.is_empty() => {
            println!("no culprit found");
        }
        TaskState::Completed => {
            println!("culprits:");
            for culprit in &payload.output.culprits {
                println!("  {} -> {}", culprit.from, culprit.to);
            }
        }
        other => println!("bisection {other}"),
    }
}
