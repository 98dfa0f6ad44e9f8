// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::graph::TaskType;

/// Command-line arguments for `perfbisect`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "perfbisect",
    version,
    about = "Plan and inspect performance-regression bisection jobs.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PERFBISECT_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Directory of the file-backed task store.
    ///
    /// Overrides `[store].dir` from the job file.
    #[arg(long, global = true, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validate a job file and print the initial task graph.
    Plan {
        /// Path to the job file (TOML).
        #[arg(long, value_name = "PATH", default_value = "Perfbisect.toml")]
        config: PathBuf,
    },

    /// Populate the store with a new job and print its id.
    Create {
        #[arg(long, value_name = "PATH", default_value = "Perfbisect.toml")]
        config: PathBuf,
    },

    /// Print task states and culprits of a job.
    Status {
        #[arg(long, value_name = "JOB")]
        job: String,

        /// Only list tasks of this type.
        #[arg(long, value_parser = parse_task_type, value_name = "TYPE")]
        task_type: Option<TaskType>,
    },

    /// Force a task back to pending.
    Reopen {
        #[arg(long, value_name = "JOB")]
        job: String,

        #[arg(long, value_name = "TASK")]
        task: String,
    },
}

fn parse_task_type(raw: &str) -> Result<TaskType, String> {
    raw.parse()
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
