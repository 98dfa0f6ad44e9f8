// src/logging.rs

//! Log output for the `perfbisect` binary.
//!
//! `--log-level` wins over `PERFBISECT_LOG`. The variable takes either a
//! bare level (`debug`, `warning`, ...) or full filter directives such as
//! `info,perfbisect::engine=trace`. Without either, only `info` and above
//! is shown. Everything goes to stderr so plans and status reports on
//! stdout stay machine-readable.

use anyhow::{Context, Result, anyhow};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "PERFBISECT_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();
    let directives = filter_directives(cli_level, env.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter '{directives}' (from {LOG_ENV_VAR})"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

/// Filter directives for the subscriber. A plain level is normalised to
/// lowercase; anything else from the environment is passed through as-is.
pub fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return level_name(cli_to_level(level));
    }
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_level_str(raw).map_or_else(|| raw.to_string(), level_name),
        None => DEFAULT_DIRECTIVES.to_string(),
    }
}

fn cli_to_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn level_name(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}

/// Case-insensitive level name, accepting `warning` for `warn`.
pub fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
