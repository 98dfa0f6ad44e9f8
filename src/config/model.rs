// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::bisect::BisectionOptions;
use crate::graph::Dimension;
use crate::store::JobId;
use crate::types::{ReadMode, Statistic, StoreMode};

/// Job description as read from a TOML file.
///
/// ```toml
/// [job]
/// repository = "chromium"
/// start = "aaa111"
/// end = "fff999"
///
/// [build]
/// builder = "linux-builder-perf"
/// target = "performance_test_suite"
/// bucket = "try"
///
/// [test]
/// dimensions = [{ key = "os", value = "Ubuntu" }]
///
/// [read]
/// benchmark = "speedometer2"
/// histogram_name = "RunsPerMinute"
///
/// [analysis]
/// comparison_magnitude = 1.0
/// ```
///
/// Only `[job]`, `[build]` and `[read]` are required.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawJobConfig {
    pub job: JobSection,

    #[serde(default)]
    pub store: StoreSection,

    pub build: BuildSection,

    #[serde(default)]
    pub test: TestSection,

    pub read: ReadSection,

    #[serde(default)]
    pub analysis: AnalysisSection,
}

/// `[job]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSection {
    /// Explicit job id; derived from the options when omitted.
    #[serde(default)]
    pub id: Option<String>,

    pub repository: String,

    /// Last known good commit.
    pub start: String,

    /// First known bad commit.
    pub end: String,
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default)]
    pub mode: StoreMode,

    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".perfbisect")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            mode: StoreMode::default(),
            dir: default_store_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    pub builder: String,
    pub target: String,
    #[serde(default)]
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSection {
    #[serde(default)]
    pub dimensions: Vec<Dimension>,

    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
}

fn default_execution_timeout_secs() -> u64 {
    2700
}

impl Default for TestSection {
    fn default() -> Self {
        Self {
            dimensions: Vec::new(),
            extra_args: Vec::new(),
            execution_timeout_secs: default_execution_timeout_secs(),
        }
    }
}

/// `[read]` section. Histogram fields apply to `histogram_sets`, chart and
/// trace to `graph_json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadSection {
    pub benchmark: String,

    #[serde(default)]
    pub mode: ReadMode,

    #[serde(default = "default_results_filename")]
    pub results_filename: String,

    #[serde(default)]
    pub histogram_name: Option<String>,
    #[serde(default)]
    pub grouping_label: Option<String>,
    #[serde(default)]
    pub story: Option<String>,
    #[serde(default)]
    pub statistic: Option<Statistic>,

    #[serde(default)]
    pub chart: Option<String>,
    #[serde(default)]
    pub trace: Option<String>,
}

fn default_results_filename() -> String {
    "perf_results.json".to_string()
}

/// `[analysis]` section. Zero means "use the default".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AnalysisSection {
    #[serde(default)]
    pub comparison_magnitude: Option<f64>,

    #[serde(default)]
    pub min_attempts: Option<u32>,

    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Validated job configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub job_id: JobId,
    pub store_mode: StoreMode,
    pub store_dir: PathBuf,
    pub options: BisectionOptions,
}
