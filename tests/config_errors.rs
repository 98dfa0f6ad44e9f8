// tests/config_errors.rs

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use perfbisect::config::{derive_job_id, load_and_validate, load_from_path};
use perfbisect::errors::BisectError;
use perfbisect::graph::{Change, Commit, Dimension};
use perfbisect::types::{ReadMode, Statistic, StoreMode};
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

const MINIMAL: &str = r#"
[job]
repository = "chromium"
start = "aaa111"
end = "fff999"

[build]
builder = "linux-builder-perf"
target = "performance_test_suite"

[read]
benchmark = "speedometer2"
histogram_name = "RunsPerMinute"
"#;

fn job_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str, needle: &str) {
    let file = job_file(contents);
    match load_and_validate(file.path()) {
        Err(BisectError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} should mention {needle:?}");
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn minimal_job_file_gets_defaults() -> TestResult {
    let file = job_file(MINIMAL);
    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.store_mode, StoreMode::File);
    assert_eq!(cfg.store_dir, PathBuf::from(".perfbisect"));
    assert!(cfg.job_id.as_str().starts_with("job-"));

    let options = &cfg.options;
    assert_eq!(
        options.start_change,
        Change::from_commit(Commit::new("chromium", "aaa111"))
    );
    assert_eq!(options.end_change.id_string(), "chromium@fff999");
    assert_eq!(options.analysis.comparison_magnitude, 1.0);
    assert_eq!(options.analysis.min_attempts, 10);
    assert_eq!(options.analysis.max_attempts, 100);
    assert_eq!(options.test.execution_timeout_secs, 2700);
    assert_eq!(options.read.mode, ReadMode::HistogramSets);
    assert_eq!(options.read.results_filename, "perf_results.json");
    assert_eq!(options.read.histogram.histogram_name.as_deref(), Some("RunsPerMinute"));
    Ok(())
}

#[test]
fn full_job_file_is_read() -> TestResult {
    let file = job_file(
        r#"
[job]
id = "speedometer-regression"
repository = "chromium"
start = "aaa111"
end = "fff999"

[store]
mode = "memory"
dir = "/tmp/bisect-store"

[build]
builder = "win-builder-perf"
target = "performance_test_suite"
bucket = "try"

[test]
dimensions = [{ key = "os", value = "Windows-10" }]
extra_args = ["--pageset-repeat=1"]
execution_timeout_secs = 600

[read]
benchmark = "speedometer2"
histogram_name = "RunsPerMinute"
grouping_label = "desktop"
story = "Speedometer2"
statistic = "avg"

[analysis]
comparison_magnitude = 2.5
min_attempts = 4
max_attempts = 8
"#,
    );
    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.job_id.as_str(), "speedometer-regression");
    assert_eq!(cfg.store_mode, StoreMode::Memory);
    assert_eq!(cfg.store_dir, PathBuf::from("/tmp/bisect-store"));
    assert_eq!(cfg.options.build.bucket, "try");
    assert_eq!(
        cfg.options.test.dimensions,
        vec![Dimension {
            key: "os".to_string(),
            value: "Windows-10".to_string()
        }]
    );
    assert_eq!(cfg.options.test.extra_args, vec!["--pageset-repeat=1"]);
    assert_eq!(cfg.options.read.histogram.statistic, Some(Statistic::Avg));
    assert_eq!(cfg.options.analysis.comparison_magnitude, 2.5);
    assert_eq!(
        (cfg.options.analysis.min_attempts, cfg.options.analysis.max_attempts),
        (4, 8)
    );
    Ok(())
}

#[test]
fn invalid_toml_is_a_toml_error() {
    let file = job_file("[job\nrepository = ");
    match load_and_validate(file.path()) {
        Err(BisectError::TomlError(_)) => {}
        other => panic!("Expected TomlError, got: {other:?}"),
    }
}

#[test]
fn unknown_fields_are_rejected() {
    let file = job_file(&format!("{MINIMAL}\n[analysis]\nconfidence = 0.99\n"));
    assert!(matches!(load_from_path(file.path()), Err(BisectError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let result = load_and_validate("/definitely/not/here/Perfbisect.toml");
    assert!(matches!(result, Err(BisectError::IoError(_))), "got {result:?}");
}

#[test]
fn identical_start_and_end_are_rejected() {
    expect_config_error(&MINIMAL.replace("fff999", "aaa111"), "must differ");
}

#[test]
fn empty_required_fields_are_rejected() {
    expect_config_error(&MINIMAL.replace("\"chromium\"", "\"  \""), "[job].repository");
    expect_config_error(&MINIMAL.replace("\"linux-builder-perf\"", "\"\""), "[build].builder");
}

#[test]
fn max_attempts_below_min_attempts_is_rejected() {
    expect_config_error(
        &format!("{MINIMAL}\n[analysis]\nmin_attempts = 20\nmax_attempts = 10\n"),
        "max_attempts",
    );
}

#[test]
fn negative_magnitude_is_rejected() {
    expect_config_error(
        &format!("{MINIMAL}\n[analysis]\ncomparison_magnitude = -1.0\n"),
        "comparison_magnitude",
    );
}

#[test]
fn graph_json_needs_chart_and_trace_together() {
    let contents = MINIMAL.replace(
        "histogram_name = \"RunsPerMinute\"",
        "mode = \"graph_json\"\nchart = \"warm_times\"",
    );
    expect_config_error(&contents, "[read].chart and [read].trace");
}

#[test]
fn invalid_explicit_job_id_is_rejected() {
    let contents = MINIMAL.replace("[job]\n", "[job]\nid = \"../escape\"\n");
    expect_config_error(&contents, "invalid job id");
}

#[test]
fn derived_job_id_is_stable_and_option_sensitive() -> TestResult {
    let a = load_and_validate(job_file(MINIMAL).path())?;
    let b = load_and_validate(job_file(MINIMAL).path())?;
    assert_eq!(a.job_id, b.job_id);
    assert_eq!(derive_job_id(&a.options)?, a.job_id);
    assert_eq!(a.job_id.as_str().len(), "job-".len() + 16);

    let other = load_and_validate(job_file(&MINIMAL.replace("fff999", "eee888")).path())?;
    assert_ne!(a.job_id, other.job_id);
    Ok(())
}
