// src/config/validate.rs

use crate::bisect::BisectionOptions;
use crate::config::model::{JobConfig, RawJobConfig};
use crate::errors::{BisectError, Result};
use crate::graph::{
    AnalysisOptions, BuildOptions, Change, Commit, GraphJsonOptions, HistogramOptions,
    ReadOptions, TestOptions,
};
use crate::store::JobId;
use crate::types::ReadMode;

impl TryFrom<RawJobConfig> for JobConfig {
    type Error = BisectError;

    fn try_from(raw: RawJobConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let options = bisection_options(&raw);
        let job_id = match &raw.job.id {
            Some(id) => JobId::parse(id)?,
            None => derive_job_id(&options)?,
        };

        Ok(JobConfig {
            job_id,
            store_mode: raw.store.mode,
            store_dir: raw.store.dir,
            options,
        })
    }
}

fn validate_raw_config(cfg: &RawJobConfig) -> Result<()> {
    validate_job(cfg)?;
    validate_build(cfg)?;
    validate_read(cfg)?;
    validate_analysis(cfg)?;
    Ok(())
}

fn required(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BisectError::ConfigError(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_job(cfg: &RawJobConfig) -> Result<()> {
    required(&cfg.job.repository, "[job].repository")?;
    required(&cfg.job.start, "[job].start")?;
    required(&cfg.job.end, "[job].end")?;
    if cfg.job.start == cfg.job.end {
        return Err(BisectError::ConfigError(format!(
            "[job].start and [job].end must differ (both are '{}')",
            cfg.job.start
        )));
    }
    Ok(())
}

fn validate_build(cfg: &RawJobConfig) -> Result<()> {
    required(&cfg.build.builder, "[build].builder")?;
    required(&cfg.build.target, "[build].target")?;
    Ok(())
}

fn validate_read(cfg: &RawJobConfig) -> Result<()> {
    required(&cfg.read.results_filename, "[read].results_filename")?;
    if cfg.read.mode == ReadMode::GraphJson && cfg.read.chart.is_some() != cfg.read.trace.is_some() {
        return Err(BisectError::ConfigError(
            "[read].chart and [read].trace must be set together in graph_json mode".to_string(),
        ));
    }
    Ok(())
}

fn validate_analysis(cfg: &RawJobConfig) -> Result<()> {
    let analysis = &cfg.analysis;
    if let Some(magnitude) = analysis.comparison_magnitude {
        if !magnitude.is_finite() || magnitude < 0.0 {
            return Err(BisectError::ConfigError(format!(
                "[analysis].comparison_magnitude must be a non-negative number (got {magnitude})"
            )));
        }
    }
    if let (Some(min), Some(max)) = (analysis.min_attempts, analysis.max_attempts) {
        if min > 0 && max > 0 && max < min {
            return Err(BisectError::ConfigError(format!(
                "[analysis].max_attempts ({max}) must be >= min_attempts ({min})"
            )));
        }
    }
    Ok(())
}

fn bisection_options(raw: &RawJobConfig) -> BisectionOptions {
    let change = |hash: &str| Change::from_commit(Commit::new(&raw.job.repository, hash));

    BisectionOptions {
        start_change: change(&raw.job.start),
        end_change: change(&raw.job.end),
        analysis: AnalysisOptions {
            comparison_magnitude: raw.analysis.comparison_magnitude.unwrap_or(0.0),
            min_attempts: raw.analysis.min_attempts.unwrap_or(0),
            max_attempts: raw.analysis.max_attempts.unwrap_or(0),
        }
        .normalized(),
        build: BuildOptions {
            builder: raw.build.builder.clone(),
            target: raw.build.target.clone(),
            bucket: raw.build.bucket.clone(),
        },
        test: TestOptions {
            dimensions: raw.test.dimensions.clone(),
            extra_args: raw.test.extra_args.clone(),
            execution_timeout_secs: raw.test.execution_timeout_secs,
        },
        read: ReadOptions {
            benchmark: raw.read.benchmark.clone(),
            mode: raw.read.mode,
            results_filename: raw.read.results_filename.clone(),
            histogram: HistogramOptions {
                histogram_name: raw.read.histogram_name.clone(),
                grouping_label: raw.read.grouping_label.clone(),
                story: raw.read.story.clone(),
                statistic: raw.read.statistic,
            },
            graph_json: GraphJsonOptions {
                chart: raw.read.chart.clone(),
                trace: raw.read.trace.clone(),
            },
        },
    }
}

/// `job-<16 hex>` from a blake3 hash of the serialized options, so the same
/// job description always maps to the same job.
pub fn derive_job_id(options: &BisectionOptions) -> Result<JobId> {
    let encoded = serde_json::to_vec(options)?;
    let hash = blake3::hash(&encoded);
    JobId::parse(&format!("job-{}", &hash.to_hex()[..16]))
}
