// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{JobConfig, RawJobConfig};
use crate::errors::Result;

/// Read and deserialize a job file without semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawJobConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawJobConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a job file and validate it.
///
/// - Reads TOML.
/// - Applies defaults (`serde` defaults, then analysis normalization).
/// - Checks required fields and attempt bounds.
/// - Derives the job id when none is given.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<JobConfig> {
    let raw_config = load_from_path(&path)?;
    let config = JobConfig::try_from(raw_config)?;
    Ok(config)
}

/// `Perfbisect.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Perfbisect.toml")
}
