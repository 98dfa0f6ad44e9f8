// src/config/mod.rs

//! Job configuration.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading a job file from disk.
//! - `validate.rs`: checks and conversion into a `JobConfig`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{JobConfig, RawJobConfig};
pub use validate::derive_job_id;
