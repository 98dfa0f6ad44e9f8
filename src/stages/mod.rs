// src/stages/mod.rs

//! Worker-stage evaluators.
//!
//! Each stage owns one task type and talks to one external collaborator:
//!
//! - `find_isolate`: builds (`BuildBackend`)
//! - `run_test`: benchmark runs (`TestBackend`)
//! - `read_value`: result files (`ArtifactStore`), parsed by `histogram`
//!   or as graph JSON
//!
//! Stages record domain failures on the task and never abort evaluation
//! for them.

pub mod find_isolate;
pub mod histogram;
pub mod read_value;

pub use read_value::ReadValueError;
