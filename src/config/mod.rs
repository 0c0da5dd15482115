// src/config/mod.rs

//! Configuration loading and validation for rowflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a job file from disk (`loader.rs`).
//! - Validate references and DAG correctness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_job_path, load_and_validate, load_from_path};
pub use model::{EngineSection, JobFile, StorageBackend};
pub use validate::validate_job_file;
