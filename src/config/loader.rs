// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::model::JobFile;
use crate::config::validate::validate_job_file;

/// Load a job file from a given path and return the raw `JobFile`.
///
/// This only performs TOML deserialization; it does **not** perform
/// semantic validation (reference resolution, DAG correctness). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<JobFile> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading job file at {:?}", path))?;

    let file: JobFile =
        toml::from_str(&contents).with_context(|| format!("parsing TOML job from {:?}", path))?;

    Ok(file)
}

/// Load a job file from path and run basic validation.
///
/// This is the recommended entry point for the rest of the application:
/// reads TOML, applies defaults, and checks reference resolution and DAG
/// correctness before the graph builder ever sees the job.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<JobFile> {
    let file = load_from_path(&path)?;
    validate_job_file(&file)?;
    Ok(file)
}

/// Helper to resolve a default job file path.
pub fn default_job_path() -> PathBuf {
    PathBuf::from("Rowflow.toml")
}
