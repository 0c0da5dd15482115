// src/config/model.rs

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::graph::PipelineJob;
use crate::scheduler::runner::{DEFAULT_POOL_SIZE, DEFAULT_QUEUE_CAPACITY};
use crate::scheduler::TaskRunner;
use crate::storage::in_memory::DEFAULT_STORED_ROWS_THRESHOLD;
use crate::storage::StorageProvider;

/// Top-level job file as read from TOML.
///
/// ```toml
/// [engine]
/// pool_size = 8
/// storage = "in-memory"
///
/// [job]
/// name = "customers"
///
/// [[job.components]]
/// id = "trim"
/// name = "Trim names"
/// kind = "transform"
/// inputs = [{ table = "people", column = "name" }]
/// outputs = ["name_trimmed"]
/// ```
///
/// The `[engine]` section is optional and has reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    /// Engine tuning from `[engine]`.
    #[serde(default)]
    pub engine: EngineSection,

    /// The declarative pipeline from `[job]`.
    pub job: PipelineJob,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Worker threads in the task runner pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Capacity of the pending-task queue; submission blocks when full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum rows stored per annotation (the count stays exact beyond it).
    #[serde(default = "default_stored_rows_threshold")]
    pub stored_rows_threshold: usize,

    /// `"in-memory"`, `"sql"` or `"combined"`.
    ///
    /// - `"in-memory"` (default): everything in process memory.
    /// - `"sql"`: collections and annotations in a SQLite database.
    /// - `"combined"`: collections in memory, annotations in SQLite.
    #[serde(default)]
    pub storage: StorageBackend,

    /// Database file for the `"sql"` and `"combined"` backends.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Run tasks inline on one thread instead of the pool. For debugging
    /// and deterministic runs.
    #[serde(default)]
    pub single_threaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    InMemory,
    Sql,
    Combined,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_capacity: default_queue_capacity(),
            stored_rows_threshold: default_stored_rows_threshold(),
            storage: StorageBackend::default(),
            database_path: None,
            single_threaded: false,
        }
    }
}

impl EngineSection {
    /// Build the task runner this section describes.
    pub fn task_runner(&self) -> TaskRunner {
        if self.single_threaded {
            TaskRunner::single_threaded()
        } else {
            TaskRunner::multi_threaded_with(self.pool_size, self.queue_capacity)
        }
    }

    /// Build the storage provider this section describes.
    pub fn storage_provider(&self) -> Result<StorageProvider> {
        match self.storage {
            StorageBackend::InMemory => {
                Ok(StorageProvider::in_memory_with_threshold(self.stored_rows_threshold))
            }
            StorageBackend::Sql => {
                let Some(path) = &self.database_path else {
                    bail!("[engine].storage = \"sql\" requires [engine].database_path");
                };
                StorageProvider::sql_database(path)
            }
            StorageBackend::Combined => {
                let Some(path) = &self.database_path else {
                    bail!("[engine].storage = \"combined\" requires [engine].database_path");
                };
                Ok(StorageProvider::combined(
                    StorageProvider::in_memory_with_threshold(self.stored_rows_threshold),
                    StorageProvider::sql_database(path)?,
                ))
            }
        }
    }
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_stored_rows_threshold() -> usize {
    DEFAULT_STORED_ROWS_THRESHOLD
}
