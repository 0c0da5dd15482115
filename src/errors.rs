// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Most of the crate uses `anyhow` directly; this module adds the one piece
//! of error plumbing the scheduler needs: a task error that can be shared
//! between many listeners on many threads without cloning the underlying
//! error chain.

use std::fmt;
use std::sync::Arc;

pub use anyhow::{Error, Result};

/// A task execution error, shareable across listeners and threads.
///
/// The scheduler's join/fork listeners deliver the *same* captured error to
/// every downstream listener ("first error wins"), so the error is
/// reference-counted rather than cloned.
#[derive(Clone)]
pub struct TaskError(Arc<anyhow::Error>);

impl TaskError {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// The underlying error chain.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
