// src/scheduler/unit.rs

//! The task contract and the unit of scheduling.

use std::sync::Arc;

use tracing::{debug, error};

use crate::errors::{Result, TaskError};

/// A small, named piece of work.
///
/// Tasks report failure through their `Result`; they must not panic for
/// expected error conditions.
pub trait Task: Send + Sync {
    fn name(&self) -> &str;
    fn execute(&self) -> Result<()>;
}

/// Observer of one task's lifecycle.
///
/// `on_begin` fires before execution on the executing thread; exactly one
/// of `on_complete`/`on_error` fires after. Listeners drive scheduling, so
/// implementations must be thread-safe and must not block indefinitely.
pub trait TaskListener: Send + Sync {
    fn on_begin(&self, task: &dyn Task);
    fn on_complete(&self, task: &dyn Task);
    fn on_error(&self, task: &dyn Task, error: &TaskError);
}

/// A task paired with the listener that observes it.
///
/// This is what actually moves through the runner's queue.
#[derive(Clone)]
pub struct TaskUnit {
    task: Arc<dyn Task>,
    listener: Arc<dyn TaskListener>,
}

impl TaskUnit {
    pub fn new(task: Arc<dyn Task>, listener: Arc<dyn TaskListener>) -> Self {
        Self { task, listener }
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    pub fn listener(&self) -> &Arc<dyn TaskListener> {
        &self.listener
    }

    /// Run the task on the current thread, driving the listener protocol.
    pub fn execute(&self) {
        let task = self.task.as_ref();
        self.listener.on_begin(task);
        match task.execute() {
            Ok(()) => {
                debug!(task = %task.name(), "task completed");
                self.listener.on_complete(task);
            }
            Err(err) => {
                error!(task = %task.name(), error = %err, "task failed");
                let err = TaskError::from(err);
                self.listener.on_error(task, &err);
            }
        }
    }
}

/// A task that does nothing. Used where the listener protocol needs a task
/// to hang off but there is no real work, e.g. firing a join that guards
/// zero predecessors.
pub struct NoopTask {
    name: String,
}

impl NoopTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Task for NoopTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        Ok(())
    }
}

/// Adapter turning a closure into a [`Task`].
pub struct ClosureTask {
    name: String,
    body: Box<dyn Fn() -> Result<()> + Send + Sync>,
}

impl ClosureTask {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl Task for ClosureTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        (self.body)()
    }
}
