// src/scheduler/join.rs

//! Join point: signal a nested listener after N observed tasks finish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::errors::TaskError;
use crate::scheduler::unit::{NoopTask, Task, TaskListener};

/// Counts down from N as observed tasks finish; when the last one does,
/// invokes the nested listener exactly once.
///
/// Errors win: if any observed task failed, the nested listener receives
/// `on_error` with the first captured error instead of `on_complete`, so
/// failure propagates through the rest of the listener chain. N = 0 is the
/// degenerate "nothing to wait for" case and fires immediately from the
/// constructor, against a synthetic zero-work task.
pub struct JoinTaskListener {
    remaining: AtomicUsize,
    first_error: Mutex<Option<TaskError>>,
    nested: Mutex<Option<Arc<dyn TaskListener>>>,
}

impl JoinTaskListener {
    pub fn new(count: usize, nested: Arc<dyn TaskListener>) -> Self {
        let listener = Self {
            remaining: AtomicUsize::new(count),
            first_error: Mutex::new(None),
            nested: Mutex::new(Some(nested)),
        };
        if count == 0 {
            listener.fire(&NoopTask::new("empty join"));
        }
        listener
    }

    fn lock_error(&self) -> std::sync::MutexGuard<'_, Option<TaskError>> {
        self.first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Notify the nested listener. Runs at most once per join.
    fn fire(&self, task: &dyn Task) {
        let nested = self
            .nested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(nested) = nested else {
            return;
        };
        let first_error = self.lock_error().clone();
        match first_error {
            Some(err) => {
                debug!(
                    task = %task.name(),
                    error = %err,
                    "join observed a failure; propagating error"
                );
                nested.on_error(task, &err);
            }
            None => nested.on_complete(task),
        }
    }

    fn count_down(&self, task: &dyn Task) {
        let previous = self.remaining.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            self.fire(task);
        }
    }
}

impl TaskListener for JoinTaskListener {
    fn on_begin(&self, _task: &dyn Task) {}

    fn on_complete(&self, task: &dyn Task) {
        self.count_down(task);
    }

    fn on_error(&self, task: &dyn Task, error: &TaskError) {
        let mut first = self.lock_error();
        if first.is_none() {
            *first = Some(error.clone());
        }
        drop(first);
        self.count_down(task);
    }
}
