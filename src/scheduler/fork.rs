// src/scheduler/fork.rs

//! Fork point: schedule a batch of successor tasks when an observed task
//! finishes.

use std::sync::Mutex;

use tracing::{debug, error};

use crate::errors::TaskError;
use crate::scheduler::runner::TaskRunner;
use crate::scheduler::unit::{Task, TaskListener, TaskUnit};

/// Holds a batch of units and releases them all when the observed task
/// completes.
///
/// On failure of the observed task the batch is not scheduled; every
/// unit's listener is notified of the error instead, so downstream joins
/// and completion gates still count down.
pub struct ForkTaskListener {
    batch: Mutex<Option<Vec<TaskUnit>>>,
    runner: TaskRunner,
}

impl ForkTaskListener {
    pub fn new(batch: Vec<TaskUnit>, runner: TaskRunner) -> Self {
        Self {
            batch: Mutex::new(Some(batch)),
            runner,
        }
    }

    fn take_batch(&self) -> Option<Vec<TaskUnit>> {
        self.batch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl TaskListener for ForkTaskListener {
    fn on_begin(&self, _task: &dyn Task) {}

    fn on_complete(&self, task: &dyn Task) {
        let Some(batch) = self.take_batch() else {
            return;
        };
        debug!(task = %task.name(), successors = batch.len(), "forking successor tasks");
        for unit in batch {
            // Blocking submit; backpressure applies to fan-out too.
            if let Err(err) = self.runner.run_unit(unit) {
                error!(error = %err, "failed to schedule forked task");
            }
        }
    }

    fn on_error(&self, task: &dyn Task, error: &TaskError) {
        let Some(batch) = self.take_batch() else {
            return;
        };
        debug!(
            task = %task.name(),
            successors = batch.len(),
            "observed task failed; failing successors without executing them"
        );
        for unit in batch {
            unit.listener().on_error(unit.task().as_ref(), error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::scheduler::unit::{ClosureTask, NoopTask};

    struct Counter {
        completed: AtomicUsize,
        errored: AtomicUsize,
    }

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                completed: AtomicUsize::new(0),
                errored: AtomicUsize::new(0),
            })
        }
    }

    impl TaskListener for Counter {
        fn on_begin(&self, _task: &dyn Task) {}
        fn on_complete(&self, _task: &dyn Task) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, _task: &dyn Task, _error: &TaskError) {
            self.errored.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn batch(ran: &Arc<AtomicUsize>, listener: &Arc<Counter>, n: usize) -> Vec<TaskUnit> {
        (0..n)
            .map(|i| {
                let ran = Arc::clone(ran);
                TaskUnit::new(
                    Arc::new(ClosureTask::new(format!("succ{i}"), move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })),
                    listener.clone(),
                )
            })
            .collect()
    }

    #[test]
    fn completion_schedules_the_whole_batch() {
        let ran = Arc::new(AtomicUsize::new(0));
        let listener = Counter::new();
        let fork = ForkTaskListener::new(
            batch(&ran, &listener, 3),
            TaskRunner::single_threaded(),
        );

        fork.on_complete(&NoopTask::new("pred"));

        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(listener.completed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn error_fails_successors_without_running_them() {
        let ran = Arc::new(AtomicUsize::new(0));
        let listener = Counter::new();
        let fork = ForkTaskListener::new(
            batch(&ran, &listener, 3),
            TaskRunner::single_threaded(),
        );

        let err = TaskError::from(anyhow::anyhow!("pred failed"));
        fork.on_error(&NoopTask::new("pred"), &err);

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(listener.errored.load(Ordering::SeqCst), 3);
        assert_eq!(listener.completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn batch_is_released_at_most_once() {
        let ran = Arc::new(AtomicUsize::new(0));
        let listener = Counter::new();
        let fork = ForkTaskListener::new(
            batch(&ran, &listener, 2),
            TaskRunner::single_threaded(),
        );

        let t = NoopTask::new("pred");
        fork.on_complete(&t);
        fork.on_complete(&t);

        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }
}
