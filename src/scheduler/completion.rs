// src/scheduler/completion.rs

//! The job completion gate: lets the submitting thread wait for a whole
//! job while workers run it.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::TaskError;
use crate::scheduler::latch::CountdownLatch;
use crate::scheduler::unit::{Task, TaskListener};

type SuccessCallback = Box<dyn FnOnce() + Send>;
type FailureCallback = Box<dyn FnOnce(&TaskError) + Send>;

/// Listener attached to a job's final tasks.
///
/// Opens its latch once every expected task has reported (completed or
/// failed), so waiters never hang on a failed job. The success callback
/// fires only if no task failed; the failure callback fires once, with the
/// first error.
pub struct JobCompletionTaskListener {
    latch: CountdownLatch,
    errors: Mutex<Vec<TaskError>>,
    on_success: Mutex<Option<SuccessCallback>>,
    on_failure: Mutex<Option<FailureCallback>>,
}

impl JobCompletionTaskListener {
    pub fn new(expected_tasks: usize) -> Self {
        Self::with_callbacks(expected_tasks, None, None)
    }

    pub fn with_callbacks(
        expected_tasks: usize,
        on_success: Option<SuccessCallback>,
        on_failure: Option<FailureCallback>,
    ) -> Self {
        Self {
            latch: CountdownLatch::new(expected_tasks),
            errors: Mutex::new(Vec::new()),
            on_success: Mutex::new(on_success),
            on_failure: Mutex::new(on_failure),
        }
    }

    fn lock_errors(&self) -> std::sync::MutexGuard<'_, Vec<TaskError>> {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block until every expected task has reported.
    pub fn await_done(&self) {
        self.latch.wait();
    }

    /// Block up to `timeout`; returns `true` if the job finished in time.
    pub fn await_timeout(&self, timeout: Duration) -> bool {
        self.latch.wait_timeout(timeout)
    }

    pub fn is_done(&self) -> bool {
        self.latch.is_done()
    }

    /// `true` once the job finished with no failed tasks.
    pub fn is_success(&self) -> bool {
        self.is_done() && self.lock_errors().is_empty()
    }

    /// Errors reported so far, in arrival order.
    pub fn errors(&self) -> Vec<TaskError> {
        self.lock_errors().clone()
    }

    fn maybe_fire_success(&self) {
        if !self.latch.is_done() || !self.lock_errors().is_empty() {
            return;
        }
        let callback = self
            .on_success
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(callback) = callback {
            debug!("job finished successfully");
            callback();
        }
    }
}

impl TaskListener for JobCompletionTaskListener {
    fn on_begin(&self, _task: &dyn Task) {}

    fn on_complete(&self, _task: &dyn Task) {
        self.latch.count_down();
        self.maybe_fire_success();
    }

    fn on_error(&self, task: &dyn Task, error: &TaskError) {
        warn!(task = %task.name(), error = %error, "job task failed");
        self.lock_errors().push(error.clone());
        let callback = self
            .on_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(callback) = callback {
            callback(error);
        }
        // Still counts toward completion so waiters are released.
        self.latch.count_down();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::scheduler::unit::NoopTask;

    #[test]
    fn opens_after_all_tasks_complete() {
        let gate = JobCompletionTaskListener::new(2);
        let t = NoopTask::new("final");

        gate.on_complete(&t);
        assert!(!gate.is_done());
        gate.on_complete(&t);

        assert!(gate.is_done());
        assert!(gate.is_success());
    }

    #[test]
    fn failed_tasks_still_release_waiters() {
        let gate = JobCompletionTaskListener::new(2);
        let t = NoopTask::new("final");
        let err = TaskError::from(anyhow::anyhow!("boom"));

        gate.on_error(&t, &err);
        gate.on_complete(&t);

        assert!(gate.is_done());
        assert!(!gate.is_success());
        assert_eq!(gate.errors().len(), 1);
        assert!(gate.await_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn callbacks_fire_exactly_once() {
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        let gate = {
            let successes = Arc::clone(&successes);
            let failures = Arc::clone(&failures);
            JobCompletionTaskListener::with_callbacks(
                2,
                Some(Box::new(move || {
                    successes.fetch_add(1, Ordering::SeqCst);
                })),
                Some(Box::new(move |_err| {
                    failures.fetch_add(1, Ordering::SeqCst);
                })),
            )
        };

        let t = NoopTask::new("final");
        gate.on_complete(&t);
        gate.on_complete(&t);

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn first_error_wins_for_failure_callback() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let gate = {
            let failures = Arc::clone(&failures);
            JobCompletionTaskListener::with_callbacks(
                2,
                None,
                Some(Box::new(move |err: &TaskError| {
                    failures.lock().unwrap().push(err.to_string());
                })),
            )
        };

        let t = NoopTask::new("final");
        gate.on_error(&t, &TaskError::from(anyhow::anyhow!("first")));
        gate.on_error(&t, &TaskError::from(anyhow::anyhow!("second")));

        let seen = failures.lock().unwrap();
        assert_eq!(seen.as_slice(), &["first".to_string()]);
        assert_eq!(gate.errors().len(), 2);
    }
}
