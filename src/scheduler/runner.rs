// src/scheduler/runner.rs

//! The task runner: inline execution or a bounded thread pool.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{bail, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, trace};

use crate::scheduler::unit::{Task, TaskListener, TaskUnit};

/// Default number of worker threads for the multi-threaded runner.
pub const DEFAULT_POOL_SIZE: usize = 30;

/// Default capacity of the pending-task queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Executes task units either inline or on a pool of worker threads.
///
/// Cloning is cheap; clones share the same pool. Submission to a full
/// pool queue blocks the submitter, which is the backpressure mechanism:
/// producers slow down to the pace of the workers.
#[derive(Clone)]
pub enum TaskRunner {
    /// Executes each unit on the calling thread, in submission order.
    SingleThreaded,
    /// Bounded queue drained by a fixed set of worker threads.
    MultiThreaded(Arc<Pool>),
}

pub struct Pool {
    sender: Mutex<Option<Sender<TaskUnit>>>,
    receiver: Receiver<TaskUnit>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRunner {
    pub fn single_threaded() -> Self {
        TaskRunner::SingleThreaded
    }

    /// Multi-threaded runner with default pool size and queue capacity.
    pub fn multi_threaded() -> Self {
        Self::multi_threaded_with(DEFAULT_POOL_SIZE, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn multi_threaded_with(pool_size: usize, queue_capacity: usize) -> Self {
        let pool_size = pool_size.max(1);
        let (sender, receiver) = bounded::<TaskUnit>(queue_capacity.max(1));
        let mut workers = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("rowflow-worker-{i}"))
                .spawn(move || worker_loop(receiver))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
        debug!(pool_size, queue_capacity, "started task runner pool");
        TaskRunner::MultiThreaded(Arc::new(Pool {
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(workers),
        }))
    }

    /// Pair `task` with `listener` and submit the unit.
    pub fn run(&self, task: Arc<dyn Task>, listener: Arc<dyn TaskListener>) -> Result<()> {
        self.run_unit(TaskUnit::new(task, listener))
    }

    /// Submit a unit for execution.
    ///
    /// Single-threaded: executes before returning. Multi-threaded: enqueues,
    /// blocking while the queue is full.
    pub fn run_unit(&self, unit: TaskUnit) -> Result<()> {
        match self {
            TaskRunner::SingleThreaded => {
                unit.execute();
                Ok(())
            }
            TaskRunner::MultiThreaded(pool) => {
                let sender = {
                    let guard = pool
                        .sender
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    match guard.as_ref() {
                        Some(sender) => sender.clone(),
                        None => bail!("task runner is shut down"),
                    }
                };
                // Blocks when the queue is at capacity.
                if sender.send(unit).is_err() {
                    bail!("task runner is shut down");
                }
                Ok(())
            }
        }
    }

    /// Steal one pending unit and execute it on the calling thread.
    ///
    /// Lets a thread that is waiting on other tasks make progress instead
    /// of idling (and avoids deadlock when the waiters occupy all workers).
    /// Returns `true` if a unit was executed.
    pub fn assist_execution(&self) -> bool {
        match self {
            TaskRunner::SingleThreaded => false,
            TaskRunner::MultiThreaded(pool) => match pool.receiver.try_recv() {
                Ok(unit) => {
                    trace!("assisting execution of a pending task");
                    unit.execute();
                    true
                }
                Err(_) => false,
            },
        }
    }

    /// Stop accepting work, drain the queue, and join the workers.
    ///
    /// Units already queued still run. Idempotent.
    pub fn shutdown(&self) {
        if let TaskRunner::MultiThreaded(pool) = self {
            let sender = pool
                .sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            drop(sender);
            let workers: Vec<JoinHandle<()>> = std::mem::take(
                &mut *pool
                    .workers
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            );
            for handle in workers {
                let _ = handle.join();
            }
            debug!("task runner shut down");
        }
    }
}

fn worker_loop(receiver: Receiver<TaskUnit>) {
    // Runs until every sender is dropped and the queue is drained.
    while let Ok(unit) = receiver.recv() {
        unit.execute();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::errors::TaskError;
    use crate::scheduler::unit::ClosureTask;

    struct CountingListener {
        completed: AtomicUsize,
        failed: AtomicUsize,
    }

    impl CountingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                completed: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            })
        }
    }

    impl TaskListener for CountingListener {
        fn on_begin(&self, _task: &dyn Task) {}

        fn on_complete(&self, _task: &dyn Task) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _task: &dyn Task, _error: &TaskError) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn single_threaded_runs_inline_in_order() {
        let runner = TaskRunner::single_threaded();
        let order = Arc::new(Mutex::new(Vec::new()));
        let listener = CountingListener::new();

        for i in 0..3 {
            let order = Arc::clone(&order);
            let task = ClosureTask::new(format!("t{i}"), move || {
                order.lock().unwrap().push(i);
                Ok(())
            });
            runner
                .run(Arc::new(task), listener.clone())
                .unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(listener.completed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn multi_threaded_runs_all_submitted_units() {
        let runner = TaskRunner::multi_threaded_with(4, 8);
        let listener = CountingListener::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..20 {
            let counter = Arc::clone(&counter);
            let task = ClosureTask::new(format!("t{i}"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            runner.run(Arc::new(task), listener.clone()).unwrap();
        }

        runner.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(listener.completed.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn failing_task_reports_error_not_completion() {
        let runner = TaskRunner::single_threaded();
        let listener = CountingListener::new();
        let task = ClosureTask::new("boom", || anyhow::bail!("exploded"));

        runner.run(Arc::new(task), listener.clone()).unwrap();

        assert_eq!(listener.completed.load(Ordering::SeqCst), 0);
        assert_eq!(listener.failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn submission_after_shutdown_is_rejected() {
        let runner = TaskRunner::multi_threaded_with(1, 1);
        runner.shutdown();
        let listener = CountingListener::new();
        let task = ClosureTask::new("late", || Ok(()));
        assert!(runner.run(Arc::new(task), listener).is_err());
    }
}
