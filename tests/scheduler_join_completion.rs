use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rowflow::errors::TaskError;
use rowflow::scheduler::{
    ClosureTask, CompositeTaskListener, JobCompletionTaskListener, JoinTaskListener, NoopTask,
    Task, TaskListener, TaskRunner,
};

type TestResult = Result<(), Box<dyn Error>>;

struct Outcome {
    completions: AtomicUsize,
    errors: AtomicUsize,
}

impl Outcome {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            completions: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }
}

impl TaskListener for Outcome {
    fn on_begin(&self, _task: &dyn Task) {}
    fn on_complete(&self, _task: &dyn Task) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
    fn on_error(&self, _task: &dyn Task, _error: &TaskError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn join_fires_exactly_once_for_various_counts() -> TestResult {
    for k in 0..5usize {
        let outcome = Outcome::new();
        let join = JoinTaskListener::new(k, outcome.clone());
        let task = NoopTask::new("pred");
        for _ in 0..k {
            join.on_complete(&task);
        }
        assert_eq!(outcome.completions.load(Ordering::SeqCst), 1, "k = {k}");
        assert_eq!(outcome.errors.load(Ordering::SeqCst), 0, "k = {k}");
    }
    Ok(())
}

#[test]
fn join_with_any_error_delivers_error_once() -> TestResult {
    let outcome = Outcome::new();
    let join = JoinTaskListener::new(3, outcome.clone());
    let task = NoopTask::new("pred");

    join.on_complete(&task);
    join.on_error(&task, &TaskError::from(anyhow::anyhow!("first")));
    join.on_error(&task, &TaskError::from(anyhow::anyhow!("second")));

    assert_eq!(outcome.completions.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.errors.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn completion_gate_releases_waiters_on_success_and_failure() -> TestResult {
    let runner = TaskRunner::multi_threaded_with(4, 16);

    // All tasks succeed.
    let gate = Arc::new(JobCompletionTaskListener::new(10));
    for i in 0..10 {
        runner.run(
            Arc::new(ClosureTask::new(format!("ok{i}"), || Ok(()))),
            gate.clone(),
        )?;
    }
    assert!(gate.await_timeout(Duration::from_secs(5)));
    assert!(gate.is_success());

    // Half the tasks fail; the gate must still open.
    let gate = Arc::new(JobCompletionTaskListener::new(10));
    for i in 0..10 {
        let fail = i % 2 == 0;
        runner.run(
            Arc::new(ClosureTask::new(format!("mixed{i}"), move || {
                if fail {
                    anyhow::bail!("task {i} failed");
                }
                Ok(())
            })),
            gate.clone(),
        )?;
    }
    assert!(gate.await_timeout(Duration::from_secs(5)));
    assert!(!gate.is_success());
    assert_eq!(gate.errors().len(), 5);

    runner.shutdown();
    Ok(())
}

#[test]
fn composite_lets_join_and_gate_observe_the_same_task() -> TestResult {
    let runner = TaskRunner::single_threaded();
    let join_outcome = Outcome::new();
    let join = Arc::new(JoinTaskListener::new(2, join_outcome.clone()));
    let gate = Arc::new(JobCompletionTaskListener::new(2));
    let composite = Arc::new(CompositeTaskListener::new(vec![
        join.clone() as Arc<dyn TaskListener>,
        gate.clone() as Arc<dyn TaskListener>,
    ]));

    for i in 0..2 {
        runner.run(
            Arc::new(ClosureTask::new(format!("t{i}"), || Ok(()))),
            composite.clone(),
        )?;
    }

    assert_eq!(join_outcome.completions.load(Ordering::SeqCst), 1);
    assert!(gate.is_done());
    assert!(gate.is_success());
    Ok(())
}

#[test]
fn assist_execution_drains_pending_work() -> TestResult {
    // One worker, tiny queue: the submitter must be able to pitch in.
    let runner = TaskRunner::multi_threaded_with(1, 2);
    let counter = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(JobCompletionTaskListener::new(8));

    for i in 0..8 {
        let counter = Arc::clone(&counter);
        runner.run(
            Arc::new(ClosureTask::new(format!("t{i}"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            gate.clone(),
        )?;
    }

    while !gate.is_done() {
        if !runner.assist_execution() {
            gate.await_timeout(Duration::from_millis(5));
        }
    }

    assert_eq!(counter.load(Ordering::SeqCst), 8);
    runner.shutdown();
    Ok(())
}
