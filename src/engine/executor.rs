// src/engine/executor.rs

//! Drives one job: derives the dependency levels, wires fork/join
//! listeners between them, submits the first wave and waits on the
//! completion gate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::errors::TaskError;
use crate::graph::{Component, JobGraph, PipelineJob};
use crate::scheduler::{
    ForkTaskListener, JobCompletionTaskListener, JoinTaskListener, Task, TaskListener, TaskRunner,
    TaskUnit,
};
use crate::storage::{RowAnnotationFactory, StorageProvider};

/// Per-job context handed to every piece of component work.
///
/// Explicit rather than thread-local so tasks stay testable and worker
/// threads carry no state across jobs.
#[derive(Clone)]
pub struct JobContext {
    annotations: Arc<dyn RowAnnotationFactory>,
}

impl JobContext {
    pub fn annotations(&self) -> &Arc<dyn RowAnnotationFactory> {
        &self.annotations
    }
}

/// Outcome of one job run.
///
/// Even on failure the context remains readable, so annotations populated
/// before the failure are still available to result consumers.
pub struct JobResult {
    success: bool,
    errors: Vec<TaskError>,
    context: JobContext,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn errors(&self) -> &[TaskError] {
        &self.errors
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }
}

/// Executes jobs against one runner and one storage provider.
pub struct JobExecutor {
    runner: TaskRunner,
    storage: Arc<StorageProvider>,
}

impl JobExecutor {
    pub fn new(runner: TaskRunner, storage: Arc<StorageProvider>) -> Self {
        Self { runner, storage }
    }

    /// Run `job` to completion, creating one task per component via `work`.
    ///
    /// Components in the same dependency level run in parallel; a level is
    /// forked only after every task of the previous level finished. An
    /// error anywhere suppresses downstream work but still releases the
    /// completion gate.
    pub fn execute<F>(&self, job: &PipelineJob, work: F) -> Result<JobResult>
    where
        F: Fn(&Component, &JobContext) -> Arc<dyn Task>,
    {
        let completion = self.submit(job, work)?;
        self.wait(&completion.gate);
        Ok(JobResult {
            success: completion.gate.is_success(),
            errors: completion.gate.errors(),
            context: completion.context,
        })
    }

    /// Like [`execute`](Self::execute) but gives up after `timeout`.
    /// Returns `None` if the job did not finish in time; in-flight tasks
    /// keep running on the pool.
    pub fn execute_with_timeout<F>(
        &self,
        job: &PipelineJob,
        work: F,
        timeout: Duration,
    ) -> Result<Option<JobResult>>
    where
        F: Fn(&Component, &JobContext) -> Arc<dyn Task>,
    {
        let completion = self.submit(job, work)?;
        if !completion.gate.await_timeout(timeout) {
            return Ok(None);
        }
        Ok(Some(JobResult {
            success: completion.gate.is_success(),
            errors: completion.gate.errors(),
            context: completion.context,
        }))
    }

    fn submit<F>(&self, job: &PipelineJob, work: F) -> Result<SubmittedJob>
    where
        F: Fn(&Component, &JobContext) -> Arc<dyn Task>,
    {
        let mut graph = JobGraph::build(job)?;
        graph.prune_shortcut_edges();
        let levels = graph.execution_levels()?;
        info!(job = %job.name, levels = levels.len(), "submitting job");

        let context = JobContext {
            annotations: self.storage.create_row_annotation_factory()?,
        };

        let final_tasks = levels.last().map_or(0, |level| level.len());
        let gate = Arc::new(JobCompletionTaskListener::new(final_tasks));

        // Wire back to front: each level's shared listener either reports
        // to the gate (final level) or joins into a fork of the next one.
        let mut downstream: Option<Vec<TaskUnit>> = None;
        for level in levels.iter().rev() {
            let listener: Arc<dyn TaskListener> = match downstream.take() {
                None => gate.clone(),
                Some(batch) => Arc::new(JoinTaskListener::new(
                    level.len(),
                    Arc::new(ForkTaskListener::new(batch, self.runner.clone())),
                )),
            };
            let mut units = Vec::with_capacity(level.len());
            for id in level {
                let component = job
                    .component(id)
                    .with_context(|| format!("component '{id}' vanished from the job"))?;
                debug!(component = %component.id, "pairing component work");
                units.push(TaskUnit::new(work(component, &context), listener.clone()));
            }
            downstream = Some(units);
        }

        if let Some(first_wave) = downstream {
            for unit in first_wave {
                self.runner.run_unit(unit)?;
            }
        }

        Ok(SubmittedJob { gate, context })
    }

    /// Wait on the gate, pitching in on queued tasks instead of idling so
    /// a full pool cannot starve the waiter.
    fn wait(&self, gate: &JobCompletionTaskListener) {
        while !gate.is_done() {
            if !self.runner.assist_execution() {
                if gate.await_timeout(Duration::from_millis(10)) {
                    break;
                }
            }
        }
    }
}

struct SubmittedJob {
    gate: Arc<JobCompletionTaskListener>,
    context: JobContext,
}
