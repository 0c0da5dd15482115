// src/scheduler/listener.rs

//! Listener combinators.

use std::sync::Arc;

use crate::errors::TaskError;
use crate::scheduler::unit::{Task, TaskListener};

/// Fans every lifecycle event out to a list of listeners.
///
/// All children are notified regardless of what earlier children do; there
/// is no short-circuiting, so a join and a completion gate can observe the
/// same task.
pub struct CompositeTaskListener {
    children: Vec<Arc<dyn TaskListener>>,
}

impl CompositeTaskListener {
    pub fn new(children: Vec<Arc<dyn TaskListener>>) -> Self {
        Self { children }
    }
}

impl TaskListener for CompositeTaskListener {
    fn on_begin(&self, task: &dyn Task) {
        for child in &self.children {
            child.on_begin(task);
        }
    }

    fn on_complete(&self, task: &dyn Task) {
        for child in &self.children {
            child.on_complete(task);
        }
    }

    fn on_error(&self, task: &dyn Task, error: &TaskError) {
        for child in &self.children {
            child.on_error(task, error);
        }
    }
}
