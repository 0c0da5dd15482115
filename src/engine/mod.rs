// src/engine/mod.rs

//! Job execution: ties the dependency graph, the scheduler and the
//! storage provider together.

pub mod executor;

pub use executor::{JobContext, JobExecutor, JobResult};
