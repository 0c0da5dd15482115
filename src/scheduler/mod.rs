// src/scheduler/mod.rs

//! Task scheduling: small work units, listener-driven continuations, and a
//! bounded thread-pool runner.
//!
//! Execution order is expressed through listeners rather than futures: a
//! task's completion triggers its listener, which may schedule more work
//! ([`ForkTaskListener`]), wait for siblings ([`JoinTaskListener`]) or
//! release a caller blocked on the whole job
//! ([`JobCompletionTaskListener`]).

pub mod completion;
pub mod fork;
pub mod join;
pub mod latch;
pub mod listener;
pub mod runner;
pub mod unit;

pub use completion::JobCompletionTaskListener;
pub use fork::ForkTaskListener;
pub use join::JoinTaskListener;
pub use latch::CountdownLatch;
pub use listener::CompositeTaskListener;
pub use runner::TaskRunner;
pub use unit::{ClosureTask, NoopTask, Task, TaskListener, TaskUnit};
