//! Gantry Tasks - Task registry and execution
//!
//! This crate provides the task model, name and subscription lookups, the
//! run-once dependency walk, and the help and Makefile projections of a
//! registry.

pub mod executor;
pub mod help;
pub mod makefile;
pub mod registry;
pub mod reporter;
pub mod task;

pub use executor::{ExecutionState, Executor};
pub use help::{render_help, HelpEntry};
pub use registry::{Registry, TaskIndex};
pub use reporter::{
    CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter,
};
pub use task::{Action, Task, TaskContext};
