//! # Task abstractions.
//!
//! - [`Task`] trait for stoppable async work
//! - [`TaskFn`] function-backed task implementation
//! - [`TaskRef`] shared reference to a task (`Arc<dyn Task>`)
//! - [`TaskContext`] start signal, stop token and unit lookup handed to each task

mod context;
mod task;
mod task_fn;

pub use context::{StartSignal, TaskContext};
pub use task::{BoxTaskFuture, Task, TaskRef};
pub use task_fn::TaskFn;
