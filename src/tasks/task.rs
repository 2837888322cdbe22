//! # Task abstraction.
//!
//! A [`Task`] has a stable [`name`](Task::name) and a [`spawn`](Task::spawn) method that
//! turns a [`TaskContext`] into a boxed future. Every call creates a fresh future.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::TaskError;
use crate::tasks::TaskContext;

/// Boxed future returned by [`Task::spawn`].
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Shared handle to a task object.
pub type TaskRef = Arc<dyn Task>;

/// # Asynchronous, stoppable unit of work.
///
/// Implementors should send [`TaskContext::start`] once they are operational and
/// return promptly after [`TaskContext::stop`] is cancelled.
///
/// # Example
/// ```
/// use unitvisor::{BoxTaskFuture, Task, TaskContext, TaskError};
///
/// struct Blink;
///
/// impl Task for Blink {
///     fn name(&self) -> &str { "blink" }
///
///     fn spawn(&self, ctx: TaskContext) -> BoxTaskFuture {
///         Box::pin(async move {
///             ctx.start.send();
///             ctx.stop.cancelled().await;
///             Ok::<(), TaskError>(())
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Creates the future that runs the task to completion.
    fn spawn(&self, ctx: TaskContext) -> BoxTaskFuture;
}
