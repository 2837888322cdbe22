//! Error types used by the unitvisor runtime, units and tasks.
//!
//! This module defines the error vocabulary shared by every component:
//!
//! - [`RuntimeError`] - errors raised by the registry, bus, timers, task runtime and kernel.
//! - [`TaskError`] - errors returned by individual tasks.
//! - [`CompoundError`] - aggregation of several errors (teardown, parallel task completion).
//! - [`UnitError`] - boxed error type returned by unit hooks and [`Unit::close`](crate::Unit::close).
//!
//! Errors provide helper methods (`as_label`, `as_message`) for logging, and
//! [`RuntimeError::exit_code`] for process exit status.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error type returned by unit hooks (`configure`, `new`) and by [`Unit::close`](crate::Unit::close).
pub type UnitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced by the unitvisor runtime.
///
/// Every variant is cheap to clone so that idempotent operations
/// (e.g. [`Kernel::close`](crate::Kernel::close)) can hand back the same error twice.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// Invalid argument to a public operation (empty, zero, out of range).
    #[error("bad parameter: {what}")]
    BadParameter {
        /// What was wrong with the argument.
        what: String,
    },

    /// A dependency name resolves to no registered unit config.
    #[error("unit not found: {name:?}")]
    UnitNotFound {
        /// The offending name.
        name: String,
    },

    /// The dependency closure is not a DAG.
    #[error("cyclic dependency at unit {name:?}")]
    CyclicDependency {
        /// The unit at which the cycle was detected.
        name: String,
    },

    /// Operation attempted against an object in the wrong lifecycle state.
    #[error("out of order: {what}")]
    OutOfOrder {
        /// Description of the rejected operation.
        what: String,
    },

    /// An OS signal was received while waiting for one.
    #[error("signal caught: {signal}")]
    SignalCaught {
        /// Signal name, e.g. `SIGINT`.
        signal: &'static str,
    },

    /// Invariant violation or a caught panic.
    #[error("internal error: {what}")]
    Internal {
        /// Description of the failure.
        what: String,
    },

    /// `run` was called without any task.
    #[error("no tasks to run")]
    NoTasks,

    /// The waiting context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// `--help` was requested; usage has been printed.
    #[error("help requested")]
    Help,

    /// `--version` was requested; version metadata has been printed.
    #[error("version requested")]
    Version,

    /// A unit hook (`configure`, `new`, `close`) failed.
    #[error("{unit}: {error}")]
    Unit {
        /// Name of the failing unit.
        unit: String,
        /// The error returned by the hook.
        error: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A task returned an error.
    #[error("task {task}: {error}")]
    Task {
        /// Name of the failing task.
        task: String,
        /// The error returned by the task.
        error: TaskError,
    },

    /// Shutdown grace period was exceeded; some tasks were aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the tasks that did not stop in time.
        stuck: Vec<String>,
    },

    /// Several errors collected together.
    #[error(transparent)]
    Compound(CompoundError),
}

impl RuntimeError {
    pub(crate) fn bad_parameter(what: impl Into<String>) -> Self {
        RuntimeError::BadParameter { what: what.into() }
    }

    pub(crate) fn out_of_order(what: impl Into<String>) -> Self {
        RuntimeError::OutOfOrder { what: what.into() }
    }

    pub(crate) fn internal(what: impl Into<String>) -> Self {
        RuntimeError::Internal { what: what.into() }
    }

    pub(crate) fn unit(unit: impl Into<String>, error: UnitError) -> Self {
        RuntimeError::Unit {
            unit: unit.into(),
            error: Arc::from(error),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use unitvisor::RuntimeError;
    ///
    /// assert_eq!(RuntimeError::NoTasks.as_label(), "runtime_no_tasks");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::BadParameter { .. } => "runtime_bad_parameter",
            RuntimeError::UnitNotFound { .. } => "runtime_unit_not_found",
            RuntimeError::CyclicDependency { .. } => "runtime_cyclic_dependency",
            RuntimeError::OutOfOrder { .. } => "runtime_out_of_order",
            RuntimeError::SignalCaught { .. } => "runtime_signal_caught",
            RuntimeError::Internal { .. } => "runtime_internal",
            RuntimeError::NoTasks => "runtime_no_tasks",
            RuntimeError::Cancelled => "runtime_cancelled",
            RuntimeError::Help => "runtime_help",
            RuntimeError::Version => "runtime_version",
            RuntimeError::Unit { .. } => "runtime_unit_failed",
            RuntimeError::Task { .. } => "runtime_task_failed",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Compound(_) => "runtime_compound",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck tasks={stuck:?}")
            }
            RuntimeError::Compound(c) => format!("{} errors: {c}", c.len()),
            other => other.to_string(),
        }
    }

    /// Process exit code for this error.
    ///
    /// `1` for [`RuntimeError::Help`] and [`RuntimeError::Version`], `255` otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            RuntimeError::Help | RuntimeError::Version => 1,
            _ => 255,
        }
    }

    /// True when the error is (or only contains) a caught signal or a cancellation,
    /// both of which count as normal termination.
    pub fn is_shutdown(&self) -> bool {
        match self {
            RuntimeError::SignalCaught { .. } | RuntimeError::Cancelled => true,
            RuntimeError::Compound(c) => c.iter().all(RuntimeError::is_shutdown),
            _ => false,
        }
    }
}

/// # Aggregation of one or more [`RuntimeError`]s.
///
/// Produced by teardown and by parallel task completion. Errors keep the order in
/// which they were collected.
#[derive(Debug, Clone, Default)]
pub struct CompoundError {
    errors: Vec<RuntimeError>,
}

impl CompoundError {
    /// Creates an empty compound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an error. Nested compounds are flattened.
    pub fn push(&mut self, err: RuntimeError) {
        match err {
            RuntimeError::Compound(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
    }

    /// Number of collected errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterates over the collected errors.
    pub fn iter(&self) -> impl Iterator<Item = &RuntimeError> {
        self.errors.iter()
    }

    /// Converts the collection into a result:
    /// - no errors → `Ok(())`
    /// - exactly one → that error, unwrapped
    /// - more → [`RuntimeError::Compound`]
    pub fn into_result(mut self) -> Result<(), RuntimeError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(RuntimeError::Compound(self)),
        }
    }
}

impl fmt::Display for CompoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompoundError {}

impl FromIterator<RuntimeError> for CompoundError {
    fn from_iter<I: IntoIterator<Item = RuntimeError>>(iter: I) -> Self {
        let mut c = CompoundError::new();
        for err in iter {
            c.push(err);
        }
        c
    }
}

/// # Errors produced by task execution.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task gave up because its stop signal fired; treated as a graceful exit.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl fmt::Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use unitvisor::TaskError;
    ///
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Canceled => "context cancelled".to_string(),
        }
    }
}

impl From<RuntimeError> for TaskError {
    fn from(err: RuntimeError) -> Self {
        TaskError::Fail {
            error: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_unwraps_single_error() {
        let mut c = CompoundError::new();
        c.push(RuntimeError::NoTasks);
        assert!(matches!(c.into_result(), Err(RuntimeError::NoTasks)));
    }

    #[test]
    fn compound_flattens_and_keeps_order() {
        let inner: CompoundError = vec![RuntimeError::NoTasks, RuntimeError::Cancelled]
            .into_iter()
            .collect();
        let mut c = CompoundError::new();
        c.push(RuntimeError::Help);
        c.push(RuntimeError::Compound(inner));
        assert_eq!(c.len(), 3);

        let labels: Vec<_> = c.iter().map(RuntimeError::as_label).collect();
        assert_eq!(
            labels,
            ["runtime_help", "runtime_no_tasks", "runtime_cancelled"]
        );
        assert_eq!(
            c.to_string(),
            "help requested; no tasks to run; context cancelled"
        );
    }

    #[test]
    fn empty_compound_is_ok() {
        assert!(CompoundError::new().into_result().is_ok());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RuntimeError::Help.exit_code(), 1);
        assert_eq!(RuntimeError::Version.exit_code(), 1);
        assert_eq!(RuntimeError::NoTasks.exit_code(), 255);
    }

    #[test]
    fn unit_error_display_names_the_unit() {
        let err = RuntimeError::unit("gpio", "no such device".into());
        assert_eq!(err.to_string(), "gpio: no such device");
    }

    #[test]
    fn shutdown_errors() {
        assert!(RuntimeError::SignalCaught { signal: "SIGINT" }.is_shutdown());
        assert!(RuntimeError::Cancelled.is_shutdown());
        assert!(!RuntimeError::NoTasks.is_shutdown());
    }
}
