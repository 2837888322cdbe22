//! # Drives one task to completion.
//!
//! - Polls the task future with panic isolation (`catch_unwind`).
//! - `Ok(())` and `Err(Canceled)` are graceful exits.
//! - `Err(Fail)` becomes [`RuntimeError::Task`]; a panic becomes [`RuntimeError::Internal`].
//!
//! ```text
//! task.spawn(ctx) ─► Ok(())          → Ok
//!                 ─► Err(Canceled)   → Ok      (debug log)
//!                 ─► Err(Fail)       → Task    (warn log)
//!                 ─► panic           → Internal (warn log)
//! ```

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::error::{RuntimeError, TaskError};
use crate::events::panic_message;
use crate::tasks::{Task, TaskContext};

/// Runs `task` once with `ctx`, mapping its outcome into the runtime's error model.
pub(crate) async fn run_task<T: Task + ?Sized>(task: &T, ctx: TaskContext) -> Result<(), RuntimeError> {
    let name = task.name();
    let outcome = AssertUnwindSafe(task.spawn(ctx)).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => {
            log::debug!("task {name} stopped");
            Ok(())
        }
        Ok(Err(TaskError::Canceled)) => {
            log::debug!("task {name} stopped: cancelled");
            Ok(())
        }
        Ok(Err(error)) => {
            log::warn!("task {name} failed: {}", error.as_message());
            Err(RuntimeError::Task {
                task: name.to_string(),
                error,
            })
        }
        Err(panic) => {
            let what = format!("task {name} panicked: {}", panic_message(&*panic));
            log::warn!("{what}");
            Err(RuntimeError::internal(what))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::tasks::{StartSignal, TaskFn};
    use crate::units::Units;

    fn ctx() -> TaskContext {
        let (start, _rx) = StartSignal::pair();
        TaskContext::new(start, CancellationToken::new(), Units::new())
    }

    #[tokio::test]
    async fn cancelled_is_graceful() {
        let t = TaskFn::arc("t", |_ctx: TaskContext| async { Err::<(), _>(TaskError::Canceled) });
        assert!(run_task(&*t, ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn failure_names_the_task() {
        let t = TaskFn::arc("worker", |_ctx: TaskContext| async {
            Err::<(), _>(TaskError::fail("boom"))
        });
        match run_task(&*t, ctx()).await {
            Err(RuntimeError::Task { task, error }) => {
                assert_eq!(task, "worker");
                assert_eq!(error, TaskError::fail("boom"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_becomes_internal() {
        let t = TaskFn::arc("p", |_ctx: TaskContext| async {
            let armed = Arc::new(true);
            if *armed {
                panic!("kaboom");
            }
            Ok::<(), TaskError>(())
        });
        match run_task(&*t, ctx()).await {
            Err(RuntimeError::Internal { what }) => assert!(what.contains("kaboom")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
