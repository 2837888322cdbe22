//! # Runtime: a main task plus background tasks with coordinated shutdown.
//!
//! [`Runtime::run`] takes `[task0, task1, ..., taskN]`:
//!
//! ```text
//! run(tasks):
//!   task1..N ──► JoinSet::spawn(run_task(ctx_i))   ctx_i.stop = background.child_token()
//!       │                                         (background: independent token)
//!       │
//!       └─► await every start signal (sent or dropped)
//!
//!   task0 ──► run_task(ctx_0) polled inline        ctx_0.stop = runtime stop token
//!       │      (never spawned: stays on the thread driving `run`)
//!       ▼
//!   background.cancel()          (once)
//!       │
//!       └─► join all  ── grace elapsed? ──► abort stuck, GraceExceeded { stuck }
//!
//! result: every error collected (task0 first, then in join order)
//!         0 → Ok, 1 → that error, n → Compound
//! ```
//!
//! The runtime stop token reaches task 0 only. Background tasks keep running
//! while task 0 winds down; their own token is cancelled once task 0 returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::core::runner::run_task;
use crate::error::{CompoundError, RuntimeError};
use crate::tasks::{StartSignal, TaskContext, TaskRef};
use crate::units::Units;

type Joined = (String, Result<(), RuntimeError>);

/// Co-schedules one main task with background tasks.
pub struct Runtime {
    units: Arc<Units>,
    stop: CancellationToken,
    grace: Option<Duration>,
}

impl Runtime {
    /// Creates a runtime handing `units` to every task.
    pub fn new(units: Arc<Units>) -> Self {
        Self {
            units,
            stop: CancellationToken::new(),
            grace: None,
        }
    }

    /// Uses `token` as the main task's stop signal.
    pub fn with_stop(mut self, token: CancellationToken) -> Self {
        self.stop = token;
        self
    }

    /// Bounds how long background tasks may take to stop; `None` waits forever.
    pub fn with_grace(mut self, grace: Option<Duration>) -> Self {
        self.grace = grace;
        self
    }

    /// Token that stops the main task. Background tasks are stopped after it returns.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Runs `tasks[0]` inline and `tasks[1..]` in the background until task 0 returns.
    ///
    /// Returns `Ok(())` iff every task returned `Ok` or `Err(Canceled)`.
    pub async fn run(&self, tasks: Vec<TaskRef>) -> Result<(), RuntimeError> {
        let mut tasks = tasks.into_iter();
        let main = tasks.next().ok_or(RuntimeError::NoTasks)?;

        let background = CancellationToken::new();
        let mut set: JoinSet<Joined> = JoinSet::new();
        let mut pending: Vec<String> = Vec::new();
        let mut starts = Vec::new();

        for task in tasks {
            let name = task.name().to_string();
            let (start, started) = StartSignal::pair();
            let ctx = TaskContext::new(start, background.child_token(), Arc::clone(&self.units));
            let label = name.clone();
            set.spawn(async move {
                let res = run_task(&*task, ctx).await;
                (label, res)
            });
            starts.push((name.clone(), started));
            pending.push(name);
        }

        for (name, started) in starts {
            match started.await {
                Ok(()) => log::debug!("task {name} started"),
                Err(_) => log::debug!("task {name} terminated without starting"),
            }
        }

        let mut errors = CompoundError::new();
        let (start, _started) = StartSignal::pair();
        let ctx = TaskContext::new(start, self.stop.clone(), Arc::clone(&self.units));
        log::debug!("task {} running on the caller", main.name());
        if let Err(e) = run_task(&*main, ctx).await {
            errors.push(e);
        }

        background.cancel();
        self.join_all(&mut set, &mut pending, &mut errors).await;
        errors.into_result()
    }

    async fn join_all(
        &self,
        set: &mut JoinSet<Joined>,
        pending: &mut Vec<String>,
        errors: &mut CompoundError,
    ) {
        let drain = async {
            while let Some(joined) = set.join_next().await {
                collect(joined, pending, errors);
            }
        };

        let Some(grace) = self.grace else {
            drain.await;
            return;
        };
        if tokio::time::timeout(grace, drain).await.is_ok() {
            log::debug!("background tasks stopped within {grace:?}");
            return;
        }

        let stuck = std::mem::take(pending);
        log::warn!("shutdown grace {grace:?} exceeded; aborting {stuck:?}");
        set.abort_all();
        while set.join_next().await.is_some() {}
        errors.push(RuntimeError::GraceExceeded { grace, stuck });
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("grace", &self.grace)
            .field("stopped", &self.stop.is_cancelled())
            .finish()
    }
}

fn collect(joined: Result<Joined, JoinError>, pending: &mut Vec<String>, errors: &mut CompoundError) {
    match joined {
        Ok((name, res)) => {
            if let Some(i) = pending.iter().position(|p| *p == name) {
                pending.remove(i);
            }
            if let Err(e) = res {
                errors.push(e);
            }
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => errors.push(RuntimeError::internal(format!("background task lost: {e}"))),
    }
}
