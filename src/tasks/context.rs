//! Per-task context: start signal, stop token and unit lookup.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::units::{Unit, UnitRef, Units};

/// One-shot "I am running" signal.
///
/// Sending consumes it; dropping it unsent tells the runtime the task terminated
/// without starting.
pub struct StartSignal {
    tx: oneshot::Sender<()>,
}

impl StartSignal {
    pub(crate) fn pair() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Reports the task as started.
    pub fn send(self) {
        // runtime no longer waiting: nothing to report to
        let _ = self.tx.send(());
    }
}

impl fmt::Debug for StartSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartSignal")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Everything a task gets from the runtime.
#[derive(Debug)]
pub struct TaskContext {
    /// Send once operational; drop to report "terminated without starting".
    pub start: StartSignal,
    /// Cancelled when the task must stop.
    pub stop: CancellationToken,
    units: Arc<Units>,
}

impl TaskContext {
    pub(crate) fn new(start: StartSignal, stop: CancellationToken, units: Arc<Units>) -> Self {
        Self { start, stop, units }
    }

    /// Constructed units.
    pub fn units(&self) -> &Arc<Units> {
        &self.units
    }

    /// Highest-priority instance of `name`.
    pub fn instance(&self, name: &str) -> Option<UnitRef> {
        self.units.instance(name)
    }

    /// Highest-priority instance of `name`, downcast to `T`.
    pub fn get<T: Unit>(&self, name: &str) -> Option<Arc<T>> {
        self.units.get::<T>(name)
    }
}
