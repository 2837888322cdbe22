//! Timer records, ticks and cancel handles.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::time::delay_queue;

use crate::events::Payload;
use crate::timers::Backoff;

/// Identifier of a timer within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Kind of timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once after its interval.
    Timeout,
    /// Fires every interval.
    Interval,
    /// Fires immediately, then after intervals doubling up to a cap.
    Backoff,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Timeout => "timeout",
            TimerKind::Interval => "interval",
            TimerKind::Backoff => "backoff",
        }
    }
}

pub(crate) enum Command {
    Add(TimerRecord),
    Cancel(TimerId),
}

/// Cancel handle carried by timer events.
#[derive(Clone)]
pub struct TimerHandle {
    id: TimerId,
    cancelled: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Command>,
}

impl TimerHandle {
    pub(crate) fn new(id: TimerId, tx: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    /// Removes the timer from its scheduler. Safe to call any number of times.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            // Worker gone means the scheduler is closed: nothing left to cancel.
            let _ = self.tx.send(Command::Cancel(self.id));
        }
    }

    /// True once cancelled (explicitly or by scheduler shutdown).
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn id(&self) -> TimerId {
        self.id
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Timer metadata attached to events emitted by the scheduler.
#[derive(Clone, Debug)]
pub struct TimerTick {
    kind: TimerKind,
    fire_count: u64,
    interval: Duration,
    handle: TimerHandle,
}

impl TimerTick {
    /// Kind of the emitting timer.
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// How many times the timer has fired, this event included (1-based).
    pub fn fire_count(&self) -> u64 {
        self.fire_count
    }

    /// Interval the timer was armed with when it fired.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancels the emitting timer.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Cancel handle, for keeping beyond the event.
    pub fn handle(&self) -> &TimerHandle {
        &self.handle
    }
}

/// Scheduler-side state of one timer. Owned by the worker.
pub(crate) struct TimerRecord {
    pub(crate) kind: TimerKind,
    pub(crate) interval: Duration,
    pub(crate) backoff: Option<Backoff>,
    pub(crate) immediate: bool,
    pub(crate) payload: Payload,
    pub(crate) fire_count: u64,
    pub(crate) handle: TimerHandle,
    pub(crate) deadline: Instant,
    pub(crate) key: Option<delay_queue::Key>,
}

impl TimerRecord {
    pub(crate) fn id(&self) -> TimerId {
        self.handle.id
    }

    pub(crate) fn tick(&self) -> TimerTick {
        TimerTick {
            kind: self.kind,
            fire_count: self.fire_count,
            interval: self.interval,
            handle: self.handle.clone(),
        }
    }

    /// Advances the record after a fire and returns the next deadline,
    /// or `None` when the timer is done.
    pub(crate) fn rearm(&mut self) -> Option<Instant> {
        match self.kind {
            TimerKind::Timeout => None,
            TimerKind::Interval => {
                self.deadline += self.interval;
                Some(self.deadline)
            }
            TimerKind::Backoff => {
                if let Some(backoff) = &self.backoff {
                    // fire 1 is immediate; the wait after fire k is step k-1
                    let step = self.fire_count.saturating_sub(1).min(u32::MAX as u64) as u32;
                    self.interval = backoff.delay(step);
                }
                self.deadline += self.interval;
                Some(self.deadline)
            }
        }
    }
}
