//! # Timer scheduler.
//!
//! [`Timers`] emits timer events on an [`EventBus`] queue. One long-lived worker
//! task owns every armed timer.
//!
//! ## Architecture
//! ```text
//! new_timeout / new_interval / new_backoff
//!        │  Command::Add (reload)
//!        ▼
//!   ┌──────────────────────── worker ────────────────────────┐
//!   │ select! {                                              │
//!   │   shutdown.cancelled()  → cancel all, exit             │
//!   │   commands.recv()       → Add: arm (maybe fire now)    │
//!   │                           Cancel: disarm               │
//!   │   delay_queue.next()    → fire_count += 1              │
//!   │                           bus.emit(queue, Event)       │
//!   │                           re-arm (interval / backoff)  │
//!   │ }                                                      │
//!   └────────────────────────────────────────────────────────┘
//!        ▲
//!        │  Command::Cancel
//! Event::cancel() (from any subscriber)
//! ```
//!
//! ## Rules
//! - Events of one timer are emitted in fire-count order, starting at 1.
//! - Interval timers keep a fixed cadence measured from the previous deadline.
//! - Backoff timers fire immediately, then wait `d`, `2d`, `4d`, ... capped at `d_max`.
//! - Cancellation is idempotent; a cancelled timer never fires again.
//! - After [`Timers::close`] every timer is cancelled and new timers are rejected.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;

use crate::error::{RuntimeError, UnitError};
use crate::events::{Event, EventBus, Payload, QueueId};
use crate::timers::record::{Command, TimerHandle, TimerId, TimerRecord};
use crate::timers::{Backoff, TimerKind};
use crate::units::Unit;

/// Source name stamped on timer events.
pub const TIMER_SOURCE: &str = "timer";

/// Timer scheduler emitting [`Event`]s with [`TimerTick`](crate::TimerTick) metadata.
pub struct Timers {
    tx: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    ids: AtomicU64,
    queue: QueueId,
}

impl Timers {
    /// Starts a scheduler emitting on `queue` of `bus`.
    ///
    /// Must be called from within a tokio runtime; the worker is spawned on it.
    pub fn new(bus: Arc<EventBus>, queue: QueueId) -> Result<Self, RuntimeError> {
        let handle = Handle::try_current().map_err(|_| {
            RuntimeError::out_of_order("timer scheduler must be started inside a tokio runtime")
        })?;
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let worker = Worker {
            rx,
            shutdown: shutdown.clone(),
            bus,
            queue,
            armed: DelayQueue::new(),
            records: HashMap::new(),
        };
        handle.spawn(worker.run());

        Ok(Self {
            tx,
            shutdown,
            ids: AtomicU64::new(1),
            queue,
        })
    }

    /// Fires once after `d`.
    pub fn new_timeout<P: Any + Send + Sync>(&self, d: Duration, payload: P) -> Result<(), RuntimeError> {
        self.schedule(TimerKind::Timeout, d, None, false, Arc::new(payload))
    }

    /// Fires every `d`; also fires right away when `immediate` is set.
    pub fn new_interval<P: Any + Send + Sync>(
        &self,
        d: Duration,
        payload: P,
        immediate: bool,
    ) -> Result<(), RuntimeError> {
        self.schedule(TimerKind::Interval, d, None, immediate, Arc::new(payload))
    }

    /// Fires immediately, then after `d`, doubling the wait each time up to `max`.
    ///
    /// Requires `0 < d < max`.
    pub fn new_backoff<P: Any + Send + Sync>(
        &self,
        d: Duration,
        max: Duration,
        payload: P,
    ) -> Result<(), RuntimeError> {
        let backoff = Backoff::new(d, max)?;
        self.schedule(TimerKind::Backoff, d, Some(backoff), true, Arc::new(payload))
    }

    fn schedule(
        &self,
        kind: TimerKind,
        d: Duration,
        backoff: Option<Backoff>,
        immediate: bool,
        payload: Payload,
    ) -> Result<(), RuntimeError> {
        if d.is_zero() {
            return Err(RuntimeError::bad_parameter(format!(
                "{} timer with zero interval",
                kind.as_str()
            )));
        }
        if self.shutdown.is_cancelled() {
            return Err(RuntimeError::out_of_order("timer scheduler is closed"));
        }

        let id = TimerId(self.ids.fetch_add(1, Ordering::Relaxed));
        let record = TimerRecord {
            kind,
            interval: d,
            backoff,
            immediate,
            payload,
            fire_count: 0,
            handle: TimerHandle::new(id, self.tx.clone()),
            deadline: Instant::now(),
            key: None,
        };
        self.tx
            .send(Command::Add(record))
            .map_err(|_| RuntimeError::out_of_order("timer scheduler is closed"))
    }

    /// Cancels every outstanding timer and stops the worker. Idempotent.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            log::debug!("timer scheduler closing");
            self.shutdown.cancel();
        }
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Queue the scheduler emits on.
    pub fn queue(&self) -> QueueId {
        self.queue
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("queue", &self.queue)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Unit for Timers {
    fn close(&self) -> Result<(), UnitError> {
        Timers::close(self);
        Ok(())
    }
}

/// Owns the wait-set; nothing else touches the records.
struct Worker {
    rx: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
    bus: Arc<EventBus>,
    queue: QueueId,
    armed: DelayQueue<TimerId>,
    records: HashMap<TimerId, TimerRecord>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Add(record)) => self.add(record),
                    Some(Command::Cancel(id)) => self.disarm(id),
                    None => break,
                },
                Some(expired) = self.armed.next(), if !self.armed.is_empty() => {
                    self.fire(expired.into_inner());
                }
            }
        }
        self.cancel_all();
    }

    fn add(&mut self, mut record: TimerRecord) {
        let id = record.id();
        log::trace!(
            "{id} scheduled: kind={} interval={:?}",
            record.kind.as_str(),
            record.interval
        );
        record.deadline = Instant::now();
        if record.immediate {
            record.fire_count += 1;
            self.emit(&record);
            if record.kind == TimerKind::Timeout {
                return;
            }
        }
        if record.handle.is_cancelled() {
            return;
        }
        if let Some(deadline) = self.next_deadline(&mut record) {
            record.key = Some(self.armed.insert_at(id, deadline));
            self.records.insert(id, record);
        }
    }

    fn next_deadline(&self, record: &mut TimerRecord) -> Option<Instant> {
        if record.fire_count == 0 {
            // not fired yet: first wait is the configured interval
            record.deadline += record.interval;
            return Some(record.deadline);
        }
        record.rearm()
    }

    fn fire(&mut self, id: TimerId) {
        let Some(mut record) = self.records.remove(&id) else {
            return;
        };
        record.key = None;
        if record.handle.is_cancelled() || self.shutdown.is_cancelled() {
            return;
        }

        record.fire_count += 1;
        self.emit(&record);

        if record.handle.is_cancelled() {
            return;
        }
        if let Some(deadline) = record.rearm() {
            record.key = Some(self.armed.insert_at(id, deadline));
            self.records.insert(id, record);
        } else {
            record.handle.mark_cancelled();
            log::trace!("{id} done after {} fire(s)", record.fire_count);
        }
    }

    fn emit(&self, record: &TimerRecord) {
        let ev = Event::new()
            .with_source(TIMER_SOURCE)
            .with_name(record.kind.as_str())
            .with_payload_arc(Arc::clone(&record.payload))
            .with_timer(record.tick());
        if let Err(e) = self.bus.emit(self.queue, ev) {
            log::warn!("{} fire #{} not delivered: {e}", record.id(), record.fire_count);
        }
    }

    fn disarm(&mut self, id: TimerId) {
        if let Some(mut record) = self.records.remove(&id) {
            if let Some(key) = record.key.take() {
                self.armed.remove(&key);
            }
            record.handle.mark_cancelled();
            log::trace!("{id} cancelled after {} fire(s)", record.fire_count);
        }
    }

    fn cancel_all(&mut self) {
        for (_, record) in self.records.drain() {
            record.handle.mark_cancelled();
        }
        self.armed.clear();
        log::debug!("timer scheduler stopped");
    }
}
