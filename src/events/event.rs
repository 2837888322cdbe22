//! # Events carried on the bus.
//!
//! An [`Event`] is an opaque value described by its source unit, a timestamp and
//! a user payload. Events emitted by the timer scheduler additionally carry a
//! [`TimerTick`] exposing the fire count and a cancel handle.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use unitvisor::Event;
//!
//! let ev = Event::new()
//!     .with_source("gpio")
//!     .with_name("edge")
//!     .with_payload(17u8);
//!
//! assert_eq!(ev.source.as_deref(), Some("gpio"));
//! assert_eq!(ev.payload::<u8>(), Some(&17));
//! assert!(ev.timer().is_none());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::timers::TimerTick;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Shared, type-erased event payload.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - `source`: name of the emitting unit
/// - `name`: short event name chosen by the emitter
#[derive(Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Emitting unit, if known.
    pub source: Option<Arc<str>>,
    /// Event name, if set.
    pub name: Option<Arc<str>>,

    payload: Option<Payload>,
    timer: Option<TimerTick>,
}

impl Event {
    /// Creates an event stamped with the current time and the next sequence number.
    pub fn new() -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            source: None,
            name: None,
            payload: None,
            timer: None,
        }
    }

    /// Attaches the emitting unit name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches an event name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a payload value.
    #[inline]
    pub fn with_payload<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.payload = Some(Arc::new(value));
        self
    }

    /// Attaches an already shared payload.
    #[inline]
    pub fn with_payload_arc(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    #[inline]
    pub(crate) fn with_timer(mut self, tick: TimerTick) -> Self {
        self.timer = Some(tick);
        self
    }

    /// Returns the payload if it is a `T`.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Returns the shared payload, whatever its type.
    pub fn payload_arc(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Timer metadata, for events emitted by the timer scheduler.
    pub fn timer(&self) -> Option<&TimerTick> {
        self.timer.as_ref()
    }

    /// Fire count of the timer that emitted this event (1-based).
    #[inline]
    pub fn fire_count(&self) -> Option<u64> {
        self.timer.as_ref().map(TimerTick::fire_count)
    }

    /// Cancels the timer that emitted this event.
    ///
    /// No-op for events that do not come from a timer. Idempotent.
    pub fn cancel(&self) {
        if let Some(tick) = &self.timer {
            tick.cancel();
        }
    }

    #[inline]
    pub fn is_timer(&self) -> bool {
        self.timer.is_some()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Event");
        d.field("seq", &self.seq)
            .field("at", &self.at)
            .field("source", &self.source)
            .field("name", &self.name)
            .field("payload", &self.payload.is_some());
        if let Some(tick) = &self.timer {
            d.field("timer", tick);
        }
        d.finish()
    }
}
