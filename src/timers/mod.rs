//! Timers: one-shot, interval and backoff timers delivered as bus events.
//!
//! - [`Timers`] the scheduler unit; one worker task per scheduler.
//! - [`Backoff`] the doubling-with-cap progression used by backoff timers.
//! - [`TimerTick`] metadata attached to every timer [`Event`](crate::Event).
//! - [`TimerHandle`] cancels a timer from anywhere, any number of times.

mod backoff;
mod record;
mod scheduler;

pub use backoff::Backoff;
pub use record::{TimerHandle, TimerId, TimerKind, TimerTick};
pub use scheduler::{Timers, TIMER_SOURCE};
