//! Events: data model and the two bus variants.
//!
//! ## Contents
//! - [`Event`] event value with source, timestamp, payload and timer metadata
//! - [`PubSub`] callback bus with synchronous, per-queue ordered delivery
//! - [`ChannelBus`] channel bus whose `emit` applies back-pressure
//!
//! ## Quick reference
//! - **Publishers**: the timer scheduler (timer events), units, tasks.
//! - **Consumers**: callbacks registered with [`PubSub::subscribe`], receivers
//!   handed out by [`ChannelBus::subscribe`].
//!
//! The kernel's built-in `bus` unit is an [`EventBus`] (`PubSub<Event>`).

mod channel;
mod event;
mod pubsub;

pub use channel::ChannelBus;
pub use event::{Event, Payload};
pub(crate) use pubsub::panic_message;
pub use pubsub::{PubSub, QueueId, Token};

/// The bus type shared by the kernel's built-in units.
pub type EventBus = PubSub<Event>;
