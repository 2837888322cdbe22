//! # unitvisor
//!
//! **Unitvisor** is the application runtime core for long-running, device-style
//! Rust programs that compose hardware drivers with application services.
//!
//! It discovers declared units, resolves their dependency graph, constructs them
//! in dependency order, runs a main task plus background tasks with coordinated
//! shutdown, delivers in-process events through a publish/subscribe bus and
//! schedules timers (one-shot, interval, exponential backoff).
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  UnitConfig  │   │  UnitConfig  │   │  UnitConfig  │
//!     │   (logger)   │   │ (bus, timer) │   │ (user units) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry (global or private)                                     │
//! │  - name → configs ordered by priority                             │
//! │  - with_dependencies(): DFS closure, CyclicDependency on cycles   │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Kernel                                                           │
//! │  init    configure hooks  → Flags (clap)                          │
//! │  start   parse args, new hooks in order → Units                   │
//! │  run     Runtime: task0 inline, task1..N in a JoinSet             │
//! │  close   Units in reverse order, errors compounded                │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Logger    │   │   EventBus   │◄──│    Timers    │
//!     │ (env_logger) │   │ (PubSub)     │   │ (DelayQueue) │
//!     └──────────────┘   └──────┬───────┘   └──────────────┘
//!                               ▼
//!                   subscriber callbacks (per queue, in order)
//! ```
//!
//! ### Run
//! ```text
//! run([task0, task1, ..., taskN])
//!   ├─► spawn task1..N          (stop = own token, not the kernel token)
//!   ├─► await each start signal (sent, or dropped unsent)
//!   ├─► task0 on the caller     (stop = kernel token; signals cancel it)
//!   ├─► cancel background stops (once)
//!   └─► join background (optional grace) → Ok | error | Compound
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                        |
//! |-------------------|--------------------------------------------------------------|-------------------------------------------|
//! | **Units**         | Declare, resolve and look up constructed units.              | [`UnitConfig`], [`Registry`], [`Units`]   |
//! | **Events**        | Typed in-process publish/subscribe.                          | [`PubSub`], [`ChannelBus`], [`Event`]     |
//! | **Timers**        | One-shot, interval and backoff timers delivered as events.   | [`Timers`], [`Backoff`], [`TimerTick`]    |
//! | **Tasks**         | Main task plus background tasks with start/stop signalling.  | [`Task`], [`TaskFn`], [`TaskContext`]     |
//! | **Kernel**        | Full lifecycle, flags, OS signals, exit codes.               | [`Kernel`], [`KernelConfig`], [`Flags`]   |
//! | **Errors**        | Typed errors for orchestration and task execution.           | [`RuntimeError`], [`TaskError`]           |
//!
//! ## Example
//! ```rust
//! use std::sync::Mutex;
//! use std::time::Duration;
//! use unitvisor::{Event, EventBus, Kernel, KernelConfig, TaskContext, TaskError, TaskFn, TaskRef, Timers};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), unitvisor::RuntimeError> {
//!     let mut kernel = Kernel::builder(KernelConfig::new("hello"))
//!         .with_units(["timer"])
//!         .init()?;
//!     kernel.start(Vec::<String>::new())?;
//!
//!     let hello: TaskRef = TaskFn::arc("hello", |ctx: TaskContext| async move {
//!         let bus = ctx.get::<EventBus>("bus").ok_or_else(|| TaskError::fail("bus missing"))?;
//!         let timers = ctx.get::<Timers>("timer").ok_or_else(|| TaskError::fail("timer missing"))?;
//!
//!         let (tx, rx) = tokio::sync::oneshot::channel();
//!         let tx = Mutex::new(Some(tx));
//!         bus.subscribe(0, move |ev: &Event| {
//!             if let Some(tx) = tx.lock().unwrap().take() {
//!                 let _ = tx.send(ev.fire_count());
//!             }
//!         })?;
//!         timers.new_timeout(Duration::from_millis(10), "hello")?;
//!
//!         let fired = rx.await.map_err(TaskError::fail)?;
//!         assert_eq!(fired, Some(1));
//!         Ok::<(), TaskError>(())
//!     });
//!
//!     kernel.run(vec![hello]).await?;
//!     kernel.close()
//! }
//! ```
mod builtin;
mod core;
mod error;
mod events;
mod tasks;
mod timers;
mod units;

// ---- Public re-exports ----

pub use builtin::{Logger, BUS, DEBUG_FLAG, TIMER};
pub use crate::core::{
    format_duration, parse_duration, wait_for_signal, Flags, Kernel, KernelBuilder, KernelConfig,
    Runtime, Signal, LOGGER,
};
pub use error::{CompoundError, RuntimeError, TaskError, UnitError};
pub use events::{ChannelBus, Event, EventBus, Payload, PubSub, QueueId, Token};
pub use tasks::{BoxTaskFuture, StartSignal, Task, TaskContext, TaskFn, TaskRef};
pub use timers::{Backoff, TimerHandle, TimerId, TimerKind, TimerTick, Timers, TIMER_SOURCE};
pub use units::{downcast, register_unit, AsAny, NewContext, Registry, Unit, UnitConfig, UnitRef, Units};
