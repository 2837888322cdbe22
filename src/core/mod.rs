//! Kernel core: configuration, lifecycle, task runtime and OS integration.
//!
//! Public API from this module:
//! - [`Kernel`] / [`KernelBuilder`]: unit lifecycle (`init`, `start`, `run`, `close`);
//! - [`KernelConfig`]: kernel settings;
//! - [`Runtime`]: main task plus background tasks with coordinated shutdown;
//! - [`Flags`]: command-line flags declared by units;
//! - [`Signal`] / [`wait_for_signal`]: OS signal translation.
//!
//! Internal modules:
//! - `runner`: drives one task with panic isolation;
//! - `kernel`: lifecycle state machine and the `main` entry point.

mod builder;
mod config;
mod flags;
mod kernel;
mod runner;
mod runtime;
mod signals;

pub use builder::KernelBuilder;
pub use config::KernelConfig;
pub use flags::{format_duration, parse_duration, Flags};
pub use kernel::{Kernel, LOGGER};
pub use runtime::Runtime;
pub use signals::{wait_for_signal, Signal};
