//! # Kernel configuration.
//!
//! Provides [`KernelConfig`], the settings a [`Kernel`](crate::Kernel) is built from.
//!
//! ## Sentinel values
//! - `grace = None` → wait for background tasks forever
//! - `version = None` → `--version` prints the application name only

use std::time::Duration;

use crate::core::signals::Signal;
use crate::events::QueueId;

/// Settings for one application kernel.
///
/// ## Field semantics
/// - `name`: application name, used in usage text and logs
/// - `version`: version string printed by `--version`
/// - `about`: one-line description shown by `--help`
/// - `grace`: bound on background shutdown (`None` = no bound)
/// - `timer_queue`: bus queue the built-in timer unit emits on
/// - `signals`: OS signals [`Kernel::main`](crate::Kernel::main) turns into shutdown
#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// Application name.
    pub name: String,

    /// Version metadata for `--version`.
    pub version: Option<String>,

    /// Short description for `--help`.
    pub about: Option<String>,

    /// Maximum time background tasks get to stop after task 0 returns.
    ///
    /// When exceeded, stuck tasks are aborted and the run fails with
    /// `RuntimeError::GraceExceeded`.
    pub grace: Option<Duration>,

    /// Queue id used for timer events.
    pub timer_queue: QueueId,

    /// Signals that stop the main task.
    pub signals: Vec<Signal>,
}

impl KernelConfig {
    /// Default configuration with the given application name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the shutdown grace.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }
}

impl Default for KernelConfig {
    /// Default configuration:
    ///
    /// - `name = "app"`
    /// - `version = None`, `about = None`
    /// - `grace = None` (wait forever)
    /// - `timer_queue = 0`
    /// - `signals = [SIGINT, SIGTERM]`
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            version: None,
            about: None,
            grace: None,
            timer_queue: 0,
            signals: vec![Signal::Interrupt, Signal::Terminate],
        }
    }
}
