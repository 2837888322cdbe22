//! # Logger unit.
//!
//! Installs `env_logger` as the `log` backend (honouring `RUST_LOG`) and gives
//! units a handle for application-level messages.
//!
//! ## Example output
//! ```text
//! [2026-01-01T10:00:00.000Z INFO  weather] station online
//! [2026-01-01T10:00:05.000Z WARN  weather] sensor timeout, retrying
//! [2026-01-01T10:00:09.000Z ERROR weather] fatal: no sensor found
//! ```

use env_logger::Env;
use tokio_util::sync::CancellationToken;

use crate::error::UnitError;
use crate::units::{NewContext, Unit};

/// Flag raising the default filter from `info` to `debug`.
pub const DEBUG_FLAG: &str = "debug";

/// Application logger.
#[derive(Debug)]
pub struct Logger {
    app: String,
    debug: bool,
    shutdown: CancellationToken,
}

impl Logger {
    pub(crate) fn new(ctx: &NewContext<'_>) -> Self {
        let debug = ctx.flags().get_bool(DEBUG_FLAG).unwrap_or(false);
        let level = if debug { "debug" } else { "info" };
        // A backend installed earlier (tests, embedding apps) stays in place.
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level))
            .format_timestamp_millis()
            .try_init();

        Self {
            app: ctx.app().to_string(),
            debug,
            shutdown: ctx.shutdown_token(),
        }
    }

    /// True when `--debug` was given.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Informational message.
    pub fn print(&self, msg: impl std::fmt::Display) {
        log::info!(target: &self.app, "{msg}");
    }

    /// Debug message; shown with `--debug` or a matching `RUST_LOG`.
    pub fn debug(&self, msg: impl std::fmt::Display) {
        log::debug!(target: &self.app, "{msg}");
    }

    /// Warning.
    pub fn warn(&self, msg: impl std::fmt::Display) {
        log::warn!(target: &self.app, "{msg}");
    }

    /// Error that does not stop the application.
    pub fn error(&self, msg: impl std::fmt::Display) {
        log::error!(target: &self.app, "{msg}");
    }

    /// Logs an error and stops the main task.
    pub fn fatal(&self, msg: impl std::fmt::Display) {
        log::error!(target: &self.app, "fatal: {msg}");
        self.shutdown.cancel();
    }
}

impl Unit for Logger {
    fn close(&self) -> Result<(), UnitError> {
        log::logger().flush();
        Ok(())
    }
}
