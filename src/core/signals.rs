//! # OS signal handling.
//!
//! [`wait_for_signal`] waits until one of the given signals is delivered, or the
//! token is cancelled. Listeners are registered on entry and dropped on return;
//! only the signals passed in are listened for.
//!
//! ## Signals
//! **Unix platforms:** every [`Signal`] variant.
//!
//! **Other platforms:** only [`Signal::Interrupt`], via [`tokio::signal::ctrl_c`].

use futures::future::{select_all, BoxFuture};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;

/// Signals the kernel can translate into shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// `SIGINT` (Ctrl-C in a terminal).
    Interrupt,
    /// `SIGTERM` (default kill signal, used by systemd).
    Terminate,
    /// `SIGQUIT`.
    Quit,
    /// `SIGHUP`.
    Hangup,
    /// `SIGUSR1`.
    User1,
    /// `SIGUSR2`.
    User2,
}

impl Signal {
    /// Conventional signal name, e.g. `SIGINT`.
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Quit => "SIGQUIT",
            Signal::Hangup => "SIGHUP",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn listen(self) -> std::io::Result<BoxFuture<'static, Signal>> {
        use tokio::signal::unix::{signal, SignalKind};

        let kind = match self {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Quit => SignalKind::quit(),
            Signal::Hangup => SignalKind::hangup(),
            Signal::User1 => SignalKind::user_defined1(),
            Signal::User2 => SignalKind::user_defined2(),
        };
        let mut stream = signal(kind)?;
        Ok(async move {
            stream.recv().await;
            self
        }
        .boxed())
    }

    #[cfg(not(unix))]
    fn listen(self) -> std::io::Result<BoxFuture<'static, Signal>> {
        match self {
            Signal::Interrupt => Ok(async move {
                let _ = tokio::signal::ctrl_c().await;
                self
            }
            .boxed()),
            _ => Ok(futures::future::pending().boxed()),
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Waits for one of `signals` or for `token` to be cancelled.
///
/// Returns [`RuntimeError::SignalCaught`] naming the signal, [`RuntimeError::Cancelled`]
/// when the token fires first, or [`RuntimeError::Internal`] if a handler cannot be
/// installed. An empty signal set waits for the token only.
pub async fn wait_for_signal(token: &CancellationToken, signals: &[Signal]) -> RuntimeError {
    let mut listeners = Vec::with_capacity(signals.len());
    for sig in signals {
        match sig.listen() {
            Ok(fut) => listeners.push(fut),
            Err(e) => return RuntimeError::internal(format!("cannot listen for {sig}: {e}")),
        }
    }
    if listeners.is_empty() {
        token.cancelled().await;
        return RuntimeError::Cancelled;
    }

    tokio::select! {
        _ = token.cancelled() => RuntimeError::Cancelled,
        (sig, _, _) = select_all(listeners) => {
            log::debug!("caught {sig}");
            RuntimeError::SignalCaught { signal: sig.name() }
        }
    }
}
