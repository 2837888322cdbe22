//! # Kernel: unit lifecycle around the task runtime.
//!
//! The [`Kernel`] owns the resolved unit closure, the command-line flags, the
//! constructed [`Units`] and the root cancellation token.
//!
//! ## Lifecycle
//! ```text
//! KernelBuilder::init()
//!   resolve(["logger", units..])  → configs in dependency order
//!   configure hooks (in order)    → declare flags
//!          │
//!          ▼  Initialized
//! start(args)
//!   parse flags                   → Help / Version / BadParameter
//!   new hooks (in order)          → Units::push   (failure stops the walk)
//!          │
//!          ▼  Started
//! run(tasks)
//!   Runtime { stop = kernel token, grace }.run(tasks)
//!          │
//!          ▼  Finished
//! close()
//!   Units::drain_reverse() → Unit::close() each, errors collected
//!          │
//!          ▼  Closed  (close() again returns the same result)
//! ```
//!
//! Any call outside this order fails with [`RuntimeError::OutOfOrder`]. `close()` is
//! valid from every state and also runs on drop.

use std::ffi::OsString;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::builder::KernelBuilder;
use crate::core::flags::{Flags, Parsed};
use crate::core::runtime::Runtime;
use crate::core::signals::{self, Signal};
use crate::core::KernelConfig;
use crate::error::{CompoundError, RuntimeError};
use crate::tasks::TaskRef;
use crate::units::{NewContext, Registry, UnitConfig, Units};

/// Name of the implicit logging unit.
pub const LOGGER: &str = "logger";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initialized,
    Started,
    Failed,
    Running,
    Finished,
    Closed,
}

impl State {
    fn as_str(&self) -> &'static str {
        match self {
            State::Initialized => "initialized",
            State::Started => "started",
            State::Failed => "failed",
            State::Running => "running",
            State::Finished => "finished",
            State::Closed => "closed",
        }
    }
}

/// Application kernel.
pub struct Kernel {
    cfg: KernelConfig,
    configs: Vec<Arc<UnitConfig>>,
    flags: Flags,
    units: Arc<Units>,
    token: CancellationToken,
    state: State,
    closed: Option<Result<(), RuntimeError>>,
}

impl Kernel {
    /// Creates a builder with the given configuration.
    pub fn builder(cfg: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(cfg)
    }

    /// Runs an application against the global registry: `init`, `start` with the
    /// process arguments, `run` with `tasks`, then `close`.
    ///
    /// Returns `0` on success or signal-driven shutdown, `1` for `--help` and
    /// `--version`, `255` on any other error.
    pub fn main<I, S>(cfg: KernelConfig, units: I, tasks: Vec<TaskRef>) -> std::process::ExitCode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Kernel::builder(cfg)
            .with_units(units)
            .main(std::env::args_os().skip(1), tasks)
    }

    pub(crate) fn init<S: AsRef<str>>(
        cfg: KernelConfig,
        registry: &Registry,
        names: &[S],
    ) -> Result<Self, RuntimeError> {
        if cfg.name.is_empty() {
            return Err(RuntimeError::bad_parameter("application name is empty"));
        }
        let mut wanted = Vec::with_capacity(names.len() + 1);
        wanted.push(LOGGER);
        wanted.extend(names.iter().map(|n| n.as_ref()));

        let configs = registry.with_dependencies(&wanted)?;
        let mut flags = Flags::new(cfg.name.clone())
            .with_version(cfg.version.clone())
            .with_about(cfg.about.clone());
        for config in &configs {
            config.run_configure(&mut flags)?;
        }
        log::trace!(
            "{} resolved units: {:?}",
            cfg.name,
            configs.iter().map(|c| c.name()).collect::<Vec<_>>()
        );

        Ok(Self {
            cfg,
            configs,
            flags,
            units: Units::new(),
            token: CancellationToken::new(),
            state: State::Initialized,
            closed: None,
        })
    }

    fn expect(&self, want: State, op: &str) -> Result<(), RuntimeError> {
        if self.state == want {
            Ok(())
        } else {
            Err(RuntimeError::out_of_order(format!(
                "{op} called while kernel is {}",
                self.state.as_str()
            )))
        }
    }

    /// Parses `args` (program name excluded) and constructs every unit in dependency order.
    ///
    /// `--help` prints usage and `--version` prints version metadata to stderr; both
    /// return an error so the caller exits without running. Units built before a
    /// failing `new` hook stay registered for [`close`](Self::close).
    pub fn start<I, T>(&mut self, args: I) -> Result<(), RuntimeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        self.expect(State::Initialized, "start")?;
        self.state = State::Failed;

        match self.flags.parse(args)? {
            Parsed::Help => {
                eprint!("{}", self.flags.usage());
                return Err(RuntimeError::Help);
            }
            Parsed::Version => {
                eprintln!("{}", self.flags.version_line());
                return Err(RuntimeError::Version);
            }
            Parsed::Run => {}
        }

        for config in &self.configs {
            let ctx = NewContext {
                config: &self.cfg,
                unit: config.name(),
                flags: &self.flags,
                units: &self.units,
                shutdown: &self.token,
            };
            if let Some(unit) = config.run_new(&ctx)? {
                log::debug!("unit {} constructed: {unit:?}", config.name());
                self.units.push(config.name(), config.get_priority(), unit);
            }
        }

        self.state = State::Started;
        Ok(())
    }

    /// Runs `tasks[0]` in the calling future and `tasks[1..]` in the background.
    ///
    /// Task 0 receives the kernel token as its stop signal.
    pub async fn run(&mut self, tasks: Vec<TaskRef>) -> Result<(), RuntimeError> {
        self.expect(State::Started, "run")?;
        self.state = State::Running;
        let result = Runtime::new(Arc::clone(&self.units))
            .with_stop(self.token.clone())
            .with_grace(self.cfg.grace)
            .run(tasks)
            .await;
        self.state = State::Finished;
        result
    }

    /// Waits for one of `signals` or for `token` to be cancelled.
    ///
    /// See [`wait_for_signal`](crate::wait_for_signal).
    pub async fn wait_for_signal(&self, token: &CancellationToken, signals: &[Signal]) -> RuntimeError {
        signals::wait_for_signal(token, signals).await
    }

    /// Closes every constructed unit, dependents first. Idempotent: later calls
    /// return the first call's result.
    pub fn close(&mut self) -> Result<(), RuntimeError> {
        if let Some(result) = &self.closed {
            return result.clone();
        }

        let mut errors = CompoundError::new();
        for (name, unit) in self.units.drain_reverse() {
            match unit.close() {
                Ok(()) => log::debug!("unit {name} closed"),
                Err(e) => {
                    log::warn!("unit {name} close failed: {e}");
                    errors.push(RuntimeError::unit(name, e));
                }
            }
        }
        let result = errors.into_result();
        self.state = State::Closed;
        self.closed = Some(result.clone());
        result
    }

    /// Stops the main task (and with it the run).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token whose cancellation stops the main task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Positional command-line arguments left after flag parsing.
    pub fn args(&self) -> Vec<String> {
        self.flags.args()
    }

    /// Parsed flags.
    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// Constructed units.
    pub fn units(&self) -> &Arc<Units> {
        &self.units
    }

    /// Configuration the kernel was built from.
    pub fn config(&self) -> &KernelConfig {
        &self.cfg
    }

    /// Names of the resolved unit closure, in construction order.
    pub fn unit_names(&self) -> Vec<&str> {
        self.configs.iter().map(|c| c.name()).collect()
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("{}: close on drop: {e}", self.cfg.name);
        }
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.cfg.name)
            .field("state", &self.state.as_str())
            .field("units", &self.unit_names())
            .finish()
    }
}

/// Full application lifecycle; returns the exit code.
pub(crate) async fn lifecycle<I, T>(builder: KernelBuilder, args: I, tasks: Vec<TaskRef>) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let app = builder.config().name.clone();
    let signals = builder.config().signals.clone();

    let mut kernel = match builder.init() {
        Ok(kernel) => kernel,
        Err(e) => return report(&app, &e),
    };

    let outcome = match kernel.start(args) {
        Ok(()) => {
            let token = kernel.shutdown_token();
            let watcher = tokio::spawn(async move {
                if let RuntimeError::SignalCaught { signal } =
                    signals::wait_for_signal(&token, &signals).await
                {
                    log::info!("{signal} received, shutting down");
                    token.cancel();
                }
            });
            let res = kernel.run(tasks).await;
            watcher.abort();
            res
        }
        Err(e) => Err(e),
    };
    let closed = kernel.close();

    match (outcome, closed) {
        (Err(e), _) if !e.is_shutdown() => report(&app, &e),
        (_, Err(e)) => report(&app, &e),
        _ => 0,
    }
}

fn report(app: &str, err: &RuntimeError) -> u8 {
    match err {
        RuntimeError::Help | RuntimeError::Version => {}
        RuntimeError::Unit { .. } => eprintln!("{err}"),
        other => eprintln!("{app}: {other}"),
    }
    err.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::error::{TaskError, UnitError};
    use crate::tasks::{TaskContext, TaskFn};
    use crate::units::Unit;

    #[derive(Debug)]
    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail_close: bool,
    }

    impl Unit for Recorder {
        fn close(&self) -> Result<(), UnitError> {
            self.log.lock().unwrap().push(format!("close {}", self.name));
            if self.fail_close {
                return Err(format!("{} refused", self.name).into());
            }
            Ok(())
        }
    }

    fn recorder(name: &'static str, requires: &[&'static str], log: &Arc<Mutex<Vec<String>>>) -> UnitConfig {
        let log = Arc::clone(log);
        UnitConfig::new(name)
            .requires(requires.iter().copied())
            .on_new(move |ctx| {
                log.lock().unwrap().push(format!("new {}", ctx.unit()));
                Ok(Arc::new(Recorder {
                    name: ctx.unit().to_string(),
                    log: Arc::clone(&log),
                    fail_close: ctx.unit() == "b",
                }))
            })
    }

    fn registry(log: &Arc<Mutex<Vec<String>>>) -> Arc<Registry> {
        let reg = Registry::with_builtins();
        reg.register(recorder("a", &[], log)).unwrap();
        reg.register(recorder("b", &["a"], log)).unwrap();
        reg.register(recorder("c", &["b", "bus"], log)).unwrap();
        Arc::new(reg)
    }

    fn kernel(log: &Arc<Mutex<Vec<String>>>) -> Kernel {
        Kernel::builder(KernelConfig::new("test"))
            .with_registry(registry(log))
            .with_units(["c"])
            .init()
            .unwrap()
    }

    fn noop() -> TaskRef {
        TaskFn::arc("noop", |_ctx: TaskContext| async { Ok::<(), TaskError>(()) })
    }

    #[tokio::test]
    async fn logger_is_always_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let k = kernel(&log);
        assert_eq!(k.unit_names(), ["logger", "a", "b", "bus", "c"]);
    }

    #[tokio::test]
    async fn units_close_in_reverse_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut k = kernel(&log);
        k.start(Vec::<String>::new()).unwrap();
        k.run(vec![noop()]).await.unwrap();

        let first = k.close();
        let second = k.close();
        assert!(matches!(&first, Err(RuntimeError::Unit { unit, .. }) if unit == "b"));
        assert_eq!(first.unwrap_err().to_string(), second.unwrap_err().to_string());

        assert_eq!(
            *log.lock().unwrap(),
            ["new a", "new b", "new c", "close c", "close b", "close a"]
        );
        assert!(k.units().is_empty());
    }

    #[tokio::test]
    async fn out_of_order_calls() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut k = kernel(&log);
        assert!(matches!(
            k.run(vec![noop()]).await,
            Err(RuntimeError::OutOfOrder { .. })
        ));
        k.start(Vec::<String>::new()).unwrap();
        assert!(matches!(
            k.start(Vec::<String>::new()),
            Err(RuntimeError::OutOfOrder { .. })
        ));
        k.run(vec![noop()]).await.unwrap();
        assert!(matches!(
            k.run(vec![noop()]).await,
            Err(RuntimeError::OutOfOrder { .. })
        ));
    }

    #[tokio::test]
    async fn failed_new_keeps_constructed_units() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let reg = registry(&log);
        reg.register(
            UnitConfig::new("broken")
                .requires(["a"])
                .on_new(|_ctx| Err("no hardware".into())),
        )
        .unwrap();
        let mut k = Kernel::builder(KernelConfig::new("test"))
            .with_registry(reg)
            .with_units(["broken", "c"])
            .init()
            .unwrap();

        match k.start(Vec::<String>::new()) {
            Err(e @ RuntimeError::Unit { .. }) => assert_eq!(e.to_string(), "broken: no hardware"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            k.run(vec![noop()]).await,
            Err(RuntimeError::OutOfOrder { .. })
        ));
        k.close().unwrap();
        assert_eq!(*log.lock().unwrap(), ["new a", "close a"]);
    }

    #[tokio::test]
    async fn configure_hooks_declare_flags() {
        let seen = Arc::new(AtomicUsize::new(0));
        let reg = Registry::with_builtins();
        let s = Arc::clone(&seen);
        reg.register(
            UnitConfig::new("display")
                .on_configure(|flags| {
                    flags.uint("display.width", 800, "Display width")?;
                    Ok(())
                })
                .on_new(move |ctx| {
                    let width = ctx.flags().get_uint("display.width").unwrap_or(0);
                    s.store(width as usize, Ordering::SeqCst);
                    Ok(Arc::new(crate::events::EventBus::new()))
                }),
        )
        .unwrap();

        let mut k = Kernel::builder(KernelConfig::new("test"))
            .with_registry(Arc::new(reg))
            .with_units(["display"])
            .init()
            .unwrap();
        k.start(["--display.width=1024", "extra"]).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1024);
        assert_eq!(k.args(), ["extra"]);
    }

    #[tokio::test]
    async fn help_and_version_stop_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut k = kernel(&log);
        assert!(matches!(k.start(["--help"]), Err(RuntimeError::Help)));
        let mut k = kernel(&log);
        assert!(matches!(k.start(["--version"]), Err(RuntimeError::Version)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_stops_main_task() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut k = kernel(&log);
        k.start(Vec::<String>::new()).unwrap();
        let main: TaskRef = TaskFn::arc("main", |ctx: TaskContext| async move {
            ctx.stop.cancelled().await;
            Err::<(), _>(TaskError::Canceled)
        });
        k.cancel();
        k.run(vec![main]).await.unwrap();
    }

    #[tokio::test]
    async fn drop_closes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut k = kernel(&log);
            k.start(Vec::<String>::new()).unwrap();
        }
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("close a"));
    }
}
