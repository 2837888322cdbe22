use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::Arc;

use crate::core::kernel::{self, Kernel};
use crate::core::KernelConfig;
use crate::error::RuntimeError;
use crate::tasks::TaskRef;
use crate::units::Registry;

/// Builder for constructing a [`Kernel`].
pub struct KernelBuilder {
    cfg: KernelConfig,
    registry: Option<Arc<Registry>>,
    units: Vec<String>,
}

impl KernelBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: KernelConfig) -> Self {
        Self {
            cfg,
            registry: None,
            units: Vec::new(),
        }
    }

    /// Resolves units from `registry` instead of the process-global one.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Adds unit names to instantiate (their dependencies are pulled in).
    pub fn with_units<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.units.extend(names.into_iter().map(Into::into));
        self
    }

    /// Resolves the dependency closure and runs every configure hook.
    ///
    /// The built-in `logger` unit is always part of the closure.
    pub fn init(self) -> Result<Kernel, RuntimeError> {
        let registry = self.registry.unwrap_or_else(Registry::global);
        Kernel::init(self.cfg, &registry, &self.units)
    }

    /// Runs the whole lifecycle on a fresh multi-thread tokio runtime and returns
    /// the process exit code.
    ///
    /// `args` excludes the program name. Task 0 runs on the calling thread.
    pub fn main<I, T>(self, args: I, tasks: Vec<TaskRef>) -> ExitCode
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        ExitCode::from(self.exit_code(args, tasks))
    }

    /// Same as [`main`](Self::main), returning the raw code: `0` on success or
    /// signal-driven shutdown, `1` for `--help` / `--version`, `255` otherwise.
    pub fn exit_code<I, T>(self, args: I, tasks: Vec<TaskRef>) -> u8
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                eprintln!("{}: cannot start async runtime: {e}", self.cfg.name);
                return 255;
            }
        };
        rt.block_on(kernel::lifecycle(self, args, tasks))
    }

    pub(crate) fn config(&self) -> &KernelConfig {
        &self.cfg
    }
}
