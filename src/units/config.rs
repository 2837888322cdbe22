//! # Unit declaration.
//!
//! [`UnitConfig`] describes how to build one unit: its name, the names it depends
//! on, an optional `configure` hook (declares command-line flags, called once
//! before construction) and an optional `new` hook (builds the instance once its
//! dependencies exist).
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use unitvisor::{Unit, UnitConfig};
//!
//! #[derive(Debug)]
//! struct Display { width: u64 }
//! impl Unit for Display {}
//!
//! let cfg = UnitConfig::new("display")
//!     .requires(["gpio", "bus"])
//!     .on_configure(|flags| {
//!         flags.uint("display.width", 800, "Display width")?;
//!         Ok(())
//!     })
//!     .on_new(|ctx| {
//!         let width = ctx.flags().get_uint("display.width").unwrap_or(800);
//!         Ok(Arc::new(Display { width }))
//!     });
//!
//! assert_eq!(cfg.name(), "display");
//! assert_eq!(cfg.dependencies(), ["gpio", "bus"]);
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{Flags, KernelConfig};
use crate::error::{RuntimeError, UnitError};
use crate::units::{Units, UnitRef};

type ConfigureHook = Arc<dyn Fn(&mut Flags) -> Result<(), UnitError> + Send + Sync>;
type NewHook = Arc<dyn Fn(&NewContext<'_>) -> Result<UnitRef, UnitError> + Send + Sync>;

/// Declaration of a unit: name, dependencies, hooks and priority.
///
/// Immutable once registered; the registry hands out `Arc<UnitConfig>`.
#[derive(Clone)]
pub struct UnitConfig {
    name: Cow<'static, str>,
    requires: Vec<Cow<'static, str>>,
    configure: Option<ConfigureHook>,
    new: Option<NewHook>,
    priority: i32,
}

impl UnitConfig {
    /// Creates a config with no dependencies, no hooks and priority `0`.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            configure: None,
            new: None,
            priority: 0,
        }
    }

    /// Appends dependency names, in order.
    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sets the hook that declares this unit's flags.
    pub fn on_configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Flags) -> Result<(), UnitError> + Send + Sync + 'static,
    {
        self.configure = Some(Arc::new(f));
        self
    }

    /// Sets the hook that constructs the instance.
    pub fn on_new<F>(mut self, f: F) -> Self
    where
        F: Fn(&NewContext<'_>) -> Result<UnitRef, UnitError> + Send + Sync + 'static,
    {
        self.new = Some(Arc::new(f));
        self
    }

    /// Sets the priority; among configs sharing a name, higher priority wins lookups.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dependency names, in declaration order.
    pub fn dependencies(&self) -> Vec<&str> {
        self.requires.iter().map(|s| s.as_ref()).collect()
    }

    /// Priority used to order configs sharing a name.
    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    /// True if a `new` hook is set.
    pub fn has_new(&self) -> bool {
        self.new.is_some()
    }

    /// Checks the declaration before it enters a registry.
    pub(crate) fn validate(&self) -> Result<(), RuntimeError> {
        if self.name.is_empty() {
            return Err(RuntimeError::bad_parameter("unit name is empty"));
        }
        for dep in &self.requires {
            if dep.is_empty() {
                return Err(RuntimeError::bad_parameter(format!(
                    "unit {:?} has an empty dependency name",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Runs the configure hook, if any.
    pub(crate) fn run_configure(&self, flags: &mut Flags) -> Result<(), RuntimeError> {
        match &self.configure {
            Some(hook) => hook(flags).map_err(|e| RuntimeError::unit(self.name(), e)),
            None => Ok(()),
        }
    }

    /// Runs the new hook. `Ok(None)` when the config has no hook.
    pub(crate) fn run_new(&self, ctx: &NewContext<'_>) -> Result<Option<UnitRef>, RuntimeError> {
        match &self.new {
            Some(hook) => hook(ctx)
                .map(Some)
                .map_err(|e| RuntimeError::unit(self.name(), e)),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for UnitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitConfig")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("priority", &self.priority)
            .field("configure", &self.configure.is_some())
            .field("new", &self.new.is_some())
            .finish()
    }
}

/// What a `new` hook can see while constructing its unit.
pub struct NewContext<'a> {
    pub(crate) config: &'a KernelConfig,
    pub(crate) unit: &'a str,
    pub(crate) flags: &'a Flags,
    pub(crate) units: &'a Arc<Units>,
    pub(crate) shutdown: &'a CancellationToken,
}

impl<'a> NewContext<'a> {
    /// Application name given to the kernel.
    pub fn app(&self) -> &str {
        &self.config.name
    }

    /// Configuration the kernel was built from.
    pub fn config(&self) -> &KernelConfig {
        self.config
    }

    /// Name of the unit being constructed.
    pub fn unit(&self) -> &str {
        self.unit
    }

    /// Parsed command-line flags.
    pub fn flags(&self) -> &Flags {
        self.flags
    }

    /// Units constructed so far (every dependency of this unit is among them).
    pub fn units(&self) -> &Arc<Units> {
        self.units
    }

    /// Kernel cancellation token; cancelling it delivers stop to the main task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_names() {
        assert!(matches!(
            UnitConfig::new("").validate(),
            Err(RuntimeError::BadParameter { .. })
        ));
        assert!(matches!(
            UnitConfig::new("a").requires([""]).validate(),
            Err(RuntimeError::BadParameter { .. })
        ));
        // a self-dependency is a cycle, reported at resolution
        assert!(UnitConfig::new("a").requires(["a"]).validate().is_ok());
        assert!(UnitConfig::new("a").requires(["b"]).validate().is_ok());
    }

    #[test]
    fn builder_keeps_dependency_order() {
        let cfg = UnitConfig::new("x").requires(["c", "a"]).requires(["b"]);
        assert_eq!(cfg.dependencies(), ["c", "a", "b"]);
        assert_eq!(cfg.get_priority(), 0);
        assert!(!cfg.has_new());
    }
}
