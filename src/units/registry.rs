//! # Unit registry and dependency resolution.
//!
//! [`Registry`] maps unit names to one or more [`UnitConfig`]s (ordered by
//! priority, highest first) and computes the dependency closure of a set of names.
//!
//! ## Resolution
//! ```text
//! with_dependencies(["app"])
//!   visit(app)            grey
//!     visit(display)      grey
//!       visit(gpio)       grey → black → emit gpio
//!     display             black → emit display
//!     visit(gpio)         already black, skip
//!   app                   black → emit app
//!
//! visiting a grey name again → CyclicDependency
//! unknown name              → UnitNotFound
//! ```
//!
//! ## Rules
//! - Output order is stable: dependencies are visited in declaration order and
//!   roots in input order.
//! - All configs sharing a name are emitted together, highest priority first, after
//!   the dependencies of every one of them.
//! - The registry is append-only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;

use crate::error::RuntimeError;
use crate::units::UnitConfig;

static GLOBAL: Lazy<Arc<Registry>> = Lazy::new(|| Arc::new(Registry::with_builtins()));

/// Registers a config in the process-global registry.
///
/// Call during program initialisation, before the kernel is built.
pub fn register_unit(cfg: UnitConfig) -> Result<(), RuntimeError> {
    Registry::global().register(cfg)
}

/// Append-only catalog of unit configs.
#[derive(Default)]
pub struct Registry {
    configs: Mutex<HashMap<String, Vec<Arc<UnitConfig>>>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Grey,
    Black,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `logger`, `bus` and `timer` units.
    pub fn with_builtins() -> Self {
        let reg = Self::new();
        for cfg in crate::builtin::configs() {
            // Built-in declarations are well-formed.
            let _ = reg.register(cfg);
        }
        reg
    }

    /// The process-global registry (pre-populated with built-ins).
    pub fn global() -> Arc<Registry> {
        Arc::clone(&GLOBAL)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Arc<UnitConfig>>>> {
        self.configs.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Inserts a config. Configs sharing a name are kept ordered by priority
    /// (highest first); equal priorities keep registration order.
    pub fn register(&self, cfg: UnitConfig) -> Result<(), RuntimeError> {
        cfg.validate()?;
        let mut configs = self.lock();
        let list = configs.entry(cfg.name().to_string()).or_default();
        let pos = list
            .iter()
            .position(|c| c.get_priority() < cfg.get_priority())
            .unwrap_or(list.len());
        log::trace!("register unit {:?} priority={}", cfg.name(), cfg.get_priority());
        list.insert(pos, Arc::new(cfg));
        Ok(())
    }

    /// Returns every config registered under `name`, highest priority first.
    pub fn by_name(&self, name: &str) -> Vec<Arc<UnitConfig>> {
        self.lock().get(name).cloned().unwrap_or_default()
    }

    /// Returns sorted list of registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Computes the transitive closure of `names`, ordered so that every config
    /// appears after all of its dependencies.
    ///
    /// Repeated names are resolved once.
    pub fn with_dependencies<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<Arc<UnitConfig>>, RuntimeError> {
        // Snapshot under the lock; resolution itself runs unlocked.
        let configs = self.lock().clone();
        let mut marks: HashMap<String, Mark> = HashMap::new();
        let mut out = Vec::new();
        for name in names {
            visit(name.as_ref(), &configs, &mut marks, &mut out)?;
        }
        Ok(out)
    }
}

fn visit(
    name: &str,
    configs: &HashMap<String, Vec<Arc<UnitConfig>>>,
    marks: &mut HashMap<String, Mark>,
    out: &mut Vec<Arc<UnitConfig>>,
) -> Result<(), RuntimeError> {
    match marks.get(name) {
        Some(Mark::Black) => return Ok(()),
        Some(Mark::Grey) => {
            return Err(RuntimeError::CyclicDependency {
                name: name.to_string(),
            })
        }
        None => {}
    }
    let list = match configs.get(name) {
        Some(list) if !list.is_empty() => list,
        _ => {
            return Err(RuntimeError::UnitNotFound {
                name: name.to_string(),
            })
        }
    };

    marks.insert(name.to_string(), Mark::Grey);
    for cfg in list {
        for dep in cfg.dependencies() {
            visit(dep, configs, marks, out)?;
        }
    }
    marks.insert(name.to_string(), Mark::Black);
    out.extend(list.iter().cloned());
    Ok(())
}
