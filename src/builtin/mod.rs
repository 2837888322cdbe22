//! Built-in units present in every registry created with
//! [`Registry::with_builtins`](crate::Registry::with_builtins).
//!
//! | name     | requires | instance              |
//! |----------|----------|-----------------------|
//! | `logger` |          | [`Logger`]            |
//! | `bus`    | `logger` | [`EventBus`]          |
//! | `timer`  | `bus`    | [`Timers`]            |
//!
//! `logger` is implicitly part of every kernel.

mod logger;

use std::sync::Arc;

pub use logger::{Logger, DEBUG_FLAG};

use crate::error::RuntimeError;
use crate::events::EventBus;
use crate::timers::Timers;
use crate::units::UnitConfig;

/// Name of the built-in bus unit.
pub const BUS: &str = "bus";
/// Name of the built-in timer unit.
pub const TIMER: &str = "timer";

pub(crate) fn configs() -> Vec<UnitConfig> {
    vec![
        UnitConfig::new(crate::core::LOGGER)
            .on_configure(|flags| {
                flags.bool(DEBUG_FLAG, false, "Enable debug logging")?;
                Ok(())
            })
            .on_new(|ctx| Ok(Arc::new(Logger::new(ctx)))),
        UnitConfig::new(BUS)
            .requires([crate::core::LOGGER])
            .on_new(|_ctx| Ok(Arc::new(EventBus::new()))),
        UnitConfig::new(TIMER).requires([BUS]).on_new(|ctx| {
            let bus = ctx
                .units()
                .get::<EventBus>(BUS)
                .ok_or_else(|| RuntimeError::internal("bus unit missing"))?;
            let timers = Timers::new(bus, ctx.config().timer_queue)?;
            Ok(Arc::new(timers))
        }),
    ]
}
