//! # Units: declarations, registry and constructed instances.
//!
//! - [`Unit`] - capability trait every constructed unit satisfies
//! - [`UnitConfig`] - declaration (name, dependencies, hooks, priority)
//! - [`Registry`] - catalog of declarations plus dependency closure
//! - [`Units`] - constructed instances with lookup by name
//!
//! ```text
//! UnitConfig ──register──► Registry ──with_dependencies──► [cfg, cfg, ...] (leaf first)
//!                                                             │ new hook
//!                                                             ▼
//!                                                           Units ──► tasks, new hooks
//! ```

mod config;
mod instances;
mod registry;
mod unit;

pub use config::{NewContext, UnitConfig};
pub use instances::Units;
pub use registry::{register_unit, Registry};
pub use unit::{downcast, AsAny, Unit, UnitRef};
