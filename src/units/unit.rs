//! # Unit abstraction.
//!
//! A [`Unit`] is a constructed, scoped resource with an idempotent
//! [`close`](Unit::close). The kernel stores units as `Arc<dyn Unit>`; callers
//! narrow them to a concrete type at lookup time with [`downcast`].
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use unitvisor::{Unit, UnitError, UnitRef};
//!
//! #[derive(Debug)]
//! struct Gpio;
//!
//! impl Unit for Gpio {
//!     fn close(&self) -> Result<(), UnitError> {
//!         Ok(())
//!     }
//! }
//!
//! let unit: UnitRef = Arc::new(Gpio);
//! assert!(unitvisor::downcast::<Gpio>(unit).is_some());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::UnitError;

/// Shared handle to a constructed unit.
pub type UnitRef = Arc<dyn Unit>;

/// Conversion to `Arc<dyn Any>` for typed lookup; implemented for every sized unit.
pub trait AsAny: Send + Sync + 'static {
    /// Converts the shared handle into `Arc<dyn Any>`.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> AsAny for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// # Constructed unit instance.
///
/// The diagnostic form of a unit is its `Debug` output.
///
/// Units are not locked by the kernel: a unit that mutates shared state must use
/// its own interior synchronisation.
pub trait Unit: AsAny + fmt::Debug {
    /// Releases the unit's resources.
    ///
    /// Called exactly once by the kernel, in reverse construction order, but must
    /// tolerate repeated calls from user code.
    fn close(&self) -> Result<(), UnitError> {
        Ok(())
    }
}

/// Narrows a unit handle to a concrete type.
pub fn downcast<T: Unit>(unit: UnitRef) -> Option<Arc<T>> {
    unit.as_any_arc().downcast::<T>().ok()
}
