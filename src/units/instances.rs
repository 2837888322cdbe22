//! # Constructed unit instances.
//!
//! [`Units`] holds every unit the kernel has constructed, in construction order,
//! and answers lookups by name. Lookups are memoised; the memo is dropped whenever
//! the set changes and when the set is cleared at teardown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::units::{downcast, Unit, UnitRef};

struct Instance {
    name: String,
    priority: i32,
    unit: UnitRef,
}

/// Constructed units, shared with every task and every `new` hook.
#[derive(Default)]
pub struct Units {
    instances: RwLock<Vec<Instance>>,
    memo: Mutex<HashMap<String, Vec<UnitRef>>>,
}

impl Units {
    /// Creates an empty set.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn memo(&self) -> MutexGuard<'_, HashMap<String, Vec<UnitRef>>> {
        self.memo.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Appends a freshly constructed unit.
    pub(crate) fn push(&self, name: &str, priority: i32, unit: UnitRef) {
        let mut instances = self.instances.write().unwrap_or_else(|p| p.into_inner());
        instances.push(Instance {
            name: name.to_string(),
            priority,
            unit,
        });
        self.memo().clear();
    }

    /// Removes every instance and returns them in reverse construction order.
    pub(crate) fn drain_reverse(&self) -> Vec<(String, UnitRef)> {
        let mut instances = self.instances.write().unwrap_or_else(|p| p.into_inner());
        let drained: Vec<(String, UnitRef)> = instances
            .drain(..)
            .rev()
            .map(|i| (i.name, i.unit))
            .collect();
        self.memo().clear();
        drained
    }

    /// Returns every constructed instance for `name`, highest priority first.
    pub fn instances_by_name(&self, name: &str) -> Vec<UnitRef> {
        if let Some(hit) = self.memo().get(name) {
            return hit.clone();
        }
        let instances = self.instances.read().unwrap_or_else(|p| p.into_inner());
        let mut found: Vec<&Instance> = instances.iter().filter(|i| i.name == name).collect();
        // stable: equal priorities keep construction order
        found.sort_by(|a, b| b.priority.cmp(&a.priority));
        let units: Vec<UnitRef> = found.into_iter().map(|i| Arc::clone(&i.unit)).collect();
        // Filled under the read guard so a concurrent push cannot be overtaken.
        if !units.is_empty() {
            self.memo().insert(name.to_string(), units.clone());
        }
        drop(instances);
        units
    }

    /// Returns the highest-priority instance for `name`.
    pub fn instance(&self, name: &str) -> Option<UnitRef> {
        self.instances_by_name(name).into_iter().next()
    }

    /// Returns the highest-priority instance for `name`, narrowed to `T`.
    ///
    /// `None` if nothing is constructed under that name or it is not a `T`.
    pub fn get<T: Unit>(&self, name: &str) -> Option<Arc<T>> {
        self.instance(name).and_then(downcast::<T>)
    }

    /// Names of constructed units, in construction order.
    pub fn names(&self) -> Vec<String> {
        let instances = self.instances.read().unwrap_or_else(|p| p.into_inner());
        instances.iter().map(|i| i.name.clone()).collect()
    }

    /// Number of constructed units.
    pub fn len(&self) -> usize {
        self.instances.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// True if nothing is constructed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Units").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Widget(u32);
    impl Unit for Widget {}

    #[derive(Debug)]
    struct Other;
    impl Unit for Other {}

    #[test]
    fn lookup_prefers_highest_priority() {
        let units = Units::new();
        units.push("display", 1, Arc::new(Widget(1)));
        units.push("display", 7, Arc::new(Widget(7)));
        units.push("display", 1, Arc::new(Widget(2)));

        let top = units.get::<Widget>("display").unwrap();
        assert_eq!(top.0, 7);

        let all: Vec<u32> = units
            .instances_by_name("display")
            .into_iter()
            .filter_map(downcast::<Widget>)
            .map(|p| p.0)
            .collect();
        assert_eq!(all, [7, 1, 2]);
    }

    #[test]
    fn typed_lookup_rejects_wrong_type() {
        let units = Units::new();
        units.push("x", 0, Arc::new(Other));
        assert!(units.get::<Widget>("x").is_none());
        assert!(units.get::<Other>("x").is_some());
        assert!(units.instance("y").is_none());
    }

    #[test]
    fn lookups_racing_pushes_end_up_current() {
        for _ in 0..50 {
            let units = Units::new();
            units.push("w", 0, Arc::new(Widget(0)));
            let reader = {
                let units = Arc::clone(&units);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let _ = units.instances_by_name("w");
                    }
                })
            };
            for n in 1..=20 {
                units.push("w", 0, Arc::new(Widget(n)));
                std::thread::yield_now();
            }
            reader.join().unwrap();
            assert_eq!(units.instances_by_name("w").len(), 21);
        }
    }

    #[test]
    fn drain_invalidates_memo() {
        let units = Units::new();
        units.push("a", 0, Arc::new(Widget(1)));
        units.push("b", 0, Arc::new(Widget(2)));
        assert!(units.instance("a").is_some());

        let drained: Vec<String> = units.drain_reverse().into_iter().map(|(n, _)| n).collect();
        assert_eq!(drained, ["b", "a"]);
        assert!(units.instance("a").is_none());
        assert!(units.is_empty());
    }
}
