//! Election unit registry
//!
//! Get-or-create accessor over the units of one process. A destination maps
//! to at most one unit; later lookups reuse it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::unit::ElectionUnit;

/// Units keyed by destination
#[derive(Default)]
pub struct UnitRegistry {
    units: Mutex<HashMap<String, Arc<ElectionUnit>>>,
}

impl UnitRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn units(&self) -> MutexGuard<'_, HashMap<String, Arc<ElectionUnit>>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the unit for `destination`, building it on first reference.
    ///
    /// `build` runs under the registry lock and must not block.
    pub fn get_or_create<F>(&self, destination: &str, build: F) -> Arc<ElectionUnit>
    where
        F: FnOnce() -> Arc<ElectionUnit>,
    {
        self.units()
            .entry(destination.to_string())
            .or_insert_with(build)
            .clone()
    }

    /// The unit for `destination`, if one was built
    pub fn get(&self, destination: &str) -> Option<Arc<ElectionUnit>> {
        self.units().get(destination).cloned()
    }

    /// Snapshot of every unit, sorted by destination
    pub fn all(&self) -> Vec<Arc<ElectionUnit>> {
        let mut units: Vec<Arc<ElectionUnit>> = self.units().values().cloned().collect();
        units.sort_by(|a, b| a.destination().cmp(b.destination()));
        units
    }

    /// Forget every unit.
    pub fn clear(&self) {
        self.units().clear();
    }
}
