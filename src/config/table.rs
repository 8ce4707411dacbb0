//! Resolved instance configs keyed by destination

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use super::instance::InstanceConfig;

/// Destination → resolved `InstanceConfig`
///
/// Inserts and removes on different keys never interfere; readers get
/// clones.
#[derive(Debug, Default)]
pub struct InstanceTable {
    configs: RwLock<HashMap<String, InstanceConfig>>,
}

impl InstanceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config of one destination
    pub fn get(&self, destination: &str) -> Option<InstanceConfig> {
        self.configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(destination)
            .cloned()
    }

    /// Whether a config is loaded for the destination
    pub fn contains(&self, destination: &str) -> bool {
        self.configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(destination)
    }

    /// Insert or replace; returns the replaced config.
    pub fn insert(&self, destination: &str, config: InstanceConfig) -> Option<InstanceConfig> {
        self.configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(destination.to_string(), config)
    }

    /// Remove; returns the removed config.
    pub fn remove(&self, destination: &str) -> Option<InstanceConfig> {
        self.configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(destination)
    }

    /// Sorted copy of the whole table
    pub fn snapshot(&self) -> BTreeMap<String, InstanceConfig> {
        self.configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of loaded destinations
    pub fn len(&self) -> usize {
        self.configs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no destination is loaded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every config.
    pub fn clear(&self) {
        self.configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
