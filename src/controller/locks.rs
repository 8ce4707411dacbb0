//! Per-key mutual exclusion
//!
//! Lifecycle actions on one destination are serialized; actions on
//! different destinations never wait for each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Lazily created mutex per key
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex of `key`; lock it to serialize on that key.
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Run `f` while holding the lock of `key`.
    pub fn with<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.get(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
