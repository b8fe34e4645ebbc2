//! Per-key critical sections.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Lazily created mutex per key. Updates for different keys never contend
/// beyond the short table lookup.
pub struct KeyLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Hash + Eq + Clone> KeyLocks<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with<R>(&self, key: &K, f: impl FnOnce() -> R) -> R {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key.clone()).or_default().clone()
        };

        let result = {
            let _guard = slot.lock();
            f()
        };

        // Only the table and this caller hold the slot: nobody is waiting.
        let mut slots = self.slots.lock();
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
        result
    }

    /// Number of keys currently holding a slot.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Hash + Eq + Clone> Default for KeyLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
