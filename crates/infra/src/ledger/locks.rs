//! Per-key mutual exclusion for read-modify-write cycles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use stockledger_inventory::StockKey;

/// Lock table keyed by (product, warehouse).
///
/// Holding a key never blocks other keys. Entries are dropped once no thread
/// holds or waits on them, so the table only grows with keys in flight.
#[derive(Debug, Default)]
pub struct KeyLocks {
    table: Mutex<HashMap<StockKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_key<T>(&self, key: StockKey, f: impl FnOnce() -> T) -> T {
        let slot = self.acquire_slot(key);
        let result = {
            // The guarded value is `()`, so a poisoned lock carries no bad state.
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release_slot(key, slot);
        result
    }

    /// Keys currently held or waited on.
    pub fn in_flight(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn acquire_slot(&self, key: StockKey) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(key).or_default().clone()
    }

    fn release_slot(&self, key: StockKey, slot: Arc<Mutex<()>>) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // Table + our clone: nobody else is waiting.
        if Arc::strong_count(&slot) == 2 {
            table.remove(&key);
        }
    }
}
