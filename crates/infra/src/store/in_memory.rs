use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use chrono::NaiveDate;

use stockledger_core::Versioned;
use stockledger_inventory::{MovementRecord, StockKey, StockRecord};

use super::query::{MovementFilter, MovementPage, Pagination, StockFilter};
use super::r#trait::{StockCommit, StockStore, StoreError};

#[derive(Debug, Default)]
struct Ledger {
    stock: HashMap<StockKey, StockRecord>,
    /// Commit order; queries read it back to front.
    movements: Vec<MovementRecord>,
    numbers: HashSet<String>,
}

/// In-memory stock store.
///
/// Intended for tests/dev. A single write lock covers the record and the
/// movement log, which makes `commit` atomic.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    ledger: RwLock<Ledger>,
    sequences: Mutex<HashMap<NaiveDate, u64>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of movements in the log.
    pub fn movement_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.movements.len())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Ledger>, StoreError> {
        self.ledger
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

impl StockStore for InMemoryStockStore {
    fn load_stock(&self, key: StockKey) -> Result<Option<StockRecord>, StoreError> {
        Ok(self.read()?.stock.get(&key).cloned())
    }

    fn commit(&self, commit: StockCommit) -> Result<(), StoreError> {
        commit.validate()?;
        let key = commit.key();

        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let current = ledger.stock.get(&key).map(|r| r.version());
        if !commit.expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "stock {key}: expected {:?}, found {current:?}",
                commit.expected
            )));
        }

        if let Some(movement) = &commit.movement {
            if ledger.numbers.contains(movement.movement_number.as_str()) {
                return Err(StoreError::DuplicateMovement(
                    movement.movement_number.to_string(),
                ));
            }
        }

        ledger.stock.insert(key, commit.record);
        if let Some(movement) = commit.movement {
            ledger.numbers.insert(movement.movement_number.to_string());
            ledger.movements.push(movement);
        }
        Ok(())
    }

    fn next_movement_sequence(&self, day: NaiveDate) -> Result<u64, StoreError> {
        let mut sequences = self
            .sequences
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let next = sequences.entry(day).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    fn list_stock(&self, filter: &StockFilter) -> Result<Vec<StockRecord>, StoreError> {
        let ledger = self.read()?;
        let mut records: Vec<StockRecord> = ledger
            .stock
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.key());
        Ok(records)
    }

    fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let ledger = self.read()?;

        let mut matching: Vec<&MovementRecord> = ledger
            .movements
            .iter()
            .rev()
            .filter(|m| filter.matches(m))
            .collect();
        // Stable sort keeps reverse commit order among equal timestamps.
        matching.sort_by(|a, b| b.movement_date.cmp(&a.movement_date));

        let total = matching.len() as u64;
        let movements = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();

        Ok(MovementPage {
            movements,
            total,
            pagination,
            has_more: pagination.has_more(total),
        })
    }
}
