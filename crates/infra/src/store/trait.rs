use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use stockledger_core::{ExpectedVersion, Versioned};
use stockledger_inventory::{MovementRecord, StockKey, StockRecord};

use super::query::{MovementFilter, MovementPage, Pagination, StockFilter};

/// One atomic write: the new stock state plus the movement that produced it.
///
/// Reservation changes carry no movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockCommit {
    pub record: StockRecord,
    /// Version the record was read at.
    pub expected: ExpectedVersion,
    pub movement: Option<MovementRecord>,
}

impl StockCommit {
    pub fn new(record: StockRecord, expected: ExpectedVersion) -> Self {
        Self {
            record,
            expected,
            movement: None,
        }
    }

    pub fn with_movement(mut self, movement: MovementRecord) -> Self {
        self.movement = Some(movement);
        self
    }

    pub fn key(&self) -> StockKey {
        self.record.key()
    }

    /// Shape checks shared by every backend.
    ///
    /// The record must be exactly one revision past what it was read at, and a
    /// movement must target the same (product, warehouse).
    pub fn validate(&self) -> Result<(), StoreError> {
        let next = self.record.version();
        let consistent = match self.expected {
            ExpectedVersion::Any => next > 0,
            ExpectedVersion::Absent => next == 1,
            ExpectedVersion::Exact(v) => next == v + 1,
        };
        if !consistent {
            return Err(StoreError::InvalidWrite(format!(
                "record version {next} does not follow {:?}",
                self.expected
            )));
        }

        if let Some(movement) = &self.movement {
            let key = self.key();
            if movement.product_id != key.product_id || movement.warehouse_id != key.warehouse_id {
                return Err(StoreError::InvalidWrite(format!(
                    "movement {} does not belong to stock {key}",
                    movement.movement_number
                )));
            }
        }
        Ok(())
    }
}

/// Stock store operation error.
///
/// These are infrastructure errors. Business rule failures never reach the
/// store because records are validated before a commit is built.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version moved since the record was read.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("duplicate movement number: {0}")]
    DuplicateMovement(String),

    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// Connection loss, pool exhaustion, decode failures and the like.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Concurrency(_))
    }

    /// Failures that a fresh read-modify-write cycle can resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Concurrency(_) | StoreError::DuplicateMovement(_))
    }
}

/// Persistence for stock records and the movement log.
///
/// ## Commit semantics
///
/// `commit()`:
/// - checks `expected` against the stored version of the record's key
/// - replaces the stored record
/// - appends the movement, if any
/// - does all of the above atomically or not at all
///
/// ## Movement numbers
///
/// `next_movement_sequence()` hands out a strictly increasing counter per
/// calendar day. Values consumed by a commit that later fails are not reused,
/// so the log may show gaps but never duplicates.
///
/// ## Ordering
///
/// `query_movements()` returns most recent first. Movements sharing a
/// timestamp come back in reverse commit order.
pub trait StockStore: Send + Sync {
    fn load_stock(&self, key: StockKey) -> Result<Option<StockRecord>, StoreError>;

    fn commit(&self, commit: StockCommit) -> Result<(), StoreError>;

    fn next_movement_sequence(&self, day: NaiveDate) -> Result<u64, StoreError>;

    fn list_stock(&self, filter: &StockFilter) -> Result<Vec<StockRecord>, StoreError>;

    fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn load_stock(&self, key: StockKey) -> Result<Option<StockRecord>, StoreError> {
        (**self).load_stock(key)
    }

    fn commit(&self, commit: StockCommit) -> Result<(), StoreError> {
        (**self).commit(commit)
    }

    fn next_movement_sequence(&self, day: NaiveDate) -> Result<u64, StoreError> {
        (**self).next_movement_sequence(day)
    }

    fn list_stock(&self, filter: &StockFilter) -> Result<Vec<StockRecord>, StoreError> {
        (**self).list_stock(filter)
    }

    fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).query_movements(filter, pagination)
    }
}
