//! Inventory stock domain module.
//!
//! This crate contains the business rules for warehouse stock, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage):
//!
//! - [`StockRecord`]: on-hand / reserved / available per (product, warehouse)
//! - [`MovementRequest`] and [`MovementRecord`]: the movement ledger entries
//! - [`MovementNumber`]: human-readable ledger numbering
//! - [`StockEvent`]: notifications emitted after committed changes

pub mod error;
pub mod events;
pub mod movement;
pub mod number;
pub mod stock;

pub use error::StockError;
pub use events::{
    LowStockDetected, MovementRecorded, ReservationReleased, StockEvent, StockReserved,
};
pub use movement::{
    Direction, MAX_NOTES_LEN, MAX_REFERENCE_LEN, MovementRecord, MovementRequest, MovementType,
};
pub use number::MovementNumber;
pub use stock::{
    DecreasePolicy, QuantityChange, ReleaseOutcome, RestoreStock, StockKey, StockRecord,
    StockThresholds,
};
