//! Stock ledger service: movements, reservations and stock queries.
//!
//! `InventoryLedger` composes a `StockStore`, a `MasterData` lookup and an
//! `EventBus`. Every write follows the same cycle:
//!
//! ```text
//! validate request
//!   ↓
//! resolve product + warehouse (missing or inactive → not found)
//!   ↓
//! per-key lock ─┐
//!   load record │  retried on version conflict,
//!   apply rule  │  up to `max_write_attempts`
//!   commit      │
//! ──────────────┘
//!   ↓
//! publish notification (best-effort)
//! ```
//!
//! The per-key lock serialises writers inside this process. The version check
//! in `commit` catches writers elsewhere (another instance on the same
//! database). A failed publish is logged and never undoes a committed change.

mod error;
mod locks;
mod processor;
mod queries;
mod reservations;

pub use error::LedgerError;
pub use locks::KeyLocks;
pub use processor::StockSnapshot;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use stockledger_core::{ProductId, WarehouseId};
use stockledger_events::{Event, EventBus, EventEnvelope};
use stockledger_inventory::{StockEvent, StockKey};

use crate::config::LedgerConfig;
use crate::master_data::{MasterData, ProductInfo, WarehouseInfo};
use crate::store::StockStore;

/// The stock ledger.
///
/// `Send + Sync` when its parts are; share it behind an `Arc`.
#[derive(Debug)]
pub struct InventoryLedger<S, M, B> {
    store: S,
    master_data: M,
    bus: B,
    locks: KeyLocks,
    config: LedgerConfig,
}

impl<S, M, B> InventoryLedger<S, M, B> {
    pub fn new(store: S, master_data: M, bus: B) -> Self {
        Self::with_config(store, master_data, bus, LedgerConfig::default())
    }

    pub fn with_config(store: S, master_data: M, bus: B, config: LedgerConfig) -> Self {
        Self {
            store,
            master_data,
            bus,
            locks: KeyLocks::new(),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, M, B> InventoryLedger<S, M, B>
where
    S: StockStore,
    M: MasterData,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn resolve_product(&self, product_id: ProductId) -> Result<ProductInfo, LedgerError> {
        match self.master_data.product(product_id)? {
            Some(product) if product.active => Ok(product),
            _ => Err(LedgerError::ProductNotFound(product_id)),
        }
    }

    fn resolve_warehouse(&self, warehouse_id: WarehouseId) -> Result<WarehouseInfo, LedgerError> {
        match self.master_data.warehouse(warehouse_id)? {
            Some(warehouse) if warehouse.active => Ok(warehouse),
            _ => Err(LedgerError::WarehouseNotFound(warehouse_id)),
        }
    }

    /// Run one read-modify-write cycle under the key lock, retrying lost
    /// version races.
    fn write_cycle<T>(
        &self,
        key: StockKey,
        mut attempt: impl FnMut() -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let max_attempts = self.config.max_write_attempts.max(1);

        self.locks.with_key(key, || {
            for n in 1..=max_attempts {
                match attempt() {
                    Err(err) if err.is_write_conflict() => {
                        debug!(stock = %key, attempt = n, error = %err, "write conflict, retrying");
                    }
                    other => return other,
                }
            }

            warn!(stock = %key, attempts = max_attempts, "write attempts exhausted");
            Err(LedgerError::ConcurrencyConflict {
                product_id: key.product_id,
                warehouse_id: key.warehouse_id,
                attempts: max_attempts,
            })
        })
    }

    /// Publish after commit. Failures are logged, never returned.
    fn publish(&self, event: StockEvent) {
        let envelope = match EventEnvelope::<JsonValue>::from_event(&event) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(event_type = event.event_type(), error = %err, "failed to encode notification");
                return;
            }
        };

        if let Err(err) = self.bus.publish(envelope) {
            warn!(
                event_type = event.event_type(),
                stream = %event.stream(),
                error = ?err,
                "notification not published; stock change is kept"
            );
        }
    }
}
